#![forbid(unsafe_code)]

//! Runtime: derived-attribute sessions with dependency tracking, memoization,
//! and eager invalidation.

pub mod config;
pub mod error;
pub mod reactive;
pub mod session;

pub use config::SessionConfig;
pub use error::{EngineError, Result};
pub use reactive::{Accessor, Kind, KindBuilder, PropagationReport};
pub use session::{Session, SessionStats};
