#![forbid(unsafe_code)]

//! attrflow public facade crate.
//!
//! Objects hold plain attributes; derived attributes are declared on a
//! [`Kind`] as functions of what they read. The session discovers each
//! derived attribute's dependencies while evaluating it, caches the result,
//! and recomputes eagerly when a dependency changes.
//!
//! ```
//! use attrflow::prelude::*;
//!
//! let kind = Kind::builder("user")
//!     .default("first_name", "First")
//!     .default("last_name", "Last")
//!     .derived("full_name", |cx| {
//!         let first = cx.get("first_name")?.unwrap_or(Value::Null);
//!         let last = cx.get("last_name")?.unwrap_or(Value::Null);
//!         Ok(Value::from(format!("{first} {last}")))
//!     })
//!     .derived("name_length", |cx| {
//!         Ok(Value::from(cx.get("full_name")?.and_then(|v| v.len()).unwrap_or(0)))
//!     })
//!     .build()?;
//!
//! let mut session = Session::new();
//! let user = session.create(&kind, [("first_name", "Hunter"), ("last_name", "Loftis")])?;
//! assert_eq!(session.get(user, "name_length")?, Some(Value::Int(13)));
//!
//! let report = session.set(user, "first_name", "Amy")?;
//! assert_eq!(report.changed.len(), 2);
//! assert_eq!(session.get(user, "name_length")?, Some(Value::Int(10)));
//! # Ok::<(), attrflow::EngineError>(())
//! ```

pub use attrflow_core as core;
pub use attrflow_runtime as runtime;

pub use attrflow_core::{AttrRef, Change, InstanceId, Key, SubscriptionId, Value};
pub use attrflow_runtime::{
    Accessor, EngineError, Kind, KindBuilder, PropagationReport, Result, Session, SessionConfig,
    SessionStats,
};

pub mod prelude {
    pub use attrflow_core::{AttrRef, Change, InstanceId, Value};
    pub use attrflow_runtime::{
        Accessor, EngineError, Kind, PropagationReport, Session, SessionConfig,
    };
}
