#![forbid(unsafe_code)]

//! Derived attributes with dynamic dependency tracking.
//!
//! This module provides the engine behind [`Session`](crate::Session):
//!
//! - [`Kind`]: shared defaults and derived-attribute declarations.
//! - [`Accessor`]: the tracked read handle passed to compute functions.
//! - [`DerivedCache`]: per-instance memoized results and dependency sets.
//! - [`ReverseIndex`]: source attribute -> dependents, kept in step with the
//!   dependency sets by set-difference reconciliation.
//! - [`PropagationReport`]: what one write recomputed, changed, or failed.
//!
//! # Architecture
//!
//! Dependencies are discovered, not declared: whatever a compute function
//! reads through its [`Accessor`] during an evaluation becomes that
//! attribute's dependency set, replacing the previous one. Reads can cross
//! into other instances by following `Value::Instance` references.
//!
//! Invalidation is eager. A write marks affected derived attributes and
//! recomputes them before returning, emitting change notifications only for
//! values that actually changed.
//!
//! # Invariants
//!
//! 1. A dependency set is exactly what the last successful evaluation read.
//! 2. The reverse index holds `(source, dependent)` iff `source` is in the
//!    dependent's dependency set.
//! 3. Repeated reads without an intervening relevant write never re-run a
//!    compute function.
//! 4. An attribute never evaluates while its own evaluation is in progress;
//!    such a cycle fails with [`EngineError::Cycle`](crate::EngineError::Cycle).
//! 5. Writing an attribute's current value notifies and recomputes nothing.

pub mod cache;
pub mod index;
pub mod kind;
pub mod propagate;
pub mod tracer;

pub use cache::{CacheState, CachedResult, DerivedCache};
pub use index::{ReconcileStats, ReverseIndex};
pub use kind::{ComputeFn, DerivedDecl, Kind, KindBuilder};
pub use propagate::PropagationReport;
pub use tracer::{Accessor, DependencySet};
