#![forbid(unsafe_code)]

//! Invalidation propagation.
//!
//! A propagation pass runs in two phases for every root change:
//!
//! 1. **Mark**: derived attributes that read the changed attribute directly
//!    become `Dirty`; everything downstream of them becomes `Check`.
//! 2. **Settle**: marked attributes are refreshed in marking order. A `Check`
//!    attribute first refreshes the derived attributes it reads and only
//!    recomputes if one of them actually changed value.
//!
//! A recomputation that yields a value equal to the cached one emits nothing
//! and leaves its `Check` dependents to settle back to `Clean` without
//! running their compute functions. A failed recomputation restores the
//! previous clean state, is recorded once in the pass report, and counts as
//! unchanged for everything downstream.
//!
//! # Invariants
//!
//! 1. When a pass returns, no attribute is `Dirty` or `Check`.
//! 2. Every recomputation replaces the dependency set and reconciles the
//!    reverse index in the same step.
//! 3. A change notification is emitted for a derived attribute iff its
//!    recomputed value differs from the previous one.

use std::collections::VecDeque;

use attrflow_core::{AttrRef, Change};
use tracing::Span;

use super::cache::{CacheState, CachedResult};
use super::tracer::Accessor;
use crate::error::{EngineError, Result};
use crate::session::Session;

/// Outcome of one propagation pass (or several merged ones).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropagationReport {
    /// Successful recomputations, changed or not.
    pub recomputed: usize,
    /// Derived attributes whose value changed, in the order they changed.
    pub changed: Vec<AttrRef>,
    /// Derived attributes whose recomputation failed. Each appears once.
    pub failures: Vec<(AttrRef, EngineError)>,
}

impl PropagationReport {
    pub fn merge(&mut self, other: Self) {
        self.recomputed += other.recomputed;
        self.changed.extend(other.changed);
        for (target, err) in other.failures {
            self.push_failure(target, err);
        }
    }

    fn push_failure(&mut self, target: AttrRef, err: EngineError) {
        if !self.failures.iter().any(|(t, _)| *t == target) {
            self.failures.push((target, err));
        }
    }

    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    #[must_use]
    pub fn did_change(&self, target: &AttrRef) -> bool {
        self.changed.contains(target)
    }

    #[must_use]
    pub fn failure(&self, target: &AttrRef) -> Option<&EngineError> {
        self.failures
            .iter()
            .find_map(|(t, err)| (t == target).then_some(err))
    }
}

/// Work queue and report of the pass in progress.
#[derive(Debug, Default)]
pub(crate) struct Pass {
    pending: VecDeque<AttrRef>,
    report: PropagationReport,
}

impl Pass {
    pub(crate) fn record_failure(&mut self, target: AttrRef, err: EngineError) {
        self.report.push_failure(target, err);
    }

    pub(crate) fn take_report(&mut self) -> PropagationReport {
        debug_assert!(self.pending.is_empty(), "report taken before settling");
        std::mem::take(&mut self.report)
    }
}

impl Session {
    fn cached(&self, target: &AttrRef) -> Option<&CachedResult> {
        self.instances
            .get(&target.instance)?
            .cache
            .get(&target.key)
    }

    fn cached_mut(&mut self, target: &AttrRef) -> Option<&mut CachedResult> {
        self.instances
            .get_mut(&target.instance)?
            .cache
            .get_mut(&target.key)
    }

    fn state_of(&self, target: &AttrRef) -> Option<CacheState> {
        self.cached(target).map(CachedResult::state)
    }

    /// Mark phase for a change of `source`. Returns how many attributes were marked.
    pub(crate) fn mark_from(&mut self, source: &AttrRef) -> usize {
        let mut marked = 0;
        for dependent in self.index.dependents_of(source) {
            marked += self.mark_dirty(&dependent);
        }
        marked
    }

    /// Mark one attribute `Dirty` and everything downstream `Check`.
    pub(crate) fn mark_dirty(&mut self, target: &AttrRef) -> usize {
        let was_clean = self.state_of(target) == Some(CacheState::Clean);
        let Some(cached) = self.cached_mut(target) else {
            return 0;
        };
        if !cached.mark_dirty() {
            return 0;
        }
        self.pass.pending.push_back(target.clone());
        let mut marked = 1;
        if was_clean {
            marked += self.mark_downstream(target);
        }
        marked
    }

    fn mark_downstream(&mut self, from: &AttrRef) -> usize {
        let mut marked = 0;
        let mut stack = vec![from.clone()];
        while let Some(node) = stack.pop() {
            for dependent in self.index.dependents_of(&node) {
                if self
                    .cached_mut(&dependent)
                    .is_some_and(CachedResult::mark_check)
                {
                    self.pass.pending.push_back(dependent.clone());
                    stack.push(dependent);
                    marked += 1;
                }
            }
        }
        marked
    }

    /// Settle phase: refresh everything marked so far.
    pub(crate) fn settle(&mut self) {
        while let Some(target) = self.pass.pending.pop_front() {
            if let Err(err) = self.refresh(&target) {
                self.pass.record_failure(target, err);
            }
        }
    }

    /// Propagate a root change from the store, then settle.
    pub(crate) fn propagate(&mut self, change: Change) {
        let marked = self.mark_from(&change.target);
        self.notifier.emit(&change);
        self.settle();
        tracing::debug!(
            message = "attrflow.propagate",
            source = %change.target,
            marked,
            recomputed = self.pass.report.recomputed,
            failures = self.pass.report.failures.len()
        );
    }

    /// Make `target` clean, recomputing only if needed.
    ///
    /// Plain attributes and attributes of destroyed instances are always fresh.
    pub(crate) fn refresh(&mut self, target: &AttrRef) -> Result<()> {
        match self.state_of(target) {
            None | Some(CacheState::Clean) => Ok(()),
            Some(CacheState::Uncomputed | CacheState::Dirty) => self.recompute(target).map(drop),
            Some(CacheState::Check) => self.resolve_check(target),
        }
    }

    fn resolve_check(&mut self, target: &AttrRef) -> Result<()> {
        self.stack.enter(target, self.config.max_eval_depth)?;
        let upstream: Vec<AttrRef> = self
            .cached(target)
            .map(|c| c.deps.sorted())
            .unwrap_or_default()
            .into_iter()
            .filter(|dep| {
                self.state_of(dep)
                    .is_some_and(|state| state != CacheState::Clean)
            })
            .collect();
        for dep in upstream {
            match self.refresh(&dep) {
                Ok(()) => {}
                Err(err) if err.is_structural() => {
                    self.stack.exit(target);
                    if let Some(cached) = self.cached_mut(target) {
                        cached.restore();
                    }
                    return Err(err);
                }
                // The failed upstream kept its previous value, so from here
                // it looks unchanged.
                Err(err) => self.pass.record_failure(dep, err),
            }
            if self.state_of(target) == Some(CacheState::Dirty) {
                break;
            }
        }
        self.stack.exit(target);

        match self.state_of(target) {
            Some(CacheState::Dirty) => self.recompute(target).map(drop),
            Some(CacheState::Check) => {
                if let Some(cached) = self.cached_mut(target) {
                    cached.state = CacheState::Clean;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Evaluate `target`, store the result, reconcile subscriptions, and
    /// propagate if the value changed. Returns whether it changed.
    pub(crate) fn recompute(&mut self, target: &AttrRef) -> Result<bool> {
        let compute = self
            .instances
            .get(&target.instance)
            .and_then(|state| state.kind.decl(&target.key))
            .map(|decl| decl.compute())
            .ok_or_else(|| EngineError::NotDerived {
                target: target.clone(),
            })?;

        self.stack.enter(target, self.config.max_eval_depth)?;
        let span = if self.config.trace_evaluations {
            tracing::debug_span!(
                "attrflow.evaluate",
                instance = target.instance.raw(),
                name = %target.key,
                deps = tracing::field::Empty
            )
        } else {
            Span::none()
        };
        let entered = span.enter();
        let mut accessor = Accessor::new(self, target.instance);
        let result = compute(&mut accessor);
        let deps = accessor.into_deps();
        span.record("deps", deps.len());
        drop(entered);
        self.stack.exit(target);

        let value = match result {
            Ok(value) => value,
            Err(err) => {
                let err = err.attach(target);
                if let Some(cached) = self.cached_mut(target) {
                    cached.restore();
                }
                tracing::warn!(
                    message = "attrflow.evaluate.failed",
                    attr = %target,
                    error = %err
                );
                self.pass.record_failure(target.clone(), err.clone());
                return Err(err);
            }
        };

        let Some(cached) = self
            .instances
            .get_mut(&target.instance)
            .and_then(|state| state.cache.get_mut(&target.key))
        else {
            return Ok(false);
        };
        let (old_deps, old_value, changed) = cached.store(value, deps);
        self.index.reconcile(target, &old_deps, &cached.deps);
        let new_value = cached.value.clone();
        self.pass.report.recomputed += 1;

        if changed {
            self.pass.report.changed.push(target.clone());
            self.mark_from(target);
            self.notifier.emit(&Change {
                target: target.clone(),
                old: old_value,
                new: new_value,
            });
        }
        Ok(changed)
    }
}
