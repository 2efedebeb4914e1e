#![forbid(unsafe_code)]

//! Dependency tracing for a single derived evaluation.
//!
//! Every evaluation gets its own [`Accessor`], created by the session and
//! handed to the compute function. Each read through it is recorded in the
//! accessor's own [`DependencySet`] before being delegated to the session.
//! Nested derived reads build a fresh accessor of their own, so dependencies
//! of an inner evaluation never leak into the outer one: the outer evaluation
//! records the inner attribute itself, not what the inner attribute read.
//!
//! [`EvalStack`] tracks which attributes are currently being evaluated, for
//! cycle detection and the nesting limit.

use ahash::AHashSet;
use attrflow_core::{AttrRef, InstanceId, Key, Value};

use crate::error::{EngineError, Result};
use crate::session::Session;

/// The exact set of attributes read during one evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencySet {
    refs: AHashSet<AttrRef>,
}

impl DependencySet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the reference was not already present.
    pub fn insert(&mut self, dep: AttrRef) -> bool {
        self.refs.insert(dep)
    }

    #[must_use]
    pub fn contains(&self, dep: &AttrRef) -> bool {
        self.refs.contains(dep)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttrRef> {
        self.refs.iter()
    }

    /// References in `self` that are not in `other`.
    pub fn difference<'a>(&'a self, other: &'a Self) -> impl Iterator<Item = &'a AttrRef> {
        self.refs.difference(&other.refs)
    }

    /// Drop every reference into `instance`. Returns how many were removed.
    pub fn remove_instance(&mut self, instance: InstanceId) -> usize {
        let before = self.refs.len();
        self.refs.retain(|r| r.instance != instance);
        before - self.refs.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.refs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// References in ascending order.
    #[must_use]
    pub fn sorted(&self) -> Vec<AttrRef> {
        let mut refs: Vec<AttrRef> = self.refs.iter().cloned().collect();
        refs.sort();
        refs
    }
}

impl FromIterator<AttrRef> for DependencySet {
    fn from_iter<I: IntoIterator<Item = AttrRef>>(iter: I) -> Self {
        Self {
            refs: iter.into_iter().collect(),
        }
    }
}

/// Attributes with an evaluation in progress, outermost first.
#[derive(Debug, Default)]
pub(crate) struct EvalStack {
    frames: Vec<AttrRef>,
    active: AHashSet<AttrRef>,
}

impl EvalStack {
    /// Push `target`, failing if it is already in progress or the stack is full.
    pub(crate) fn enter(&mut self, target: &AttrRef, limit: usize) -> Result<()> {
        if self.active.contains(target) {
            let mut path = self.frames.clone();
            path.push(target.clone());
            return Err(EngineError::Cycle {
                target: target.clone(),
                path,
            });
        }
        if self.frames.len() >= limit {
            return Err(EngineError::DepthExceeded {
                target: target.clone(),
                limit,
            });
        }
        self.frames.push(target.clone());
        self.active.insert(target.clone());
        Ok(())
    }

    pub(crate) fn exit(&mut self, target: &AttrRef) {
        debug_assert_eq!(self.frames.last(), Some(target), "unbalanced eval stack");
        self.frames.pop();
        self.active.remove(target);
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }
}

/// Read access handed to a compute function.
///
/// Reads are recorded as dependencies of the evaluation in progress.
/// Reading an absent key still records it, so a later write to that key
/// triggers recomputation. Reading a destroyed instance yields `None` and is
/// not recorded. A derived attribute whose recomputation fails reads as its
/// previous value.
pub struct Accessor<'a> {
    session: &'a mut Session,
    this: InstanceId,
    deps: DependencySet,
}

impl<'a> Accessor<'a> {
    pub(crate) fn new(session: &'a mut Session, this: InstanceId) -> Self {
        Self {
            session,
            this,
            deps: DependencySet::new(),
        }
    }

    pub(crate) fn into_deps(self) -> DependencySet {
        self.deps
    }

    /// The instance whose attribute is being evaluated.
    #[must_use]
    pub fn this(&self) -> InstanceId {
        self.this
    }

    /// Read an attribute of the evaluating instance.
    pub fn get(&mut self, key: &str) -> Result<Option<Value>> {
        self.get_from(self.this, key)
    }

    /// Read an attribute of any instance.
    pub fn get_from(&mut self, instance: InstanceId, key: &str) -> Result<Option<Value>> {
        if !self.session.contains(instance) {
            return Ok(None);
        }
        let target = AttrRef {
            instance,
            key: Key::new(key),
        };
        self.deps.insert(target.clone());
        self.session.read_tracked(&target)
    }

    /// Follow an instance reference stored under `reference`, then read `key`
    /// on the referenced instance.
    ///
    /// Returns `None` if the reference is absent or not an instance.
    pub fn follow(&mut self, reference: &str, key: &str) -> Result<Option<Value>> {
        match self.get(reference)?.and_then(|v| v.as_instance()) {
            Some(target) => self.get_from(target, key),
            None => Ok(None),
        }
    }

    /// Read an integer attribute; absent or non-integer values are `None`.
    pub fn get_int(&mut self, key: &str) -> Result<Option<i64>> {
        Ok(self.get(key)?.and_then(|v| v.as_int()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(i: u64, k: &str) -> AttrRef {
        AttrRef::new(InstanceId(i), k)
    }

    #[test]
    fn dependency_set_deduplicates() {
        let mut deps = DependencySet::new();
        assert!(deps.insert(r(1, "a")));
        assert!(!deps.insert(r(1, "a")));
        assert!(deps.insert(r(2, "a")));
        assert_eq!(deps.len(), 2);
        assert_eq!(deps.sorted(), vec![r(1, "a"), r(2, "a")]);
    }

    #[test]
    fn difference_is_one_sided() {
        let old: DependencySet = [r(1, "a"), r(1, "b")].into_iter().collect();
        let new: DependencySet = [r(1, "b"), r(1, "c")].into_iter().collect();
        let added: Vec<_> = new.difference(&old).cloned().collect();
        let removed: Vec<_> = old.difference(&new).cloned().collect();
        assert_eq!(added, vec![r(1, "c")]);
        assert_eq!(removed, vec![r(1, "a")]);
    }

    #[test]
    fn remove_instance_prunes_only_that_instance() {
        let mut deps: DependencySet = [r(1, "a"), r(2, "a"), r(2, "b")].into_iter().collect();
        assert_eq!(deps.remove_instance(InstanceId(2)), 2);
        assert_eq!(deps.sorted(), vec![r(1, "a")]);
    }

    #[test]
    fn eval_stack_detects_reentry() {
        let mut stack = EvalStack::default();
        stack.enter(&r(1, "a"), 8).expect("enter a");
        stack.enter(&r(2, "b"), 8).expect("enter b");
        let err = stack.enter(&r(1, "a"), 8).expect_err("cycle");
        assert_eq!(
            err,
            EngineError::Cycle {
                target: r(1, "a"),
                path: vec![r(1, "a"), r(2, "b"), r(1, "a")],
            }
        );
        stack.exit(&r(2, "b"));
        stack.exit(&r(1, "a"));
        assert_eq!(stack.depth(), 0);
        stack.enter(&r(1, "a"), 8).expect("re-enter after exit");
    }

    #[test]
    fn eval_stack_enforces_limit() {
        let mut stack = EvalStack::default();
        stack.enter(&r(1, "a"), 1).expect("first frame");
        let err = stack.enter(&r(1, "b"), 1).expect_err("limit");
        assert!(matches!(err, EngineError::DepthExceeded { limit: 1, .. }));
    }
}
