#![forbid(unsafe_code)]

//! Per-instance derived value cache.
//!
//! # State machine
//!
//! ```text
//! Uncomputed --evaluate ok--> Clean --source changed--> Dirty --recompute--> Clean
//!                             Clean --upstream derived marked--> Check
//!                             Check --upstream changed--> Dirty
//!                             Check --upstream unchanged--> Clean
//! ```
//!
//! `Dirty` and `Check` only exist inside a propagation pass; every pass
//! settles all of them before returning to the writer.

use ahash::AHashMap;
use attrflow_core::{Key, Value};

use super::tracer::DependencySet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Uncomputed,
    Clean,
    /// A direct source changed; must recompute.
    Dirty,
    /// Some upstream derived attribute may have changed.
    Check,
}

#[derive(Debug, Clone)]
pub struct CachedResult {
    pub(crate) value: Option<Value>,
    pub(crate) deps: DependencySet,
    pub(crate) state: CacheState,
    /// Successful evaluations so far.
    pub(crate) version: u64,
}

impl Default for CachedResult {
    fn default() -> Self {
        Self {
            value: None,
            deps: DependencySet::new(),
            state: CacheState::Uncomputed,
            version: 0,
        }
    }
}

impl CachedResult {
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    #[must_use]
    pub fn state(&self) -> CacheState {
        self.state
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn dependencies(&self) -> &DependencySet {
        &self.deps
    }

    #[must_use]
    pub fn is_computed(&self) -> bool {
        self.value.is_some()
    }

    /// Store a successful evaluation. Returns the previous dependency set and
    /// whether the value changed (a first evaluation is not a change).
    pub(crate) fn store(
        &mut self,
        value: Value,
        deps: DependencySet,
    ) -> (DependencySet, Option<Value>, bool) {
        let old_deps = std::mem::replace(&mut self.deps, deps);
        let old_value = self.value.replace(value);
        let changed = old_value
            .as_ref()
            .is_some_and(|old| Some(old) != self.value.as_ref());
        self.state = CacheState::Clean;
        self.version += 1;
        (old_deps, old_value, changed)
    }

    /// Return to the last clean state after a failed evaluation.
    pub(crate) fn restore(&mut self) {
        self.state = if self.value.is_some() {
            CacheState::Clean
        } else {
            CacheState::Uncomputed
        };
    }

    /// Transition to `Dirty` unless uncomputed. Returns `true` if the state changed.
    pub(crate) fn mark_dirty(&mut self) -> bool {
        match self.state {
            CacheState::Clean | CacheState::Check => {
                self.state = CacheState::Dirty;
                true
            }
            CacheState::Dirty | CacheState::Uncomputed => false,
        }
    }

    /// Transition `Clean` to `Check`. Returns `true` if the state changed.
    pub(crate) fn mark_check(&mut self) -> bool {
        if self.state == CacheState::Clean {
            self.state = CacheState::Check;
            true
        } else {
            false
        }
    }
}

/// Cached results for every derived attribute of one instance.
#[derive(Debug, Default)]
pub struct DerivedCache {
    entries: AHashMap<Key, CachedResult>,
}

impl DerivedCache {
    pub(crate) fn with_names<'a>(names: impl IntoIterator<Item = &'a Key>) -> Self {
        Self {
            entries: names
                .into_iter()
                .map(|name| (name.clone(), CachedResult::default()))
                .collect(),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CachedResult> {
        self.entries.get(name)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut CachedResult> {
        self.entries.get_mut(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &CachedResult)> {
        self.entries.iter()
    }

    pub(crate) fn drain(&mut self) -> impl Iterator<Item = (Key, CachedResult)> + '_ {
        self.entries.drain()
    }

    /// Number of entries holding a computed value.
    #[must_use]
    pub fn computed_len(&self) -> usize {
        self.entries.values().filter(|c| c.is_computed()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attrflow_core::{AttrRef, InstanceId};

    fn deps(keys: &[&str]) -> DependencySet {
        keys.iter().map(|k| AttrRef::new(InstanceId(1), *k)).collect()
    }

    #[test]
    fn first_store_is_not_a_change() {
        let mut cached = CachedResult::default();
        let (old_deps, old_value, changed) = cached.store(Value::Int(1), deps(&["a"]));
        assert!(old_deps.is_empty());
        assert_eq!(old_value, None);
        assert!(!changed);
        assert_eq!(cached.state(), CacheState::Clean);
        assert_eq!(cached.version(), 1);
    }

    #[test]
    fn store_reports_change_and_swaps_deps() {
        let mut cached = CachedResult::default();
        cached.store(Value::Int(1), deps(&["a"]));
        let (old_deps, old_value, changed) = cached.store(Value::Int(2), deps(&["b"]));
        assert_eq!(old_deps, deps(&["a"]));
        assert_eq!(old_value, Some(Value::Int(1)));
        assert!(changed);
        assert_eq!(cached.dependencies(), &deps(&["b"]));

        let (_, _, changed) = cached.store(Value::Int(2), deps(&["b"]));
        assert!(!changed);
        assert_eq!(cached.version(), 3);
    }

    #[test]
    fn restore_returns_to_prior_clean_state() {
        let mut cached = CachedResult::default();
        cached.restore();
        assert_eq!(cached.state(), CacheState::Uncomputed);

        cached.store(Value::Int(1), deps(&["a"]));
        assert!(cached.mark_dirty());
        cached.restore();
        assert_eq!(cached.state(), CacheState::Clean);
        assert_eq!(cached.value(), Some(&Value::Int(1)));
    }

    #[test]
    fn marking_respects_state_machine() {
        let mut cached = CachedResult::default();
        assert!(!cached.mark_dirty());
        assert!(!cached.mark_check());

        cached.store(Value::Null, DependencySet::new());
        assert!(cached.mark_check());
        assert!(!cached.mark_check());
        assert!(cached.mark_dirty());
        assert!(!cached.mark_check());
        assert_eq!(cached.state(), CacheState::Dirty);
    }
}
