#![forbid(unsafe_code)]

//! Reverse dependency index: source attribute -> derived attributes reading it.
//!
//! The index is the subscription side of every dependency set. It is only
//! ever updated through [`ReverseIndex::reconcile`], which applies the set
//! difference between a derived attribute's previous and current
//! dependencies.
//!
//! # Invariants
//!
//! 1. `(source, dependent)` is registered iff `source` is in the current
//!    dependency set of `dependent`.
//! 2. Reconciling identical old and new sets changes nothing.
//! 3. No source maps to an empty dependent set.

use ahash::{AHashMap, AHashSet};
use attrflow_core::{AttrRef, InstanceId};

use super::tracer::DependencySet;

/// Registrations added and removed by one reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub added: usize,
    pub removed: usize,
}

impl ReconcileStats {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.added == 0 && self.removed == 0
    }
}

#[derive(Debug, Default)]
pub struct ReverseIndex {
    edges: AHashMap<AttrRef, AHashSet<AttrRef>>,
    edge_count: usize,
}

impl ReverseIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bring `dependent`'s registrations from `old` to `new`.
    pub fn reconcile(
        &mut self,
        dependent: &AttrRef,
        old: &DependencySet,
        new: &DependencySet,
    ) -> ReconcileStats {
        let mut stats = ReconcileStats::default();
        for source in new.difference(old) {
            if self
                .edges
                .entry(source.clone())
                .or_default()
                .insert(dependent.clone())
            {
                stats.added += 1;
            }
        }
        for source in old.difference(new) {
            if self.unlink(source, dependent) {
                stats.removed += 1;
            }
        }
        self.edge_count = self.edge_count + stats.added - stats.removed;
        if !stats.is_noop() {
            tracing::trace!(
                message = "attrflow.reconcile",
                dependent = %dependent,
                added = stats.added,
                removed = stats.removed
            );
        }
        stats
    }

    fn unlink(&mut self, source: &AttrRef, dependent: &AttrRef) -> bool {
        let Some(set) = self.edges.get_mut(source) else {
            return false;
        };
        let removed = set.remove(dependent);
        if set.is_empty() {
            self.edges.remove(source);
        }
        removed
    }

    /// Derived attributes currently depending on `source`, in ascending order.
    #[must_use]
    pub fn dependents_of(&self, source: &AttrRef) -> Vec<AttrRef> {
        let mut out: Vec<AttrRef> = self
            .edges
            .get(source)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        out.sort();
        out
    }

    #[must_use]
    pub fn contains(&self, source: &AttrRef, dependent: &AttrRef) -> bool {
        self.edges
            .get(source)
            .is_some_and(|set| set.contains(dependent))
    }

    /// Remove every registration whose source lives on `instance`.
    ///
    /// Returns the distinct dependents that lost a registration, in ascending
    /// order.
    pub fn remove_sources_of(&mut self, instance: InstanceId) -> Vec<AttrRef> {
        let sources: Vec<AttrRef> = self
            .edges
            .keys()
            .filter(|source| source.instance == instance)
            .cloned()
            .collect();
        let mut dependents = AHashSet::new();
        for source in sources {
            if let Some(set) = self.edges.remove(&source) {
                self.edge_count -= set.len();
                dependents.extend(set);
            }
        }
        let mut out: Vec<AttrRef> = dependents.into_iter().collect();
        out.sort();
        out
    }

    /// Total `(source, dependent)` registrations.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Every registration, as `(source, dependent)` pairs in ascending order.
    #[must_use]
    pub fn edges(&self) -> Vec<(AttrRef, AttrRef)> {
        let mut out: Vec<(AttrRef, AttrRef)> = self
            .edges
            .iter()
            .flat_map(|(source, set)| set.iter().map(move |d| (source.clone(), d.clone())))
            .collect();
        out.sort();
        out
    }
}
