#![forbid(unsafe_code)]

//! The runtime session: owner of every instance, cache, and subscription.
//!
//! All evaluation and propagation happens synchronously on the calling
//! thread. A write returns only after its whole invalidation cascade has
//! settled, so callers never observe a half-propagated state.
//!
//! # Failure Modes
//!
//! - Writes, `destroy`, and `invalidate` return a [`PropagationReport`]
//!   listing every attribute whose recomputation failed during the pass.
//! - `create` and `get` return no report. A failed eager evaluation at
//!   `create` is logged as `attrflow.create.eval_failed` and leaves the
//!   attribute uncomputed; `get` then evaluates it and returns the error.
//!
//! # Example
//!
//! ```
//! use attrflow_core::Value;
//! use attrflow_runtime::{Kind, Session};
//!
//! let user = Kind::builder("user")
//!     .default("first_name", "First")
//!     .default("last_name", "Last")
//!     .derived("full_name", |cx| {
//!         let first = cx.get("first_name")?.unwrap_or(Value::Null);
//!         let last = cx.get("last_name")?.unwrap_or(Value::Null);
//!         Ok(Value::from(format!("{first} {last}")))
//!     })
//!     .build()?;
//!
//! let mut session = Session::new();
//! let id = session.create(&user, [("first_name", "Hunter"), ("last_name", "Loftis")])?;
//! assert_eq!(session.get(id, "full_name")?, Some(Value::str("Hunter Loftis")));
//!
//! session.set(id, "first_name", "Amy")?;
//! assert_eq!(session.get(id, "full_name")?, Some(Value::str("Amy Loftis")));
//! # Ok::<(), attrflow_runtime::EngineError>(())
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use attrflow_core::{
    AttrRef, AttributeStore, Change, InstanceId, Key, Notifier, SubscriptionId, Value,
};

use crate::config::SessionConfig;
use crate::error::{EngineError, Result};
use crate::reactive::cache::{CacheState, DerivedCache};
use crate::reactive::index::ReverseIndex;
use crate::reactive::kind::Kind;
use crate::reactive::propagate::{Pass, PropagationReport};
use crate::reactive::tracer::{DependencySet, EvalStack};

/// Per-instance runtime state.
pub(crate) struct InstanceState {
    pub(crate) kind: Rc<Kind>,
    pub(crate) cache: DerivedCache,
}

/// Counters describing a session, for leak checks and diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub instances: usize,
    /// Derived attributes holding a computed value.
    pub computed: usize,
    /// Reverse-index registrations.
    pub index_edges: usize,
    /// Live change handlers.
    pub handlers: usize,
}

pub struct Session {
    pub(crate) config: SessionConfig,
    pub(crate) store: AttributeStore,
    pub(crate) notifier: Notifier,
    pub(crate) instances: AHashMap<InstanceId, InstanceState>,
    pub(crate) index: ReverseIndex,
    pub(crate) stack: EvalStack,
    pub(crate) pass: Pass,
    next_id: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self::with_config(SessionConfig::default())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: SessionConfig) -> Self {
        Self {
            config,
            store: AttributeStore::new(),
            notifier: Notifier::new(),
            instances: AHashMap::new(),
            index: ReverseIndex::new(),
            stack: EvalStack::default(),
            pass: Pass::default(),
            next_id: 0,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Whether `id` refers to a live instance.
    #[must_use]
    pub fn contains(&self, id: InstanceId) -> bool {
        self.instances.contains_key(&id)
    }

    #[must_use]
    pub fn kind(&self, id: InstanceId) -> Option<&Rc<Kind>> {
        self.instances.get(&id).map(|state| &state.kind)
    }

    fn ensure_live(&self, id: InstanceId) -> Result<&InstanceState> {
        self.instances
            .get(&id)
            .ok_or(EngineError::UnknownInstance(id))
    }

    fn ensure_writable(&self, id: InstanceId, key: &Key) -> Result<()> {
        if self.ensure_live(id)?.kind.is_derived(key) {
            return Err(EngineError::DerivedWrite {
                target: AttrRef::new(id, key),
            });
        }
        Ok(())
    }

    fn finish(&mut self) -> PropagationReport {
        debug_assert_eq!(self.stack.depth(), 0, "pass finished mid-evaluation");
        self.settle();
        self.pass.take_report()
    }

    /// Create an instance of `kind`.
    ///
    /// Defaults are seeded first, then `attrs` override them; no change
    /// notifications are emitted for seeding. With `eager_on_create`, every
    /// derived attribute is then evaluated in declaration order. Failures of
    /// that initial evaluation are logged and leave the attribute uncomputed;
    /// the next [`get`](Self::get) retries and reports the error.
    pub fn create<K, V>(
        &mut self,
        kind: &Rc<Kind>,
        attrs: impl IntoIterator<Item = (K, V)>,
    ) -> Result<InstanceId>
    where
        K: Into<Key>,
        V: Into<Value>,
    {
        self.next_id += 1;
        let id = InstanceId::new(self.next_id);
        let attrs: Vec<(Key, Value)> = attrs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        if let Some((key, _)) = attrs.iter().find(|(k, _)| kind.is_derived(k)) {
            return Err(EngineError::DerivedWrite {
                target: AttrRef::new(id, key),
            });
        }

        self.store.insert_instance(id);
        self.store.seed(id, kind.defaults().iter().cloned(), attrs);
        self.instances.insert(
            id,
            InstanceState {
                kind: Rc::clone(kind),
                cache: DerivedCache::with_names(kind.derived().iter().map(|d| d.name())),
            },
        );
        tracing::debug!(
            message = "attrflow.create",
            instance = id.raw(),
            kind = kind.name(),
            derived = kind.derived().len()
        );

        if self.config.eager_on_create {
            for decl in kind.derived() {
                let target = AttrRef::new(id, decl.name());
                if let Err(err) = self.refresh(&target) {
                    tracing::warn!(
                        message = "attrflow.create.eval_failed",
                        attr = %target,
                        error = %err
                    );
                }
            }
        }
        // Eager failures were logged above and resurface from the next `get`.
        let _ = self.finish();
        Ok(id)
    }

    /// Read an attribute, recomputing it first if it is derived and stale.
    ///
    /// Absent keys are `Ok(None)`, not an error.
    pub fn get(&mut self, id: InstanceId, key: &str) -> Result<Option<Value>> {
        self.ensure_live(id)?;
        let target = AttrRef::new(id, key);
        let result = self.read(&target);
        // Only never-computed attributes evaluate here, and their failure is
        // `result` itself.
        let _ = self.finish();
        result
    }

    /// Shared read path for session reads and tracked accessor reads.
    pub(crate) fn read(&mut self, target: &AttrRef) -> Result<Option<Value>> {
        let derived = self
            .instances
            .get(&target.instance)
            .is_some_and(|state| state.kind.is_derived(&target.key));
        if !derived {
            return Ok(self.store.get(target.instance, &target.key).cloned());
        }
        self.refresh(target)?;
        Ok(self
            .instances
            .get(&target.instance)
            .and_then(|state| state.cache.get(&target.key))
            .and_then(|cached| cached.value().cloned()))
    }

    /// Read on behalf of an evaluation in progress.
    ///
    /// A derived attribute whose recomputation fails keeps its previous value,
    /// and its readers see that value whether they settle before or after it.
    /// The failure itself is already in the pass report. Cycles, depth
    /// overruns, and failures of never-computed attributes still fail the
    /// reader.
    pub(crate) fn read_tracked(&mut self, target: &AttrRef) -> Result<Option<Value>> {
        match self.read(target) {
            Err(err) if !err.is_structural() => self
                .instances
                .get(&target.instance)
                .and_then(|state| state.cache.get(&target.key))
                .and_then(|cached| cached.value().cloned())
                .map(Some)
                .ok_or(err),
            other => other,
        }
    }

    /// Write a plain attribute and run the resulting propagation pass.
    ///
    /// Writing an equal value is a no-op: nothing is notified or recomputed.
    pub fn set(
        &mut self,
        id: InstanceId,
        key: impl Into<Key>,
        value: impl Into<Value>,
    ) -> Result<PropagationReport> {
        let key = key.into();
        self.ensure_writable(id, &key)?;
        if let Some(change) = self.store.set(id, key, value.into()) {
            self.propagate(change);
        }
        Ok(self.finish())
    }

    /// Write several attributes, each as an independent propagation pass.
    ///
    /// All keys are validated before anything is written.
    pub fn set_many<K, V>(
        &mut self,
        id: InstanceId,
        attrs: impl IntoIterator<Item = (K, V)>,
    ) -> Result<PropagationReport>
    where
        K: Into<Key>,
        V: Into<Value>,
    {
        let attrs: Vec<(Key, Value)> = attrs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        for (key, _) in &attrs {
            self.ensure_writable(id, key)?;
        }
        let mut report = PropagationReport::default();
        for (key, value) in attrs {
            report.merge(self.set(id, key, value)?);
        }
        Ok(report)
    }

    /// Remove a plain attribute. Readers observe it as absent.
    pub fn unset(&mut self, id: InstanceId, key: impl Into<Key>) -> Result<PropagationReport> {
        let key = key.into();
        self.ensure_writable(id, &key)?;
        if let Some(change) = self.store.unset(id, &key) {
            self.propagate(change);
        }
        Ok(self.finish())
    }

    /// Force recomputation of a derived attribute, propagating if it changed.
    pub fn invalidate(&mut self, id: InstanceId, name: &str) -> Result<PropagationReport> {
        let target = AttrRef::new(id, name);
        if !self.ensure_live(id)?.kind.is_derived(name) {
            return Err(EngineError::NotDerived { target });
        }
        self.mark_dirty(&target);
        let result = self.refresh(&target);
        let report = self.finish();
        result.map(|()| report)
    }

    /// Listen for changes of one attribute (plain or derived).
    pub fn subscribe(
        &mut self,
        id: InstanceId,
        key: impl Into<Key>,
        handler: impl FnMut(&Change) + 'static,
    ) -> Result<SubscriptionId> {
        self.ensure_live(id)?;
        Ok(self.notifier.subscribe(AttrRef::new(id, key), handler))
    }

    /// Listen for changes of any attribute of one instance.
    pub fn subscribe_instance(
        &mut self,
        id: InstanceId,
        handler: impl FnMut(&Change) + 'static,
    ) -> Result<SubscriptionId> {
        self.ensure_live(id)?;
        Ok(self.notifier.subscribe_instance(id, handler))
    }

    pub fn unsubscribe(&mut self, subscription: SubscriptionId) -> bool {
        self.notifier.unsubscribe(subscription)
    }

    /// Destroy an instance and release everything it owns.
    ///
    /// Derived attributes on other instances that read this one are
    /// recomputed; from then on they observe its attributes as absent.
    pub fn destroy(&mut self, id: InstanceId) -> Result<PropagationReport> {
        let Some(mut state) = self.instances.remove(&id) else {
            return Err(EngineError::UnknownInstance(id));
        };
        let empty = DependencySet::new();
        for (name, cached) in state.cache.drain() {
            self.index
                .reconcile(&AttrRef { instance: id, key: name }, &cached.deps, &empty);
        }
        let orphans = self.index.remove_sources_of(id);
        self.store.remove_instance(id);
        let handlers = self.notifier.remove_instance(id);
        tracing::debug!(
            message = "attrflow.destroy",
            instance = id.raw(),
            orphans = orphans.len(),
            handlers
        );

        for dependent in &orphans {
            if let Some(cached) = self
                .instances
                .get_mut(&dependent.instance)
                .and_then(|s| s.cache.get_mut(&dependent.key))
            {
                cached.deps.remove_instance(id);
            }
            self.mark_dirty(dependent);
        }
        Ok(self.finish())
    }

    /// Every plain attribute plus the fresh value of every derived one.
    pub fn snapshot(&mut self, id: InstanceId) -> Result<BTreeMap<Key, Value>> {
        let kind = Rc::clone(&self.ensure_live(id)?.kind);
        let mut out: BTreeMap<Key, Value> = self
            .store
            .keys(id)
            .filter_map(|key| {
                self.store
                    .get(id, key)
                    .map(|value| (key.clone(), value.clone()))
            })
            .collect();
        for decl in kind.derived() {
            if let Some(value) = self.get(id, decl.name().as_str())? {
                out.insert(decl.name().clone(), value);
            }
        }
        Ok(out)
    }

    /// Successful evaluations of a derived attribute so far.
    #[must_use]
    pub fn version(&self, id: InstanceId, name: &str) -> Option<u64> {
        Some(self.instances.get(&id)?.cache.get(name)?.version())
    }

    #[must_use]
    pub fn is_computed(&self, id: InstanceId, name: &str) -> bool {
        self.instances
            .get(&id)
            .and_then(|s| s.cache.get(name))
            .is_some_and(|c| c.is_computed())
    }

    /// Dependencies recorded by the last successful evaluation, sorted.
    #[must_use]
    pub fn dependencies(&self, id: InstanceId, name: &str) -> Option<Vec<AttrRef>> {
        Some(self.instances.get(&id)?.cache.get(name)?.dependencies().sorted())
    }

    /// Derived attributes currently depending on `(id, key)`, sorted.
    #[must_use]
    pub fn dependents(&self, id: InstanceId, key: &str) -> Vec<AttrRef> {
        self.index.dependents_of(&AttrRef::new(id, key))
    }

    #[must_use]
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            instances: self.instances.len(),
            computed: self
                .instances
                .values()
                .map(|s| s.cache.computed_len())
                .sum(),
            index_edges: self.index.edge_count(),
            handlers: self.notifier.len(),
        }
    }

    /// Cross-check the reverse index against every dependency set.
    ///
    /// Returns a description of each discrepancy; empty means consistent.
    #[must_use]
    pub fn audit(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let mut expected = Vec::new();
        for (id, state) in &self.instances {
            for (name, cached) in state.cache.iter() {
                let dependent = AttrRef {
                    instance: *id,
                    key: name.clone(),
                };
                if matches!(cached.state(), CacheState::Dirty | CacheState::Check) {
                    problems.push(format!("{dependent} left {:?}", cached.state()));
                }
                for dep in cached.dependencies().iter() {
                    if !self.contains(dep.instance) {
                        problems.push(format!("{dependent} depends on destroyed {dep}"));
                    }
                    expected.push((dep.clone(), dependent.clone()));
                }
            }
        }
        expected.sort();
        let actual = self.index.edges();
        for edge in actual.iter().filter(|e| expected.binary_search(e).is_err()) {
            problems.push(format!("stale registration {} -> {}", edge.0, edge.1));
        }
        for edge in expected.iter().filter(|e| actual.binary_search(e).is_err()) {
            problems.push(format!("missing registration {} -> {}", edge.0, edge.1));
        }
        problems
    }
}
