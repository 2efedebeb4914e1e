#![forbid(unsafe_code)]

//! Plain attribute storage.
//!
//! [`AttributeStore`] holds the directly-written state of every live
//! instance. It knows nothing about derived attributes: it only reports, via
//! the returned [`Change`], whether a write actually changed a slot.
//!
//! # Invariants
//!
//! 1. `set` returns `Some(change)` iff the stored value differs from the
//!    previous one (absent counts as a distinct value).
//! 2. Seeding never produces changes.
//! 3. Operations on an unknown instance are no-ops returning `None`.

use ahash::AHashMap;

use crate::event::Change;
use crate::id::{AttrRef, InstanceId, Key};
use crate::value::Value;

type Slots = AHashMap<Key, Value>;

#[derive(Debug, Default)]
pub struct AttributeStore {
    instances: AHashMap<InstanceId, Slots>,
}

impl AttributeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an empty instance. Returns `false` if it already existed.
    pub fn insert_instance(&mut self, id: InstanceId) -> bool {
        if self.instances.contains_key(&id) {
            return false;
        }
        self.instances.insert(id, Slots::new());
        true
    }

    /// Drop an instance and all of its slots.
    pub fn remove_instance(&mut self, id: InstanceId) -> bool {
        self.instances.remove(&id).is_some()
    }

    #[must_use]
    pub fn contains(&self, id: InstanceId) -> bool {
        self.instances.contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Seed defaults, then overrides, without emitting changes.
    pub fn seed<D, O>(&mut self, id: InstanceId, defaults: D, overrides: O)
    where
        D: IntoIterator<Item = (Key, Value)>,
        O: IntoIterator<Item = (Key, Value)>,
    {
        let slots = self.instances.entry(id).or_default();
        slots.extend(defaults);
        slots.extend(overrides);
    }

    #[must_use]
    pub fn get(&self, id: InstanceId, key: &str) -> Option<&Value> {
        self.instances.get(&id)?.get(key)
    }

    /// Write a slot, reporting the change if the value differs.
    pub fn set(&mut self, id: InstanceId, key: Key, value: Value) -> Option<Change> {
        let slots = self.instances.get_mut(&id)?;
        if slots.get(&key) == Some(&value) {
            return None;
        }
        let old = slots.insert(key.clone(), value.clone());
        Some(Change {
            target: AttrRef { instance: id, key },
            old,
            new: Some(value),
        })
    }

    /// Remove a slot, reporting the change if it was present.
    pub fn unset(&mut self, id: InstanceId, key: &Key) -> Option<Change> {
        let old = self.instances.get_mut(&id)?.remove(key)?;
        Some(Change {
            target: AttrRef {
                instance: id,
                key: key.clone(),
            },
            old: Some(old),
            new: None,
        })
    }

    /// Keys currently present on an instance, in arbitrary order.
    pub fn keys(&self, id: InstanceId) -> impl Iterator<Item = &Key> {
        self.instances.get(&id).into_iter().flat_map(|s| s.keys())
    }
}
