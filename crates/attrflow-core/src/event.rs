#![forbid(unsafe_code)]

//! Change events and the handler registry that delivers them.
//!
//! # Invariants
//!
//! 1. Handlers for one scope are called in registration order.
//! 2. Key-scoped handlers run before instance-wide handlers for the same
//!    change.
//! 3. After `unsubscribe` returns `true`, the handler is never called again.

use ahash::AHashMap;

use crate::id::{AttrRef, InstanceId};
use crate::value::Value;

/// One attribute changing value on one instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub target: AttrRef,
    pub old: Option<Value>,
    pub new: Option<Value>,
}

/// Handle returned by [`Notifier::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

pub type Handler = Box<dyn FnMut(&Change)>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Scope {
    Attr(AttrRef),
    Instance(InstanceId),
}

impl Scope {
    fn instance(&self) -> InstanceId {
        match self {
            Self::Attr(r) => r.instance,
            Self::Instance(id) => *id,
        }
    }
}

type HandlerList = Vec<(SubscriptionId, Handler)>;

#[derive(Default)]
pub struct Notifier {
    by_attr: AHashMap<AttrRef, HandlerList>,
    by_instance: AHashMap<InstanceId, HandlerList>,
    scopes: AHashMap<SubscriptionId, Scope>,
    next_id: u64,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("handlers", &self.scopes.len())
            .finish()
    }
}

impl Notifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self, scope: Scope) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.scopes.insert(id, scope);
        id
    }

    /// Listen for changes of one attribute.
    pub fn subscribe(
        &mut self,
        target: AttrRef,
        handler: impl FnMut(&Change) + 'static,
    ) -> SubscriptionId {
        let id = self.allocate(Scope::Attr(target.clone()));
        self.by_attr
            .entry(target)
            .or_default()
            .push((id, Box::new(handler)));
        id
    }

    /// Listen for changes of any attribute on one instance.
    pub fn subscribe_instance(
        &mut self,
        instance: InstanceId,
        handler: impl FnMut(&Change) + 'static,
    ) -> SubscriptionId {
        let id = self.allocate(Scope::Instance(instance));
        self.by_instance
            .entry(instance)
            .or_default()
            .push((id, Box::new(handler)));
        id
    }

    /// Remove a handler. Returns `false` if it was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let Some(scope) = self.scopes.remove(&id) else {
            return false;
        };
        match scope {
            Scope::Attr(target) => {
                if let Some(list) = self.by_attr.get_mut(&target) {
                    list.retain(|(sid, _)| *sid != id);
                    if list.is_empty() {
                        self.by_attr.remove(&target);
                    }
                }
            }
            Scope::Instance(instance) => {
                if let Some(list) = self.by_instance.get_mut(&instance) {
                    list.retain(|(sid, _)| *sid != id);
                    if list.is_empty() {
                        self.by_instance.remove(&instance);
                    }
                }
            }
        }
        true
    }

    /// Drop every handler attached to `instance`. Returns how many were removed.
    pub fn remove_instance(&mut self, instance: InstanceId) -> usize {
        let before = self.scopes.len();
        self.scopes.retain(|_, scope| scope.instance() != instance);
        self.by_attr.retain(|target, _| target.instance != instance);
        self.by_instance.remove(&instance);
        before - self.scopes.len()
    }

    /// Deliver a change to every matching handler.
    pub fn emit(&mut self, change: &Change) {
        if let Some(list) = self.by_attr.get_mut(&change.target) {
            for (_, handler) in list.iter_mut() {
                handler(change);
            }
        }
        if let Some(list) = self.by_instance.get_mut(&change.target.instance) {
            for (_, handler) in list.iter_mut() {
                handler(change);
            }
        }
    }

    /// Number of live handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}
