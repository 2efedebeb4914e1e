#![forbid(unsafe_code)]

//! Change recording for assertions on notification order and count.

use std::cell::RefCell;
use std::rc::Rc;

use attrflow_core::{AttrRef, Change, Value};

/// Shared log of delivered changes.
///
/// Clone it into as many handlers as needed; all clones append to the same
/// log.
#[derive(Debug, Clone, Default)]
pub struct ChangeLog {
    entries: Rc<RefCell<Vec<Change>>>,
}

impl ChangeLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A handler appending to this log, for `Session::subscribe`.
    pub fn handler(&self) -> impl FnMut(&Change) + 'static {
        let entries = Rc::clone(&self.entries);
        move |change: &Change| entries.borrow_mut().push(change.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    #[must_use]
    pub fn changes(&self) -> Vec<Change> {
        self.entries.borrow().clone()
    }

    /// New values in delivery order.
    #[must_use]
    pub fn values(&self) -> Vec<Option<Value>> {
        self.entries
            .borrow()
            .iter()
            .map(|c| c.new.clone())
            .collect()
    }

    /// Most recently delivered new value.
    #[must_use]
    pub fn last_value(&self) -> Option<Value> {
        self.entries.borrow().last().and_then(|c| c.new.clone())
    }

    /// Targets in delivery order.
    #[must_use]
    pub fn targets(&self) -> Vec<AttrRef> {
        self.entries
            .borrow()
            .iter()
            .map(|c| c.target.clone())
            .collect()
    }

    #[must_use]
    pub fn count_for(&self, target: &AttrRef) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|c| c.target == *target)
            .count()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}
