#![forbid(unsafe_code)]

//! Identifiers: instances, attribute keys, and `(instance, key)` references.

use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

/// Identity of an object instance owned by a session.
///
/// Ids are allocated monotonically and never reused, so a stale id can be
/// detected instead of silently aliasing a newer instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct InstanceId(pub u64);

impl InstanceId {
    /// Create an instance id from a raw value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw id value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Attribute name. Cloning is a refcount bump.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Key(Rc<str>);

impl Key {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self(Rc::from(name))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Self(Rc::from(name))
    }
}

impl From<&Key> for Key {
    fn from(key: &Key) -> Self {
        key.clone()
    }
}

impl Deref for Key {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An `(instance, key)` pair: one addressable attribute slot.
///
/// This is the unit recorded in dependency sets and used to key the reverse
/// dependency index. Plain and derived attributes are addressed the same way.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttrRef {
    pub instance: InstanceId,
    pub key: Key,
}

impl AttrRef {
    #[must_use]
    pub fn new(instance: InstanceId, key: impl Into<Key>) -> Self {
        Self {
            instance,
            key: key.into(),
        }
    }
}

impl fmt::Display for AttrRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.instance, self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn key_borrows_as_str_for_lookup() {
        let mut set = HashSet::new();
        set.insert(Key::new("first_name"));
        assert!(set.contains("first_name"));
        assert!(!set.contains("last_name"));
    }

    #[test]
    fn attr_ref_display() {
        let r = AttrRef::new(InstanceId::new(3), "full_name");
        assert_eq!(r.to_string(), "#3.full_name");
    }

    #[test]
    fn attr_refs_order_by_instance_then_key() {
        let mut refs = vec![
            AttrRef::new(InstanceId(2), "a"),
            AttrRef::new(InstanceId(1), "b"),
            AttrRef::new(InstanceId(1), "a"),
        ];
        refs.sort();
        assert_eq!(
            refs,
            vec![
                AttrRef::new(InstanceId(1), "a"),
                AttrRef::new(InstanceId(1), "b"),
                AttrRef::new(InstanceId(2), "a"),
            ]
        );
    }
}
