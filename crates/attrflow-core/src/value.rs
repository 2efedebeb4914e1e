#![forbid(unsafe_code)]

//! Dynamically typed attribute values.
//!
//! Absence is modelled as `Option<Value>::None` at every API boundary, never as
//! a variant, so "never set" and "explicitly null" stay distinguishable.
//!
//! # Equality
//!
//! `Value` equality is structural and is the single notion of "changed" used
//! by the store and by derived-value change suppression. Floats compare by
//! bit pattern: `NaN` equals an identical `NaN`, and `0.0` differs from
//! `-0.0`.

use std::fmt;
use std::rc::Rc;

use crate::id::InstanceId;

/// An attribute value.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    /// Reference to another object instance.
    Instance(InstanceId),
    List(Rc<[Value]>),
}

impl Value {
    #[must_use]
    pub fn str(s: &str) -> Self {
        Self::Str(Rc::from(s))
    }

    #[must_use]
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Self::List(items.into_iter().collect())
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view; integers widen to `f64`.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_instance(&self) -> Option<InstanceId> {
        match self {
            Self::Instance(id) => Some(*id),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Length of a string (in chars) or list; `None` for other variants.
    #[must_use]
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::Str(s) => Some(s.chars().count()),
            Self::List(items) => Some(items.len()),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Name of the variant, for diagnostics.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Instance(_) => "instance",
            Self::List(_) => "list",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(s) => f.write_str(s),
            Self::Instance(id) => write!(f, "{id}"),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Instance(a), Self::Instance(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Self::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::str(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(Rc::from(v))
    }
}

impl From<InstanceId> for Value {
    fn from(v: InstanceId) -> Self {
        Self::Instance(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(Rc::from(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_equality() {
        assert_eq!(Value::from("Amy"), Value::str("Amy"));
        assert_ne!(Value::Int(1), Value::Float(1.0));
        assert_eq!(
            Value::list([Value::Int(1), Value::str("x")]),
            Value::from(vec![Value::Int(1), Value::str("x")])
        );
    }

    #[test]
    fn floats_compare_by_bits() {
        let nan = Value::Float(f64::NAN);
        assert_eq!(nan, nan.clone());
        assert_ne!(Value::Float(0.0), Value::Float(-0.0));
        assert_eq!(Value::Float(1.5), Value::from(1.5));
        assert_eq!(
            Value::list([Value::Float(f64::NAN)]),
            Value::list([Value::Float(f64::NAN)])
        );
    }

    #[test]
    fn len_counts_chars_not_bytes() {
        assert_eq!(Value::str("Hunter Loftis").len(), Some(13));
        assert_eq!(Value::str("héllo").len(), Some(5));
        assert_eq!(Value::Int(4).len(), None);
    }

    #[test]
    fn accessors_reject_other_variants() {
        let v = Value::Instance(InstanceId(7));
        assert_eq!(v.as_instance(), Some(InstanceId(7)));
        assert_eq!(v.as_int(), None);
        assert_eq!(Value::Int(3).as_float(), Some(3.0));
        assert_eq!(v.type_name(), "instance");
    }

    #[test]
    fn display_renders_nested_lists() {
        let v = Value::list([Value::Int(1), Value::list([Value::Bool(true)]), Value::Null]);
        assert_eq!(v.to_string(), "[1, [true], null]");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serde_snapshot_format() {
        let v = Value::list([Value::Int(2), Value::Instance(InstanceId(4))]);
        let json = serde_json::to_string(&v).expect("serialize");
        assert_eq!(json, r#"{"List":[{"Int":2},{"Instance":4}]}"#);
        let back: Value = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, v);
    }
}
