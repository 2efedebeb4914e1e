#![forbid(unsafe_code)]

//! Kinds: shared defaults and derived-attribute declarations.
//!
//! A [`Kind`] plays the role of a class. It is built once, wrapped in an
//! `Rc`, and shared by every instance created from it; instances look their
//! declarations up through the kind instead of carrying their own copies.

use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use attrflow_core::{Key, Value};

use super::tracer::Accessor;
use crate::error::{EngineError, Result};

/// A derived attribute's computation.
///
/// Must be a pure function of what it reads through the [`Accessor`].
pub type ComputeFn = Rc<dyn Fn(&mut Accessor<'_>) -> Result<Value>>;

/// One `(name, compute)` declaration.
#[derive(Clone)]
pub struct DerivedDecl {
    name: Key,
    compute: ComputeFn,
}

impl DerivedDecl {
    #[must_use]
    pub fn name(&self) -> &Key {
        &self.name
    }

    pub(crate) fn compute(&self) -> ComputeFn {
        Rc::clone(&self.compute)
    }
}

impl fmt::Debug for DerivedDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedDecl")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

pub struct Kind {
    name: String,
    defaults: Vec<(Key, Value)>,
    derived: Vec<DerivedDecl>,
    lookup: AHashMap<Key, usize>,
}

impl fmt::Debug for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kind")
            .field("name", &self.name)
            .field("defaults", &self.defaults)
            .field("derived", &self.derived)
            .finish()
    }
}

impl Kind {
    #[must_use]
    pub fn builder(name: impl Into<String>) -> KindBuilder {
        KindBuilder {
            name: name.into(),
            defaults: Vec::new(),
            derived: Vec::new(),
        }
    }

    /// A kind with no defaults and no derived attributes.
    #[must_use]
    pub fn plain() -> Rc<Self> {
        Rc::new(Self {
            name: "plain".to_string(),
            defaults: Vec::new(),
            derived: Vec::new(),
            lookup: AHashMap::new(),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn defaults(&self) -> &[(Key, Value)] {
        &self.defaults
    }

    /// Declarations in declaration order.
    #[must_use]
    pub fn derived(&self) -> &[DerivedDecl] {
        &self.derived
    }

    #[must_use]
    pub fn decl(&self, name: &str) -> Option<&DerivedDecl> {
        self.lookup.get(name).map(|&i| &self.derived[i])
    }

    #[must_use]
    pub fn is_derived(&self, name: &str) -> bool {
        self.lookup.contains_key(name)
    }
}

/// Builder for [`Kind`].
#[must_use]
pub struct KindBuilder {
    name: String,
    defaults: Vec<(Key, Value)>,
    derived: Vec<DerivedDecl>,
}

impl KindBuilder {
    /// Default value seeded into every new instance.
    pub fn default(mut self, key: impl Into<Key>, value: impl Into<Value>) -> Self {
        self.defaults.push((key.into(), value.into()));
        self
    }

    /// Declare a derived attribute.
    pub fn derived<F>(mut self, name: impl Into<Key>, compute: F) -> Self
    where
        F: Fn(&mut Accessor<'_>) -> Result<Value> + 'static,
    {
        self.derived.push(DerivedDecl {
            name: name.into(),
            compute: Rc::new(compute),
        });
        self
    }

    /// Validate and freeze the kind.
    ///
    /// Fails if a derived name is declared twice or also has a default.
    pub fn build(self) -> Result<Rc<Kind>> {
        let mut lookup = AHashMap::with_capacity(self.derived.len());
        for (i, decl) in self.derived.iter().enumerate() {
            if lookup.insert(decl.name.clone(), i).is_some() {
                return Err(EngineError::invalid_kind(
                    &self.name,
                    format!("derived attribute `{}` declared twice", decl.name),
                ));
            }
        }
        if let Some((key, _)) = self.defaults.iter().find(|(k, _)| lookup.contains_key(k)) {
            return Err(EngineError::invalid_kind(
                &self.name,
                format!("`{key}` is derived and cannot have a default"),
            ));
        }
        Ok(Rc::new(Kind {
            name: self.name,
            defaults: self.defaults,
            derived: self.derived,
            lookup,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_preserves_declaration_order() {
        let kind = Kind::builder("user")
            .default("first_name", "First")
            .derived("b", |_| Ok(Value::Int(1)))
            .derived("a", |_| Ok(Value::Int(2)))
            .build()
            .expect("valid kind");
        let names: Vec<&str> = kind.derived().iter().map(|d| d.name().as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert!(kind.is_derived("a"));
        assert!(!kind.is_derived("first_name"));
        assert_eq!(kind.defaults().len(), 1);
    }

    #[test]
    fn duplicate_derived_is_rejected() {
        let err = Kind::builder("k")
            .derived("x", |_| Ok(Value::Null))
            .derived("x", |_| Ok(Value::Null))
            .build()
            .expect_err("duplicate");
        assert!(matches!(err, EngineError::InvalidKind { .. }));
    }

    #[test]
    fn default_for_derived_is_rejected() {
        let err = Kind::builder("k")
            .default("x", 1)
            .derived("x", |_| Ok(Value::Null))
            .build()
            .expect_err("shadowed");
        assert_eq!(
            err.to_string(),
            "invalid kind k: `x` is derived and cannot have a default"
        );
    }

    #[test]
    fn plain_kind_is_empty() {
        let kind = Kind::plain();
        assert!(kind.derived().is_empty());
        assert!(kind.decl("val").is_none());
    }
}
