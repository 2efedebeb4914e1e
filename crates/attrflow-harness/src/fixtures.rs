#![forbid(unsafe_code)]

//! Reference model kinds.
//!
//! These are the models the behavioural suites are written against:
//!
//! - [`user_kind`]: `full_name` from two plain names, `name_length` from
//!   `full_name` (two-level chain).
//! - [`dynamic_kind`]: `dynamic` reads one of `a`/`b`/`c`, chosen by
//!   `active` (dependency switching).
//! - [`plus_kind`]: `val` follows `reference` to another instance and adds
//!   `delta` (cross-instance chain).

use std::cell::Cell;
use std::rc::Rc;

use attrflow_core::Value;
use attrflow_runtime::{EngineError, Kind};

/// Shared counter of compute-function invocations.
#[derive(Debug, Clone, Default)]
pub struct EvalCounter(Rc<Cell<u32>>);

impl EvalCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump(&self) {
        self.0.set(self.0.get() + 1);
    }

    #[must_use]
    pub fn get(&self) -> u32 {
        self.0.get()
    }
}

/// Defaults `first_name = "First"`, `last_name = "Last"`.
#[must_use]
pub fn user_kind() -> Rc<Kind> {
    Kind::builder("user")
        .default("first_name", "First")
        .default("last_name", "Last")
        .derived("full_name", |cx| {
            let first = cx.get("first_name")?.unwrap_or(Value::Null);
            let last = cx.get("last_name")?.unwrap_or(Value::Null);
            Ok(Value::from(format!("{first} {last}")))
        })
        .derived("name_length", |cx| {
            let len = cx.get("full_name")?.and_then(|v| v.len()).unwrap_or(0);
            Ok(Value::from(len))
        })
        .build()
        .unwrap_or_else(|err| panic!("user kind is valid: {err}"))
}

/// Source keys selectable by `active`.
pub const DYNAMIC_SOURCES: [&str; 3] = ["a", "b", "c"];

/// Defaults `a = 1`, `b = 2`, `c = 3`, `active = 0`. Every evaluation of
/// `dynamic` bumps `counter`.
#[must_use]
pub fn dynamic_kind(counter: &EvalCounter) -> Rc<Kind> {
    let counter = counter.clone();
    Kind::builder("dynamic")
        .default("a", 1)
        .default("b", 2)
        .default("c", 3)
        .default("active", 0)
        .derived("dynamic", move |cx| {
            counter.bump();
            let active = cx.get_int("active")?.unwrap_or(0);
            let Some(source) = usize::try_from(active)
                .ok()
                .and_then(|i| DYNAMIC_SOURCES.get(i))
            else {
                return Ok(Value::Null);
            };
            Ok(cx.get(source)?.unwrap_or(Value::Null))
        })
        .build()
        .unwrap_or_else(|err| panic!("dynamic kind is valid: {err}"))
}

/// Defaults `delta = 1`. `val` is `reference.val + delta`, or `-1` when
/// there is nothing to follow.
#[must_use]
pub fn plus_kind() -> Rc<Kind> {
    Kind::builder("plus")
        .default("delta", 1)
        .derived("val", |cx| {
            let delta = cx.get_int("delta")?.unwrap_or(0);
            match cx.follow("reference", "val")? {
                Some(upstream) => {
                    let base = upstream.as_int().ok_or_else(|| {
                        EngineError::compute(format!(
                            "reference val must be an int, got {}",
                            upstream.type_name()
                        ))
                    })?;
                    Ok(Value::Int(base + delta))
                }
                None => Ok(Value::Int(-1)),
            }
        })
        .build()
        .unwrap_or_else(|err| panic!("plus kind is valid: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixtures_declare_expected_attributes() {
        assert!(user_kind().is_derived("full_name"));
        assert!(user_kind().is_derived("name_length"));
        assert!(dynamic_kind(&EvalCounter::new()).is_derived("dynamic"));
        assert!(plus_kind().is_derived("val"));
    }

    #[test]
    fn counter_is_shared_between_clones() {
        let counter = EvalCounter::new();
        let clone = counter.clone();
        clone.bump();
        clone.bump();
        assert_eq!(counter.get(), 2);
    }
}
