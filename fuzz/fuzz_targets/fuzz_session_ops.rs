#![no_main]

use arbitrary::Arbitrary;
use attrflow_core::{InstanceId, Value};
use attrflow_runtime::{EngineError, Kind, Session, SessionConfig};
use libfuzzer_sys::fuzz_target;

const KEYS: [&str; 4] = ["a", "b", "c", "link"];
const DERIVED: [&str; 3] = ["x", "y", "z"];

#[derive(Arbitrary, Debug)]
enum Op {
    Create { a: i8, b: i8 },
    Set { slot: u8, key: u8, value: i8 },
    Link { slot: u8, target: u8 },
    Unset { slot: u8, key: u8 },
    Get { slot: u8, name: u8 },
    Invalidate { slot: u8, name: u8 },
    Destroy { slot: u8 },
}

/// Derived attributes whose reads depend on the plain values, so any write
/// can reshape the graph or close a cycle.
fn kind() -> std::rc::Rc<Kind> {
    Kind::builder("fuzz")
        .derived("x", |cx| {
            let a = cx.get_int("a")?.unwrap_or(0);
            if a % 3 == 0 {
                return Ok(cx.get("z")?.unwrap_or(Value::Null));
            }
            Ok(Value::Int(a.wrapping_add(cx.get_int("b")?.unwrap_or(0))))
        })
        .derived("y", |cx| {
            let b = cx.get_int("b")?.unwrap_or(0);
            if b < -100 {
                return Err(EngineError::compute("b too small"));
            }
            match cx.follow("link", "x")? {
                Some(v) => Ok(v),
                None => Ok(Value::Int(b)),
            }
        })
        .derived("z", |cx| {
            if cx.get_int("c")?.unwrap_or(0) > 0 {
                Ok(cx.get("x")?.unwrap_or(Value::Null))
            } else {
                Ok(cx.get("y")?.unwrap_or(Value::Null))
            }
        })
        .build()
        .unwrap_or_else(|err| panic!("fuzz kind: {err}"))
}

fuzz_target!(|ops: Vec<Op>| {
    let kind = kind();
    let mut session = Session::with_config(SessionConfig::default().with_max_eval_depth(64));
    let mut slots: Vec<InstanceId> = Vec::new();
    let pick = |slots: &[InstanceId], slot: u8| {
        (!slots.is_empty()).then(|| slots[usize::from(slot) % slots.len()])
    };

    for op in ops.into_iter().take(256) {
        match op {
            Op::Create { a, b } => {
                if let Ok(id) = session.create(&kind, [("a", i64::from(a)), ("b", i64::from(b))]) {
                    slots.push(id);
                }
            }
            Op::Set { slot, key, value } => {
                if let Some(id) = pick(&slots, slot) {
                    let key = KEYS[usize::from(key) % 3];
                    let _ = session.set(id, key, i64::from(value));
                }
            }
            Op::Link { slot, target } => {
                if let (Some(id), Some(to)) = (pick(&slots, slot), pick(&slots, target)) {
                    let _ = session.set(id, "link", Value::from(to));
                }
            }
            Op::Unset { slot, key } => {
                if let Some(id) = pick(&slots, slot) {
                    let _ = session.unset(id, KEYS[usize::from(key) % KEYS.len()]);
                }
            }
            Op::Get { slot, name } => {
                if let Some(id) = pick(&slots, slot) {
                    let _ = session.get(id, DERIVED[usize::from(name) % DERIVED.len()]);
                }
            }
            Op::Invalidate { slot, name } => {
                if let Some(id) = pick(&slots, slot) {
                    let _ = session.invalidate(id, DERIVED[usize::from(name) % DERIVED.len()]);
                }
            }
            Op::Destroy { slot } => {
                if let Some(id) = pick(&slots, slot) {
                    let _ = session.destroy(id);
                    slots.retain(|s| *s != id);
                }
            }
        }
        let problems = session.audit();
        assert!(problems.is_empty(), "inconsistent session: {problems:?}");
    }
});
