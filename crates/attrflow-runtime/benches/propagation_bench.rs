//! Benchmarks for propagation cost.
//!
//! - chain:   one write at the head of N linked instances
//! - fan_out: one write read by N derived attributes on separate instances
//! - switch:  dependency switching on a single instance
//! - suppressed: a write whose first derived hop does not change
//!
//! Run with: cargo bench -p attrflow-runtime --bench propagation_bench

use std::hint::black_box;
use std::rc::Rc;

use attrflow_core::{InstanceId, Value};
use attrflow_runtime::{Kind, Session};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

const SIZES: &[usize] = &[16, 128, 1024];

fn link_kind() -> Rc<Kind> {
    Kind::builder("link")
        .derived("val", |cx| {
            let upstream = cx.follow("up", "val")?.and_then(|v| v.as_int());
            Ok(Value::Int(upstream.unwrap_or(0) + 1))
        })
        .build()
        .expect("link kind")
}

fn chain(len: usize) -> (Session, InstanceId) {
    let mut session = Session::new();
    let head = session
        .create(&Kind::plain(), [("val", 0)])
        .expect("create head");
    let kind = link_kind();
    let mut up = head;
    for _ in 0..len {
        up = session
            .create(&kind, [("up", Value::from(up))])
            .expect("create link");
    }
    (session, head)
}

fn bench_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagate/chain");
    for &len in SIZES {
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, &len| {
            let (mut session, head) = chain(len);
            let mut next = 0i64;
            b.iter(|| {
                next += 1;
                black_box(session.set(head, "val", next).expect("set"));
            });
        });
    }
    group.finish();
}

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagate/fan_out");
    let kind = link_kind();
    for &width in SIZES {
        group.throughput(Throughput::Elements(width as u64));
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, &width| {
            let mut session = Session::new();
            let hub = session
                .create(&Kind::plain(), [("val", 0)])
                .expect("create hub");
            for _ in 0..width {
                session
                    .create(&kind, [("up", Value::from(hub))])
                    .expect("create leaf");
            }
            let mut next = 0i64;
            b.iter(|| {
                next += 1;
                black_box(session.set(hub, "val", next).expect("set"));
            });
        });
    }
    group.finish();
}

fn bench_switch(c: &mut Criterion) {
    let kind = Kind::builder("switch")
        .default("a", 1)
        .default("b", 2)
        .default("active", 0)
        .derived("picked", |cx| {
            let key = if cx.get_int("active")? == Some(0) { "a" } else { "b" };
            Ok(cx.get(key)?.unwrap_or(Value::Null))
        })
        .build()
        .expect("switch kind");

    c.bench_function("propagate/switch", |b| {
        let mut session = Session::new();
        let id = session
            .create(&kind, [] as [(&str, i64); 0])
            .expect("create");
        let mut active = 0i64;
        b.iter(|| {
            active ^= 1;
            black_box(session.set(id, "active", active).expect("set"));
        });
    });
}

fn bench_suppressed(c: &mut Criterion) {
    let kind = Kind::builder("parity")
        .default("x", 0)
        .derived("parity", |cx| {
            Ok(Value::Int(cx.get_int("x")?.unwrap_or(0).rem_euclid(2)))
        })
        .derived("label", |cx| Ok(Value::from(cx.get_int("parity")? == Some(1))))
        .build()
        .expect("parity kind");

    c.bench_function("propagate/suppressed", |b| {
        let mut session = Session::new();
        let id = session
            .create(&kind, [] as [(&str, i64); 0])
            .expect("create");
        let mut x = 0i64;
        b.iter(|| {
            x += 2;
            black_box(session.set(id, "x", x).expect("set"));
        });
    });
}

criterion_group!(
    benches,
    bench_chain,
    bench_fan_out,
    bench_switch,
    bench_suppressed
);
criterion_main!(benches);
