//! Propagation benchmarks for the behavior engine.
//!
//! Measures push throughput through observed graphs and the cost of
//! sampling graphs that nobody observes.

use std::cell::Cell;
use std::rc::Rc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rill_core::{lift2, sink_behavior, Behavior};

// =============================================================================
// Push Benchmarks
// =============================================================================

fn bench_map_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("map_chain_push");

    for depth in [1usize, 10, 100] {
        group.throughput(Throughput::Elements(depth as u64));
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            let source = sink_behavior(0u64);
            let mut tip: Behavior<u64> = source.behavior();
            for _ in 0..depth {
                tip = tip.map(|n: u64| n.wrapping_add(1));
            }
            let last = Rc::new(Cell::new(0u64));
            let last_clone = last.clone();
            let _handle = tip.subscribe(move |n| last_clone.set(n));

            let next = Cell::new(0u64);
            b.iter(|| {
                next.set(next.get() + 1);
                source.push(next.get());
                black_box(last.get())
            });
        });
    }

    group.finish();
}

fn bench_diamond(c: &mut Criterion) {
    let mut group = c.benchmark_group("diamond_push");

    group.bench_function("lift2_over_shared_source", |b| {
        let source = sink_behavior(0i64);
        let left = source.map(|n: i64| n + 1);
        let right = source.map(|n: i64| n * 2);
        let both = lift2(|l: i64, r: i64| l + r, &left, &right);
        let _handle = both.subscribe(|v| {
            black_box(v);
        });

        let next = Cell::new(0i64);
        b.iter(|| {
            next.set(next.get() + 1);
            source.push(next.get());
        });
    });

    group.finish();
}

// =============================================================================
// Pull Benchmarks
// =============================================================================

fn bench_unobserved_sample(c: &mut Criterion) {
    let mut group = c.benchmark_group("unobserved_sample");

    group.bench_function("lift2", |b| {
        let width = sink_behavior(3i64);
        let height = sink_behavior(4i64);
        let product = lift2(|x: i64, y: i64| x * y, &width, &height);
        b.iter(|| black_box(product.at()));
    });

    group.bench_function("map_chain_10", |b| {
        let source = sink_behavior(0u64);
        let mut tip: Behavior<u64> = source.behavior();
        for _ in 0..10 {
            tip = tip.map(|n: u64| n + 1);
        }
        b.iter(|| black_box(tip.at()));
    });

    group.finish();
}

criterion_group!(benches, bench_map_chain, bench_diamond, bench_unobserved_sample);
criterion_main!(benches);
