// Hash engine performance benchmarks: insert, lookup, and the rehash that
// load-factor-driven grow/shrink forces along the way.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use grouphash::GroupHash;

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");

    for size in [100, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let mut table: GroupHash<i64, i64> = GroupHash::new();
                for i in 0..size {
                    table.insert(black_box(i), i);
                }
                black_box(table);
            });
        });
    }

    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let mut table: GroupHash<i64, i64> = GroupHash::new();
    for i in 0..10_000 {
        table.insert(i, i);
    }

    c.bench_function("find_hit", |b| {
        b.iter(|| {
            for i in (0..10_000).step_by(97) {
                black_box(table.find(&i));
            }
        });
    });

    c.bench_function("find_miss", |b| {
        b.iter(|| {
            for i in (10_000..20_000).step_by(97) {
                black_box(table.find(&i));
            }
        });
    });
}

fn bench_remove_and_reinsert(c: &mut Criterion) {
    c.bench_function("remove_then_reinsert_half", |b| {
        b.iter(|| {
            let mut table: GroupHash<i64, i64> = GroupHash::new();
            for i in 0..10_000 {
                table.insert(i, i);
            }
            for i in (0..10_000).step_by(2) {
                table.remove(&i);
            }
            for i in (0..10_000).step_by(2) {
                table.insert(black_box(i), i);
            }
            black_box(table);
        });
    });
}

fn bench_iteration(c: &mut Criterion) {
    let mut table: GroupHash<i64, i64> = GroupHash::new();
    for i in 0..10_000 {
        table.insert(i, i);
    }

    c.bench_function("iterate_all", |b| {
        b.iter(|| {
            for pair in table.iter() {
                black_box(pair);
            }
        });
    });
}

criterion_group!(
    benches,
    bench_insert,
    bench_lookup,
    bench_remove_and_reinsert,
    bench_iteration
);
criterion_main!(benches);
