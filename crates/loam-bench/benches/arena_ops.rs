//! Criterion micro-benchmarks for arena allocation, spilling and scope cycles.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use loam_arena::{
    AllocationPolicy, Arena, ArenaConfig, ArenaManager, LearningPolicy, ResetPolicy, SpillPolicy,
};
use loam_bench::{bursty_profile, run_workload, training_profile};
use loam_core::{DataType, MemoryKind};

fn fixed(size: usize) -> ArenaConfig {
    ArenaConfig::new(size)
        .with_allocation(AllocationPolicy::Strict)
        .with_learning(LearningPolicy::None)
}

/// Benchmark: 64 bump allocations of 1 KiB inside one scope.
fn bench_bump_64(c: &mut Criterion) {
    let mut arena = Arena::new("bump", fixed(1 << 20)).unwrap();
    c.bench_function("bump_alloc_64x1k", |b| {
        b.iter(|| {
            arena.enter(None).unwrap();
            for _ in 0..64 {
                let h = arena
                    .alloc(1024, DataType::Float, MemoryKind::Host, false)
                    .unwrap();
                black_box(h);
            }
            arena.close().unwrap();
        });
    });
}

/// Benchmark: same requests with zero-fill.
fn bench_bump_zeroed(c: &mut Criterion) {
    let mut arena = Arena::new("zeroed", fixed(1 << 20)).unwrap();
    c.bench_function("bump_alloc_64x1k_zeroed", |b| {
        b.iter(|| {
            arena.enter(None).unwrap();
            for _ in 0..64 {
                let h = arena
                    .alloc(1024, DataType::Float, MemoryKind::Host, true)
                    .unwrap();
                black_box(h);
            }
            arena.close().unwrap();
        });
    });
}

/// Benchmark: every request spills to an external allocation.
fn bench_spill(c: &mut Criterion) {
    let mut arena = Arena::new("spill", fixed(1024)).unwrap();
    c.bench_function("spill_alloc_16x64k", |b| {
        b.iter(|| {
            arena.enter(None).unwrap();
            for _ in 0..16 {
                let h = arena
                    .alloc(64 * 1024, DataType::Float, MemoryKind::Host, false)
                    .unwrap();
                black_box(h);
            }
            arena.close().unwrap();
        });
    });
}

/// Benchmark: ring buffer that wraps every few requests.
fn bench_ring_wrap(c: &mut Criterion) {
    let config = fixed(16 * 1024).with_reset(ResetPolicy::EndOfBuffer);
    let mut arena = Arena::new("ring", config).unwrap();
    c.bench_function("ring_alloc_64x1k", |b| {
        b.iter(|| {
            arena.enter(None).unwrap();
            for _ in 0..64 {
                let h = arena
                    .alloc(1024, DataType::Float, MemoryKind::Host, false)
                    .unwrap();
                black_box(h);
            }
            arena.close().unwrap();
        });
    });
}

/// Benchmark: learn a training workload from scratch, then replay it.
fn bench_training_learn(c: &mut Criterion) {
    let workload = training_profile(42, 32);
    let config = ArenaConfig::new(0)
        .with_allocation(AllocationPolicy::Strict)
        .with_spill(SpillPolicy::Reallocate);
    c.bench_function("training_learn_32_cycles", |b| {
        b.iter_batched(
            || {
                let mut mgr = ArenaManager::new();
                let id = mgr.create("training", config.clone()).unwrap();
                (mgr, id)
            },
            |(mut mgr, id)| black_box(run_workload(&mut mgr, id, &workload).unwrap()),
            BatchSize::SmallInput,
        );
    });
}

/// Benchmark: bursty workload against a warm arena.
fn bench_bursty_warm(c: &mut Criterion) {
    let workload = bursty_profile(7, 64);
    let mut mgr = ArenaManager::new();
    let id = mgr.create("bursty", ArenaConfig::new(64 * 1024)).unwrap();
    run_workload(&mut mgr, id, &workload).unwrap();
    c.bench_function("bursty_warm_64_cycles", |b| {
        b.iter(|| black_box(run_workload(&mut mgr, id, &workload).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_bump_64,
    bench_bump_zeroed,
    bench_spill,
    bench_ring_wrap,
    bench_training_learn,
    bench_bursty_warm
);
criterion_main!(benches);
