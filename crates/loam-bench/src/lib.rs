//! Benchmark workloads for Loam arenas.
//!
//! Provides seeded synthetic workloads for benchmarking and examples:
//!
//! - [`training_profile`]: steady forward/backward passes of similar size
//! - [`bursty_profile`]: mostly small cycles with occasional large spikes
//! - [`run_workload`]: drive a workload through an [`ArenaManager`]

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use loam_arena::{ArenaError, ArenaManager};
use loam_core::{ArenaId, DataType, MemoryKind};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// A sequence of scope cycles, each a list of request sizes in bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Workload {
    pub name: &'static str,
    pub cycles: Vec<Vec<usize>>,
}

impl Workload {
    /// Bytes requested by the largest cycle.
    pub fn peak_cycle_bytes(&self) -> usize {
        self.cycles
            .iter()
            .map(|c| c.iter().sum::<usize>())
            .max()
            .unwrap_or(0)
    }

    /// Total number of requests.
    pub fn request_count(&self) -> usize {
        self.cycles.iter().map(Vec::len).sum()
    }
}

/// Steady workload: `cycles` passes of 8..24 requests of 1-16 KiB each.
pub fn training_profile(seed: u64, cycles: usize) -> Workload {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let cycles = (0..cycles)
        .map(|_| {
            let requests = rng.random_range(8..24);
            (0..requests)
                .map(|_| rng.random_range(1024..16 * 1024))
                .collect()
        })
        .collect();
    Workload {
        name: "training",
        cycles,
    }
}

/// Spiky workload: small cycles with a 1-in-8 chance of a 1 MiB burst.
pub fn bursty_profile(seed: u64, cycles: usize) -> Workload {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let cycles = (0..cycles)
        .map(|_| {
            let mut sizes: Vec<usize> = (0..4).map(|_| rng.random_range(64..4096)).collect();
            if rng.random_range(0..8) == 0 {
                sizes.push(1024 * 1024);
            }
            sizes
        })
        .collect();
    Workload {
        name: "bursty",
        cycles,
    }
}

/// Counters from one [`run_workload`] pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub allocations: usize,
    pub spilled: usize,
    pub bytes: usize,
}

/// Run every cycle of `workload` through arena `id`, touching the first
/// byte of each block.
pub fn run_workload(
    manager: &mut ArenaManager,
    id: ArenaId,
    workload: &Workload,
) -> Result<RunSummary, ArenaError> {
    let mut summary = RunSummary::default();
    for cycle in &workload.cycles {
        let mut scope = manager.enter(id)?;
        for &len in cycle {
            let Some(block) = scope.alloc(len, DataType::Float, MemoryKind::Host, false)? else {
                continue;
            };
            if let Some(first) = scope.bytes_mut(&block)?.first_mut() {
                *first = 1;
            }
            summary.allocations += 1;
            summary.bytes += block.len();
            if block.is_spilled() {
                summary.spilled += 1;
            }
        }
        scope.close()?;
    }
    Ok(summary)
}
