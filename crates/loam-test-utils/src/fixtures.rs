//! Reusable arena config fixtures.
//!
//! - [`strict_config`]: fixed-size, no learning, no over-allocation.
//! - [`learning_config`]: starts empty and sizes itself on the first loop.
//! - [`growing_config`]: grows whenever a cycle spills.
//! - [`ring_config`] / [`trimming_ring_config`]: ring-buffer arenas.
//! - [`mmap_config`]: file-backed arena of a fixed size.

use std::path::Path;

use loam_arena::{
    AllocationPolicy, ArenaConfig, LearningPolicy, LocationPolicy, ResetPolicy, SpillPolicy,
};

/// Fixed-size arena: exactly `size` usable bytes, spills go external.
pub fn strict_config(size: usize) -> ArenaConfig {
    ArenaConfig::new(size)
        .with_allocation(AllocationPolicy::Strict)
        .with_learning(LearningPolicy::None)
}

/// Empty arena that learns its size from the first closed cycle.
pub fn learning_config() -> ArenaConfig {
    ArenaConfig::new(0)
        .with_allocation(AllocationPolicy::Strict)
        .with_learning(LearningPolicy::FirstLoop)
}

/// Arena that reallocates to the largest cycle whenever it is too small.
pub fn growing_config(initial: usize) -> ArenaConfig {
    ArenaConfig::new(initial)
        .with_allocation(AllocationPolicy::Strict)
        .with_learning(LearningPolicy::FirstLoop)
        .with_spill(SpillPolicy::Reallocate)
}

/// Ring buffer of exactly `size` bytes that spills externally.
pub fn ring_config(size: usize) -> ArenaConfig {
    strict_config(size).with_reset(ResetPolicy::EndOfBuffer)
}

/// Learning ring buffer that trims (pins) oversized cycles.
pub fn trimming_ring_config() -> ArenaConfig {
    ArenaConfig::new(0)
        .with_allocation(AllocationPolicy::Strict)
        .with_learning(LearningPolicy::FirstLoop)
        .with_reset(ResetPolicy::EndOfBuffer)
        .with_spill(SpillPolicy::Reallocate)
}

/// Memory-mapped arena over `path`, extended to `size` bytes if shorter.
pub fn mmap_config(path: &Path, size: usize) -> ArenaConfig {
    ArenaConfig::new(size)
        .with_allocation(AllocationPolicy::Strict)
        .with_learning(LearningPolicy::None)
        .with_location(LocationPolicy::Mmap)
        .with_temp_file(path)
}
