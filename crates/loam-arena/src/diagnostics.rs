//! Read-only diagnostics snapshot.

use std::fmt;

use loam_core::{ArenaId, GenerationId, StepId};

/// Point-in-time counters for one arena, for logging and telemetry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArenaStats {
    /// Arena identifier.
    pub id: ArenaId,
    /// Registered name.
    pub name: String,
    /// Usable capacity of the backing buffer in bytes.
    pub current_size: usize,
    /// Next free byte offset.
    pub bump_offset: usize,
    /// Bytes requested so far in the open cycle.
    pub cycle_allocations: usize,
    /// Bytes requested during the previous cycle.
    pub last_cycle_allocations: usize,
    /// Largest cycle observed.
    pub max_cycle_allocations: usize,
    /// Closed cycles.
    pub cycles_count: u64,
    /// Ring-buffer steps.
    pub steps_count: StepId,
    /// Scope generation.
    pub generation: GenerationId,
    /// Outstanding external allocations.
    pub external_count: usize,
    /// Bytes held by spilled external allocations.
    pub spilled_bytes: usize,
    /// Outstanding pinned allocations.
    pub pinned_count: usize,
    /// Bytes held by pinned allocations.
    pub pinned_bytes: usize,
    /// Whether a cycle is open.
    pub is_open: bool,
    /// Whether the arena is lent out.
    pub is_borrowed: bool,
    /// Whether trimmed mode is active.
    pub trimming: bool,
}

impl ArenaStats {
    /// Fraction of the buffer in use, in `[0, 1]`. Zero for empty arenas.
    pub fn utilisation(&self) -> f64 {
        if self.current_size == 0 {
            0.0
        } else {
            (self.bump_offset.min(self.current_size) as f64) / self.current_size as f64
        }
    }
}

impl fmt::Display for ArenaStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "arena {} [{}]: size={} offset={} last_cycle={} max_cycle={} cycles={} steps={} \
             external={} ({} B) pinned={} ({} B)",
            self.id,
            self.name,
            self.current_size,
            self.bump_offset,
            self.last_cycle_allocations,
            self.max_cycle_allocations,
            self.cycles_count,
            self.steps_count,
            self.external_count,
            self.spilled_bytes,
            self.pinned_count,
            self.pinned_bytes,
        )
    }
}
