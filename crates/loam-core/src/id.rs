//! Strongly-typed identifiers for arenas, generations, steps and regions.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for unique [`ArenaId`] allocation.
static ARENA_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique per-instance identifier for an arena.
///
/// Allocated from a monotonic atomic counter via [`ArenaId::next`].
/// Two arenas never share an ID within a process, even if one was
/// destroyed and another created with the same name and configuration.
/// Handles carry the ID so a block can never be resolved against the
/// wrong arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArenaId(u64);

impl ArenaId {
    /// Allocate a fresh, unique arena ID. Thread-safe.
    pub fn next() -> Self {
        Self(ARENA_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ArenaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one open-scope lifetime of an arena.
///
/// Incremented on every top-level scope entry. Consumers key per-use
/// caches on it: a cache built under generation `n` is stale once the
/// arena reports `n + 1`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GenerationId(pub u64);

impl GenerationId {
    /// The generation that follows this one.
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for GenerationId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Ring-buffer step counter: number of full passes over a circular arena.
///
/// Pinned allocations are tagged with the step at which they were made
/// and released once they have aged by two steps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepId(pub u64);

impl StepId {
    /// Number of steps elapsed since `earlier` (zero if `earlier` is later).
    pub fn since(self, earlier: StepId) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for StepId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Identifies one region handed out by a [`MemoryProvider`](crate::MemoryProvider).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(pub u64);

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_ids_are_unique() {
        let a = ArenaId::next();
        let b = ArenaId::next();
        assert_ne!(a, b);
        assert!(b.get() > a.get());
    }

    #[test]
    fn generation_next_increments_by_one() {
        assert_eq!(GenerationId(7).next(), GenerationId(8));
    }

    #[test]
    fn step_since_saturates() {
        assert_eq!(StepId(5).since(StepId(3)), 2);
        assert_eq!(StepId(3).since(StepId(5)), 0);
    }
}
