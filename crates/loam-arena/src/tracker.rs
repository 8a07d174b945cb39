//! Passive allocation bookkeeping.
//!
//! [`AllocationTracker`] receives byte and element counts from arenas and
//! makes no decisions of its own. It keeps per-arena counters keyed by
//! category, element type and storage kind, plus process-wide live totals
//! by [`AllocationKind`]. One tracker is normally shared by every arena of
//! a manager.

use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use loam_core::{ArenaId, DataType, MemoryKind};

/// What an allocation was served from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AllocationCategory {
    /// Every request, whatever path served it.
    General,
    /// Served outside the buffer (spills and pass-through).
    External,
    /// Spilled because the buffer was full.
    Spilled,
    /// Spilled into the pinned queue while trimming.
    Pinned,
}

/// Coarse class used for live totals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AllocationKind {
    /// Arena backing buffers.
    Workspace,
    /// Everything else.
    General,
}

/// Accumulated counters for one key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Usage {
    /// Number of allocations recorded.
    pub count: usize,
    /// Total bytes (after alignment).
    pub bytes: usize,
    /// Total elements.
    pub elements: usize,
}

impl Usage {
    fn add(&mut self, other: Usage) {
        self.count += other.count;
        self.bytes += other.bytes;
        self.elements += other.elements;
    }
}

type UsageKey = (AllocationCategory, DataType, MemoryKind);

#[derive(Debug)]
struct ArenaUsage {
    name: String,
    usage: IndexMap<UsageKey, Usage>,
}

#[derive(Debug, Default)]
struct TrackerState {
    arenas: IndexMap<ArenaId, ArenaUsage>,
    live: IndexMap<AllocationKind, usize>,
}

/// Shared handle to a tracker.
pub type SharedTracker = Arc<AllocationTracker>;

/// Thread-safe allocation counters.
#[derive(Debug, Default)]
pub struct AllocationTracker {
    state: Mutex<TrackerState>,
}

impl AllocationTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty tracker behind an `Arc`.
    pub fn shared() -> SharedTracker {
        Arc::new(Self::new())
    }

    // Counters stay meaningful even if a panicking thread held the lock.
    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start tracking `arena`. Re-registering resets its counters.
    pub fn register(&self, arena: ArenaId, name: &str) {
        self.lock().arenas.insert(
            arena,
            ArenaUsage {
                name: name.to_string(),
                usage: IndexMap::new(),
            },
        );
    }

    /// Stop tracking `arena` and drop its counters.
    pub fn deregister(&self, arena: ArenaId) {
        self.lock().arenas.shift_remove(&arena);
    }

    /// Whether `arena` is currently tracked.
    pub fn is_registered(&self, arena: ArenaId) -> bool {
        self.lock().arenas.contains_key(&arena)
    }

    /// Record one allocation. Unregistered arenas are ignored.
    pub fn record(
        &self,
        arena: ArenaId,
        category: AllocationCategory,
        dtype: DataType,
        kind: MemoryKind,
        elements: usize,
        bytes: usize,
    ) {
        let mut state = self.lock();
        if let Some(entry) = state.arenas.get_mut(&arena) {
            entry
                .usage
                .entry((category, dtype, kind))
                .or_default()
                .add(Usage {
                    count: 1,
                    bytes,
                    elements,
                });
        }
    }

    /// Add `bytes` to the live total for `kind`.
    pub fn mark_allocated(&self, kind: AllocationKind, bytes: usize) {
        *self.lock().live.entry(kind).or_insert(0) += bytes;
    }

    /// Subtract `bytes` from the live total for `kind`.
    pub fn mark_released(&self, kind: AllocationKind, bytes: usize) {
        let mut state = self.lock();
        let live = state.live.entry(kind).or_insert(0);
        *live = live.saturating_sub(bytes);
    }

    /// Live bytes for `kind`.
    pub fn live_bytes(&self, kind: AllocationKind) -> usize {
        self.lock().live.get(&kind).copied().unwrap_or(0)
    }

    /// Counters for `arena` in `category`, summed over types and kinds.
    pub fn usage(&self, arena: ArenaId, category: AllocationCategory) -> Usage {
        let state = self.lock();
        let mut total = Usage::default();
        if let Some(entry) = state.arenas.get(&arena) {
            for (_, usage) in entry.usage.iter().filter(|((c, _, _), _)| *c == category) {
                total.add(*usage);
            }
        }
        total
    }

    /// Total bytes requested from `arena` for storage `kind`.
    pub fn bytes_for(&self, arena: ArenaId, kind: MemoryKind) -> usize {
        let state = self.lock();
        state.arenas.get(&arena).map_or(0, |entry| {
            entry
                .usage
                .iter()
                .filter(|((c, _, k), _)| *c == AllocationCategory::General && *k == kind)
                .map(|(_, u)| u.bytes)
                .sum()
        })
    }

    /// Human-readable dump of every tracked arena.
    pub fn report(&self) -> String {
        let state = self.lock();
        let mut out = String::new();
        if state.arenas.is_empty() {
            out.push_str("no arenas tracked\n");
        }
        for (id, entry) in &state.arenas {
            let _ = writeln!(out, "arena {id} ({}):", entry.name);
            for ((category, dtype, kind), usage) in &entry.usage {
                let _ = writeln!(
                    out,
                    "  {category:?} {dtype} {kind}: {} allocations, {} bytes, {} elements",
                    usage.count, usage.bytes, usage.elements
                );
            }
        }
        for (kind, bytes) in &state.live {
            let _ = writeln!(out, "live {kind:?}: {bytes} bytes");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_only_registered_arenas() {
        let tracker = AllocationTracker::new();
        let a = ArenaId::next();
        let b = ArenaId::next();
        tracker.register(a, "a");

        tracker.record(a, AllocationCategory::General, DataType::Float, MemoryKind::Host, 8, 32);
        tracker.record(b, AllocationCategory::General, DataType::Float, MemoryKind::Host, 8, 32);

        assert_eq!(tracker.usage(a, AllocationCategory::General).bytes, 32);
        assert_eq!(tracker.usage(b, AllocationCategory::General), Usage::default());
    }

    #[test]
    fn usage_sums_across_types() {
        let tracker = AllocationTracker::new();
        let a = ArenaId::next();
        tracker.register(a, "a");
        tracker.record(a, AllocationCategory::Spilled, DataType::Float, MemoryKind::Host, 10, 64);
        tracker.record(a, AllocationCategory::Spilled, DataType::Double, MemoryKind::Device, 4, 32);

        let spilled = tracker.usage(a, AllocationCategory::Spilled);
        assert_eq!(spilled.count, 2);
        assert_eq!(spilled.bytes, 96);
        assert_eq!(spilled.elements, 14);
        assert_eq!(tracker.usage(a, AllocationCategory::Pinned).count, 0);
    }

    #[test]
    fn bytes_for_filters_by_kind() {
        let tracker = AllocationTracker::new();
        let a = ArenaId::next();
        tracker.register(a, "a");
        tracker.record(a, AllocationCategory::General, DataType::Int, MemoryKind::Host, 8, 32);
        tracker.record(a, AllocationCategory::General, DataType::Int, MemoryKind::Device, 16, 64);
        assert_eq!(tracker.bytes_for(a, MemoryKind::Host), 32);
        assert_eq!(tracker.bytes_for(a, MemoryKind::Device), 64);
    }

    #[test]
    fn deregister_drops_counters() {
        let tracker = AllocationTracker::new();
        let a = ArenaId::next();
        tracker.register(a, "a");
        assert!(tracker.is_registered(a));
        tracker.deregister(a);
        assert!(!tracker.is_registered(a));
    }

    #[test]
    fn live_totals_saturate() {
        let tracker = AllocationTracker::new();
        tracker.mark_allocated(AllocationKind::Workspace, 2048);
        tracker.mark_released(AllocationKind::Workspace, 1024);
        assert_eq!(tracker.live_bytes(AllocationKind::Workspace), 1024);
        tracker.mark_released(AllocationKind::Workspace, 4096);
        assert_eq!(tracker.live_bytes(AllocationKind::Workspace), 0);
        assert_eq!(tracker.live_bytes(AllocationKind::General), 0);
    }

    #[test]
    fn report_lists_arenas() {
        let tracker = AllocationTracker::new();
        let a = ArenaId::next();
        tracker.register(a, "batch");
        tracker.record(a, AllocationCategory::Pinned, DataType::Half, MemoryKind::Host, 16, 32);
        let report = tracker.report();
        assert!(report.contains("batch"));
        assert!(report.contains("Pinned float16 host"));
    }
}
