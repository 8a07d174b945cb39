//! Arena registry and the active-arena register.
//!
//! [`ArenaManager`] is the explicit context that replaces ambient
//! per-thread state: it owns a set of arenas plus a single-slot register
//! naming the active one. Entering an arena displaces the register value
//! and the matching close restores it, so the previous arenas form a
//! stack threaded through the arenas' own scope frames.
//!
//! Scopes are normally held through a [`ScopeGuard`], which closes the
//! scope on every exit path. The guard dereferences to the manager, so
//! nested scopes and allocations go through it:
//!
//! ```
//! # use loam_arena::{ArenaConfig, ArenaError, ArenaManager};
//! # use loam_core::{DataType, MemoryKind};
//! # fn main() -> Result<(), ArenaError> {
//! let mut manager = ArenaManager::new();
//! let outer = manager.create("outer", ArenaConfig::new(8192))?;
//! let other = manager.create("other", ArenaConfig::new(1024))?;
//!
//! let mut guard = manager.enter(outer)?;
//! let block = guard.alloc(4096, DataType::Float, MemoryKind::Host, true)?;
//! assert!(block.is_some());
//! {
//!     let mut inner = guard.enter(other)?;
//!     inner.alloc(64, DataType::Int, MemoryKind::Host, false)?;
//! } // `other` closed, `outer` active again
//! assert_eq!(guard.current(), Some(outer));
//! guard.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! A manager is single-threaded. Parallel workloads give each worker its
//! own manager.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use indexmap::IndexMap;
use loam_core::{ArenaId, DataType, HostMemory, MemoryKind, SharedMemoryProvider};

use crate::arena::Arena;
use crate::config::{ArenaConfig, DebugMode};
use crate::diagnostics::ArenaStats;
use crate::error::ArenaError;
use crate::handle::BlockHandle;
use crate::state::ScopeAction;
use crate::tracker::{AllocationTracker, SharedTracker};

/// Owns arenas and the active-arena register.
pub struct ArenaManager {
    arenas: IndexMap<ArenaId, Arena>,
    names: IndexMap<String, ArenaId>,
    current: Option<ArenaId>,
    provider: SharedMemoryProvider,
    tracker: SharedTracker,
    default_config: ArenaConfig,
    debug_mode: DebugMode,
}

impl ArenaManager {
    /// A manager drawing from host memory.
    pub fn new() -> Self {
        Self::with_provider(Arc::new(HostMemory::new()))
    }

    /// A manager drawing from `provider`.
    pub fn with_provider(provider: SharedMemoryProvider) -> Self {
        Self {
            arenas: IndexMap::new(),
            names: IndexMap::new(),
            current: None,
            provider,
            tracker: AllocationTracker::shared(),
            default_config: ArenaConfig::default(),
            debug_mode: DebugMode::Disabled,
        }
    }

    /// Replace the config used by [`get_or_create_default`](Self::get_or_create_default).
    pub fn with_default_config(mut self, config: ArenaConfig) -> Self {
        self.default_config = config;
        self
    }

    /// Config used for arenas created without an explicit one.
    pub fn default_config(&self) -> &ArenaConfig {
        &self.default_config
    }

    // ── registry ────────────────────────────────────────────────

    /// Create a new arena under `name`.
    ///
    /// If `name` was already taken the name now refers to the new arena;
    /// the old one stays reachable by id.
    pub fn create(&mut self, name: &str, config: ArenaConfig) -> Result<ArenaId, ArenaError> {
        let mut arena = Arena::with_parts(
            name,
            config,
            Arc::clone(&self.provider),
            Arc::clone(&self.tracker),
        )?;
        arena.set_debug_mode(self.debug_mode);
        let id = arena.id();
        self.arenas.insert(id, arena);
        self.names.insert(name.to_string(), id);
        Ok(id)
    }

    /// The arena registered under `name`, created with `config` if missing.
    ///
    /// An existing arena is returned as-is even if its config differs.
    pub fn get_or_create(&mut self, name: &str, config: &ArenaConfig) -> Result<ArenaId, ArenaError> {
        match self.find(name) {
            Some(id) => Ok(id),
            None => self.create(name, config.clone()),
        }
    }

    /// [`get_or_create`](Self::get_or_create) with the default config.
    pub fn get_or_create_default(&mut self, name: &str) -> Result<ArenaId, ArenaError> {
        let config = self.default_config.clone();
        self.get_or_create(name, &config)
    }

    /// The live arena registered under `name`.
    pub fn find(&self, name: &str) -> Option<ArenaId> {
        self.names
            .get(name)
            .copied()
            .filter(|id| self.arenas.contains_key(id))
    }

    /// Shared access to an arena.
    pub fn arena(&self, id: ArenaId) -> Result<&Arena, ArenaError> {
        self.arenas
            .get(&id)
            .ok_or(ArenaError::UnknownArena { arena: id })
    }

    /// Mutable access to an arena.
    pub fn arena_mut(&mut self, id: ArenaId) -> Result<&mut Arena, ArenaError> {
        self.arenas
            .get_mut(&id)
            .ok_or(ArenaError::UnknownArena { arena: id })
    }

    /// Ids of every live arena, in creation order.
    pub fn ids(&self) -> Vec<ArenaId> {
        self.arenas.keys().copied().collect()
    }

    /// Number of live arenas.
    pub fn len(&self) -> usize {
        self.arenas.len()
    }

    /// Whether no arenas are live.
    pub fn is_empty(&self) -> bool {
        self.arenas.is_empty()
    }

    /// The active arena, if any.
    pub fn current(&self) -> Option<ArenaId> {
        self.current
    }

    /// The shared allocation tracker.
    pub fn tracker(&self) -> &SharedTracker {
        &self.tracker
    }

    /// The shared memory provider.
    pub fn provider(&self) -> &SharedMemoryProvider {
        &self.provider
    }

    // ── scopes ──────────────────────────────────────────────────

    /// Enter `id` and make it the active arena. Closed when the guard drops.
    pub fn enter(&mut self, id: ArenaId) -> Result<ScopeGuard<'_>, ArenaError> {
        self.open(id)?;
        Ok(ScopeGuard::new(self, id))
    }

    /// Borrow `id`: make it active without applying its reset policy on
    /// exit. Closed when the guard drops.
    pub fn borrow(&mut self, id: ArenaId) -> Result<ScopeGuard<'_>, ArenaError> {
        let displaced = self.current;
        self.arena_mut(id)?.borrow(displaced)?;
        self.current = Some(id);
        Ok(ScopeGuard::new(self, id))
    }

    /// Enter `id` without a guard. Pair with [`close`](Self::close).
    pub fn open(&mut self, id: ArenaId) -> Result<ScopeAction, ArenaError> {
        let displaced = self.current;
        let action = self.arena_mut(id)?.enter(displaced)?;
        self.current = Some(id);
        Ok(action)
    }

    /// Close the innermost scope of `id` and restore the register value it
    /// displaced.
    pub fn close(&mut self, id: ArenaId) -> Result<ScopeAction, ArenaError> {
        let arena = self.arena_mut(id)?;
        let restore = arena.pending_restore();
        let result = arena.close();
        // The frame is popped before accounting runs, so restore even if
        // the accounting failed.
        if let Some(restore) = restore {
            self.current = restore;
        }
        result
    }

    /// Clear the register until the returned guard drops. Allocations made
    /// through the guard are detached (`alloc` returns `Ok(None)`).
    pub fn scope_out(&mut self) -> ScopeOut<'_> {
        let saved = self.current.take();
        ScopeOut {
            manager: self,
            saved,
        }
    }

    // ── allocation ──────────────────────────────────────────────

    /// Allocate from the active arena, or `Ok(None)` when none is active.
    pub fn alloc(
        &mut self,
        len: usize,
        dtype: DataType,
        kind: MemoryKind,
        zero: bool,
    ) -> Result<Option<BlockHandle>, ArenaError> {
        let Some(id) = self.current else {
            return Ok(None);
        };
        self.arena_mut(id)?.alloc(len, dtype, kind, zero).map(Some)
    }

    /// Resolve a handle against the arena that issued it.
    pub fn bytes(&self, handle: &BlockHandle) -> Result<&[u8], ArenaError> {
        self.arena(handle.arena())?.bytes(handle)
    }

    /// Resolve a handle mutably.
    pub fn bytes_mut(&mut self, handle: &BlockHandle) -> Result<&mut [u8], ArenaError> {
        self.arena_mut(handle.arena())?.bytes_mut(handle)
    }

    /// Copy `handle`'s block into the open arena `target` by borrowing it.
    ///
    /// Returns the handle of the copy. The register is unchanged afterwards.
    pub fn leverage_to(
        &mut self,
        target: ArenaId,
        handle: &BlockHandle,
    ) -> Result<BlockHandle, ArenaError> {
        if handle.arena() == target {
            return Ok(*handle);
        }
        if !self.arena(target)?.is_open() {
            return Err(ArenaError::ScopeNotOpen { arena: target });
        }
        let data = self.bytes(handle)?.to_vec();

        let mut guard = self.borrow(target)?;
        let copy = guard
            .arena_mut(target)?
            .alloc(data.len(), handle.dtype(), handle.kind(), false)?;
        guard.bytes_mut(&copy)?.copy_from_slice(&data);
        guard.close()?;
        Ok(copy)
    }

    // ── teardown ────────────────────────────────────────────────

    /// Destroy an arena and forget it. Fails while it has open scopes.
    pub fn destroy(&mut self, id: ArenaId) -> Result<(), ArenaError> {
        self.arena_mut(id)?.destroy()?;
        self.forget(id);
        Ok(())
    }

    /// Destroy every arena, abandoning any open scopes, and clear the
    /// register. Returns how many arenas were torn down.
    pub fn destroy_all(&mut self) -> Result<usize, ArenaError> {
        let count = self.arenas.len();
        for (_, mut arena) in self.arenas.drain(..) {
            arena.force_destroy()?;
        }
        self.names.clear();
        self.current = None;
        tracing::debug!(count, "all arenas destroyed");
        Ok(count)
    }

    fn forget(&mut self, id: ArenaId) {
        self.arenas.shift_remove(&id);
        self.names.retain(|_, v| *v != id);
        if self.current == Some(id) {
            self.current = None;
        }
    }

    // ── diagnostics ─────────────────────────────────────────────

    /// Push a debug mode to every arena, current and future.
    pub fn set_debug_mode(&mut self, mode: DebugMode) {
        self.debug_mode = mode;
        for arena in self.arenas.values_mut() {
            arena.set_debug_mode(mode);
        }
    }

    /// The manager-wide debug mode.
    pub fn debug_mode(&self) -> DebugMode {
        self.debug_mode
    }

    /// Diagnostics for every live arena.
    pub fn stats(&self) -> Vec<ArenaStats> {
        self.arenas.values().map(Arena::stats).collect()
    }
}

impl Default for ArenaManager {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII scope over one arena.
///
/// Dereferences to the [`ArenaManager`]. Dropping the guard closes the
/// scope; errors raised then are logged. Call [`close`](Self::close) to
/// observe them instead.
#[must_use]
pub struct ScopeGuard<'a> {
    manager: &'a mut ArenaManager,
    arena: ArenaId,
    closed: bool,
}

impl<'a> ScopeGuard<'a> {
    fn new(manager: &'a mut ArenaManager, arena: ArenaId) -> Self {
        Self {
            manager,
            arena,
            closed: false,
        }
    }

    /// The arena this guard scopes.
    pub fn id(&self) -> ArenaId {
        self.arena
    }

    /// Close the scope now and report the outcome.
    pub fn close(mut self) -> Result<ScopeAction, ArenaError> {
        self.closed = true;
        self.manager.close(self.arena)
    }
}

impl Deref for ScopeGuard<'_> {
    type Target = ArenaManager;

    fn deref(&self) -> &ArenaManager {
        self.manager
    }
}

impl DerefMut for ScopeGuard<'_> {
    fn deref_mut(&mut self) -> &mut ArenaManager {
        self.manager
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(err) = self.manager.close(self.arena) {
            tracing::warn!(arena = %self.arena, error = %err, "scope close failed on drop");
        }
    }
}

/// Guard that keeps the register cleared. Restores it on drop.
#[must_use]
pub struct ScopeOut<'a> {
    manager: &'a mut ArenaManager,
    saved: Option<ArenaId>,
}

impl Deref for ScopeOut<'_> {
    type Target = ArenaManager;

    fn deref(&self) -> &ArenaManager {
        self.manager
    }
}

impl DerefMut for ScopeOut<'_> {
    fn deref_mut(&mut self) -> &mut ArenaManager {
        self.manager
    }
}

impl Drop for ScopeOut<'_> {
    fn drop(&mut self) {
        self.manager.current = self.saved;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AllocationPolicy, LearningPolicy};
    use loam_core::MemoryProvider;

    const F: DataType = DataType::Float;
    const H: MemoryKind = MemoryKind::Host;

    fn strict(initial: usize) -> ArenaConfig {
        ArenaConfig::new(initial)
            .with_allocation(AllocationPolicy::Strict)
            .with_learning(LearningPolicy::None)
    }

    #[test]
    fn alloc_without_active_arena_is_detached() {
        let mut mgr = ArenaManager::new();
        assert_eq!(mgr.alloc(64, F, H, false), Ok(None));
    }

    #[test]
    fn guard_restores_previous_arena() {
        let mut mgr = ArenaManager::new();
        let outer = mgr.create("outer", strict(1024)).unwrap();
        let inner = mgr.create("inner", strict(1024)).unwrap();
        {
            let mut g = mgr.enter(outer).unwrap();
            assert_eq!(g.current(), Some(outer));
            {
                let mut g2 = g.enter(inner).unwrap();
                assert_eq!(g2.current(), Some(inner));
                let h = g2.alloc(64, F, H, false).unwrap().unwrap();
                assert_eq!(h.arena(), inner);
            }
            assert_eq!(g.current(), Some(outer));
            assert_eq!(g.arena(outer).unwrap().previous(), None);
        }
        assert_eq!(mgr.current(), None);
        assert_eq!(mgr.arena(outer).unwrap().cycles_count(), 1);
        assert_eq!(mgr.arena(inner).unwrap().cycles_count(), 1);
    }

    #[test]
    fn reentering_same_arena_nests() {
        let mut mgr = ArenaManager::new();
        let id = mgr.create("ws", strict(1024)).unwrap();
        let mut g = mgr.enter(id).unwrap();
        let generation = g.arena(id).unwrap().generation();
        {
            let g2 = g.enter(id).unwrap();
            assert_eq!(g2.arena(id).unwrap().reentry_depth(), 1);
            assert_eq!(g2.arena(id).unwrap().generation(), generation);
        }
        assert_eq!(g.current(), Some(id));
        assert!(g.arena(id).unwrap().is_open());
        assert_eq!(g.close().unwrap(), ScopeAction::CloseCycle { restore: None });
    }

    #[test]
    fn borrow_restores_lender() {
        let mut mgr = ArenaManager::new();
        let home = mgr.create("home", strict(1024)).unwrap();
        let lent = mgr.create("lent", strict(1024)).unwrap();
        let mut g = mgr.enter(home).unwrap();
        {
            let mut b = g.borrow(lent).unwrap();
            assert_eq!(b.current(), Some(lent));
            assert!(matches!(
                b.borrow(lent),
                Err(ArenaError::AlreadyBorrowed { .. })
            ));
        }
        assert_eq!(g.current(), Some(home));
        assert_eq!(g.arena(lent).unwrap().cycles_count(), 0);
    }

    #[test]
    fn scope_out_detaches_allocations() {
        let mut mgr = ArenaManager::new();
        let id = mgr.create("ws", strict(1024)).unwrap();
        let mut g = mgr.enter(id).unwrap();
        {
            let mut out = g.scope_out();
            assert_eq!(out.current(), None);
            assert_eq!(out.alloc(64, F, H, false), Ok(None));
        }
        assert_eq!(g.current(), Some(id));
        assert!(g.alloc(64, F, H, false).unwrap().is_some());
    }

    #[test]
    fn leverage_copies_into_target() {
        let mut mgr = ArenaManager::new();
        let src = mgr.create("src", strict(1024)).unwrap();
        let dst = mgr.create("dst", strict(1024)).unwrap();
        mgr.open(dst).unwrap();
        let mut g = mgr.enter(src).unwrap();
        let h = g.alloc(8, DataType::Byte, H, true).unwrap().unwrap();
        g.bytes_mut(&h).unwrap()[..4].copy_from_slice(&[1, 2, 3, 4]);

        let copy = g.leverage_to(dst, &h).unwrap();
        assert_eq!(copy.arena(), dst);
        assert_eq!(&g.bytes(&copy).unwrap()[..4], &[1, 2, 3, 4]);
        assert_eq!(g.current(), Some(src));
        assert!(!g.arena(dst).unwrap().is_borrowed());
    }

    #[test]
    fn leverage_to_closed_arena_fails() {
        let mut mgr = ArenaManager::new();
        let src = mgr.create("src", strict(1024)).unwrap();
        let dst = mgr.create("dst", strict(1024)).unwrap();
        let mut g = mgr.enter(src).unwrap();
        let h = g.alloc(8, F, H, false).unwrap().unwrap();
        assert_eq!(
            g.leverage_to(dst, &h),
            Err(ArenaError::ScopeNotOpen { arena: dst })
        );
    }

    #[test]
    fn get_or_create_reuses_by_name() {
        let mut mgr = ArenaManager::new().with_default_config(strict(256));
        let a = mgr.get_or_create_default("batch").unwrap();
        let b = mgr.get_or_create("batch", &strict(4096)).unwrap();
        assert_eq!(a, b);
        assert_eq!(mgr.arena(a).unwrap().current_size(), 256);
        assert_eq!(mgr.len(), 1);
    }

    #[test]
    fn destroy_forgets_arena() {
        let mut mgr = ArenaManager::new();
        let id = mgr.create("gone", strict(1024)).unwrap();
        mgr.destroy(id).unwrap();
        assert!(mgr.find("gone").is_none());
        assert_eq!(
            mgr.destroy(id),
            Err(ArenaError::UnknownArena { arena: id })
        );
    }

    #[test]
    fn destroy_open_arena_fails() {
        let mut mgr = ArenaManager::new();
        let id = mgr.create("busy", strict(1024)).unwrap();
        mgr.open(id).unwrap();
        assert_eq!(
            mgr.destroy(id),
            Err(ArenaError::ScopeStillOpen { arena: id })
        );
    }

    #[test]
    fn destroy_all_releases_memory() {
        let mem = Arc::new(HostMemory::new());
        let mut mgr = ArenaManager::with_provider(mem.clone());
        let a = mgr.create("a", strict(1024)).unwrap();
        mgr.create("b", strict(2048)).unwrap();
        mgr.open(a).unwrap();
        let _ = mgr.alloc(4096, F, H, false).unwrap();
        assert_eq!(mgr.destroy_all().unwrap(), 2);
        assert!(mgr.is_empty());
        assert_eq!(mgr.current(), None);
        assert_eq!(mem.live_regions(), 0);
    }

    #[test]
    fn debug_mode_reaches_new_and_existing_arenas() {
        let mut mgr = ArenaManager::new();
        let a = mgr.create("a", strict(1024)).unwrap();
        mgr.set_debug_mode(DebugMode::SpillEverything);
        let b = mgr.create("b", strict(1024)).unwrap();
        for id in [a, b] {
            let mut g = mgr.enter(id).unwrap();
            assert!(g.alloc(32, F, H, false).unwrap().unwrap().is_spilled());
        }
    }

    #[test]
    fn unknown_arena_reported() {
        let mut mgr = ArenaManager::new();
        let stray = ArenaId::next();
        assert!(matches!(
            mgr.enter(stray),
            Err(ArenaError::UnknownArena { .. })
        ));
    }

    #[test]
    fn stats_cover_all_arenas() {
        let mut mgr = ArenaManager::new();
        mgr.create("a", strict(64)).unwrap();
        mgr.create("b", strict(64)).unwrap();
        let names: Vec<_> = mgr.stats().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
