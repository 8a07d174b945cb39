//! The workspace arena.
//!
//! An [`Arena`] owns one backing buffer and hands out aligned sub-ranges
//! from it in bump-pointer fashion while a scope is open. Requests that do
//! not fit are either refused, wrapped (ring-buffer mode) or spilled into
//! standalone allocations from the memory provider. Closing a scope runs
//! the cycle accounting that drives resizing.
//!
//! The per-cycle flow is:
//! 1. [`Arena::enter`] opens a cycle: offsets reset (reset-on-close mode),
//!    planned purges run, and the generation advances.
//! 2. [`Arena::alloc`] serves requests: bump, wrap, or spill.
//! 3. [`Arena::close`] counts the cycle, ages pinned blocks, applies the
//!    learning policy, and resets or pads the offset.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use indexmap::IndexMap;
use loam_core::{
    ArenaId, DataType, GenerationId, HostMemory, MemoryKind, RawRegion, SharedMemoryProvider,
    StepId,
};

use crate::config::{
    AllocationPolicy, ArenaConfig, DebugMode, LearningPolicy, LocationPolicy, ResetPolicy,
    SpillPolicy,
};
use crate::diagnostics::ArenaStats;
use crate::error::ArenaError;
use crate::handle::{BlockHandle, BlockLocation};
use crate::paged::{PagedRegion, SAFETY_OFFSET};
use crate::state::{ScopeAction, ScopeEvent, ScopeState};
use crate::storage::BackingFile;
use crate::tracker::{AllocationCategory, AllocationKind, AllocationTracker, SharedTracker};

/// Every request length is rounded up to a multiple of this many bytes.
pub const ALIGNMENT_BASE: usize = 32;

/// Pinned blocks and trims are released once they are this many steps old.
pub const PIN_AGE_STEPS: u64 = 2;

/// Headroom added to learned ring-buffer sizes.
const RING_GROWTH: f64 = 1.3;

/// Round `len` up to [`ALIGNMENT_BASE`]. `None` on overflow.
pub fn align_len(len: usize) -> Option<usize> {
    len.checked_next_multiple_of(ALIGNMENT_BASE)
}

struct PinnedBlock {
    slot: u64,
    step: StepId,
    region: RawRegion,
}

/// A reusable bump-allocated workspace.
///
/// Single-owner: the arena records the thread that built it and refuses
/// to be entered or borrowed from any other. Parallel workloads give each
/// worker its own arena.
pub struct Arena {
    id: ArenaId,
    name: String,
    config: ArenaConfig,
    provider: SharedMemoryProvider,
    tracker: SharedTracker,
    storage: Option<BackingFile>,
    buffer: Option<PagedRegion>,
    owner: ThreadId,
    state: ScopeState,

    current_size: usize,
    initial_block_size: usize,
    bump_offset: usize,
    cycle_allocations: usize,
    last_cycle_allocations: usize,
    max_cycle_allocations: usize,
    spilled_bytes: usize,
    pinned_bytes: usize,
    cycles_count: u64,
    steps_count: StepId,
    generation: GenerationId,
    /// Bumped whenever issued buffer offsets stop being valid.
    epoch: u64,

    external: IndexMap<u64, RawRegion>,
    pinned: VecDeque<PinnedBlock>,
    next_slot: u64,

    trim_step: Option<StepId>,
    reset_planned: bool,
    initialized: bool,
    overallocated: bool,
    enabled: bool,
    disabled_allocations: u64,
    debug: bool,
    debug_mode: DebugMode,
}

impl Arena {
    /// Create an arena backed by host memory with its own tracker.
    pub fn new(name: impl Into<String>, config: ArenaConfig) -> Result<Self, ArenaError> {
        Self::with_parts(
            name,
            config,
            Arc::new(HostMemory::new()),
            AllocationTracker::shared(),
        )
    }

    /// Create an arena drawing memory from `provider` and reporting to
    /// `tracker`.
    ///
    /// Validates `config`, prepares the backing file for memory-mapped
    /// arenas, and allocates the buffer when the initial size is non-zero.
    pub fn with_parts(
        name: impl Into<String>,
        mut config: ArenaConfig,
        provider: SharedMemoryProvider,
        tracker: SharedTracker,
    ) -> Result<Self, ArenaError> {
        config.validate()?;

        let storage = match config.policy_location {
            LocationPolicy::Mmap => {
                let backing = BackingFile::prepare(&config)?;
                config.initial_size = backing.len();
                Some(backing)
            }
            LocationPolicy::Ram => None,
        };

        let id = ArenaId::next();
        let name = name.into();
        tracker.register(id, &name);

        let mut arena = Self {
            id,
            name,
            current_size: config.initial_size,
            config,
            provider,
            tracker,
            storage,
            buffer: None,
            owner: thread::current().id(),
            state: ScopeState::new(id),
            initial_block_size: 0,
            bump_offset: 0,
            cycle_allocations: 0,
            last_cycle_allocations: 0,
            max_cycle_allocations: 0,
            spilled_bytes: 0,
            pinned_bytes: 0,
            cycles_count: 0,
            steps_count: StepId(0),
            generation: GenerationId(0),
            epoch: 0,
            external: IndexMap::new(),
            pinned: VecDeque::new(),
            next_slot: 0,
            trim_step: None,
            reset_planned: false,
            initialized: false,
            overallocated: false,
            enabled: true,
            disabled_allocations: 0,
            debug: false,
            debug_mode: DebugMode::Disabled,
        };
        arena.init()?;

        tracing::debug!(
            arena = %arena.id,
            name = %arena.name,
            size = arena.current_size,
            reset = %arena.config.policy_reset,
            "arena created"
        );
        Ok(arena)
    }

    // ── scope lifecycle ─────────────────────────────────────────

    /// Enter a scope.
    ///
    /// `displaced` is the caller's previously active arena; it is handed
    /// back by the matching [`close`](Self::close). Entering an arena that
    /// is already open is a nested re-entry with no side effects, even when
    /// it is not the caller's active arena: it is not reset.
    pub fn enter(&mut self, displaced: Option<ArenaId>) -> Result<ScopeAction, ArenaError> {
        self.check_thread()?;
        let action = self.state.apply(ScopeEvent::Enter { displaced })?;
        if action == ScopeAction::OpenCycle {
            self.open_cycle();
        }
        Ok(action)
    }

    /// Activate the arena temporarily without cycle accounting.
    ///
    /// The matching [`close`](Self::close) hands back `displaced` and
    /// applies no reset. Borrowing an already borrowed arena fails with
    /// [`ArenaError::AlreadyBorrowed`].
    pub fn borrow(&mut self, displaced: Option<ArenaId>) -> Result<ScopeAction, ArenaError> {
        self.check_thread()?;
        let action = self.state.apply(ScopeEvent::Borrow { displaced })?;
        tracing::debug!(arena = %self.id, "arena borrowed");
        Ok(action)
    }

    /// Close the innermost enter or borrow.
    ///
    /// The scope transition happens before the cycle accounting, so the
    /// scope is closed even when a resize during accounting fails.
    pub fn close(&mut self) -> Result<ScopeAction, ArenaError> {
        let action = self.state.apply(ScopeEvent::Close)?;
        if let ScopeAction::CloseCycle { .. } = action {
            self.close_cycle()?;
        }
        Ok(action)
    }

    /// Register value the next [`close`](Self::close) will hand back.
    pub fn pending_restore(&self) -> Option<Option<ArenaId>> {
        self.state.pending_restore()
    }

    /// Release the buffer and every spilled block, and stop tracking.
    ///
    /// Only allowed when no scope is open or borrowed. Terminal.
    pub fn destroy(&mut self) -> Result<(), ArenaError> {
        self.state.apply(ScopeEvent::Destroy)?;
        self.release_buffer(true);
        self.current_size = 0;
        self.tracker.deregister(self.id);
        tracing::debug!(arena = %self.id, name = %self.name, "arena destroyed");
        Ok(())
    }

    /// Drop every open frame without accounting, then destroy.
    pub(crate) fn force_destroy(&mut self) -> Result<(), ArenaError> {
        self.state.abandon();
        self.destroy()
    }

    fn open_cycle(&mut self) {
        if self.config.policy_reset == ResetPolicy::BlockLeft {
            self.reset();
        }
        if !self.external.is_empty()
            && (self.config.policy_reset == ResetPolicy::BlockLeft || self.reset_planned)
        {
            self.purge_external();
            self.reset_planned = false;
        }
        self.cycle_allocations = 0;
        self.disabled_allocations = 0;
        self.generation = self.generation.next();
        tracing::debug!(arena = %self.id, generation = %self.generation, "scope opened");
    }

    fn close_cycle(&mut self) -> Result<(), ArenaError> {
        self.cycles_count += 1;
        if self.config.is_ring()
            && self.cycles_count > 1
            && (self.cycles_count - 1) % self.config.steps_per_wrap() == 0
        {
            self.steps_count = StepId(self.steps_count.0 + 1);
            tracing::debug!(arena = %self.id, step = %self.steps_count, "ring step advanced");
        }

        if !self.enabled {
            tracing::warn!(arena = %self.id, "pass-through mode was never switched off; re-enabling");
            self.enabled = true;
        }

        if self.cycle_allocations > self.max_cycle_allocations {
            self.max_cycle_allocations = self.cycle_allocations;
        }

        if self.config.policy_learning != LearningPolicy::None && self.max_cycle_allocations > 0 {
            if !self.external.is_empty()
                && (self.config.policy_reset == ResetPolicy::BlockLeft || self.reset_planned)
            {
                self.purge_external();
                self.reset_planned = false;
            }

            if self.should_learn() && self.debug_mode != DebugMode::SpillEverything {
                self.initialize()?;
            }
        }

        if !self.pinned.is_empty() {
            self.purge_pinned(false);
        }

        if self.trim_aged() {
            self.initial_block_size = self.max_cycle_allocations;
            self.initialize()?;
            self.trim_step = None;
            self.reset();
            tracing::debug!(arena = %self.id, size = self.current_size, "trim finalised");
        }

        self.last_cycle_allocations = self.cycle_allocations;
        self.disabled_allocations = 0;

        match self.config.policy_reset {
            ResetPolicy::BlockLeft => self.reset(),
            ResetPolicy::EndOfBuffer => {
                if self.current_size > 0 && self.trim_step.is_none() && self.initial_block_size > 0 {
                    let padded = self
                        .bump_offset
                        .checked_next_multiple_of(self.initial_block_size)
                        .unwrap_or(self.current_size);
                    if self.debug {
                        tracing::trace!(
                            arena = %self.id,
                            from = self.bump_offset,
                            to = padded,
                            block = self.initial_block_size,
                            "ring offset padded"
                        );
                    }
                    self.bump_offset = padded;
                }
            }
        }

        tracing::debug!(
            arena = %self.id,
            cycle = self.cycles_count,
            bytes = self.cycle_allocations,
            "scope closed"
        );
        self.cycle_allocations = 0;
        Ok(())
    }

    fn should_learn(&self) -> bool {
        let learning = self.config.policy_learning;
        (learning == LearningPolicy::FirstLoop && self.current_size == 0)
            || (learning == LearningPolicy::OverTime
                && self.cycles_count >= self.config.cycles_before_initialization)
            || (self.current_size > 0
                && self.cycle_allocations > 0
                && self.config.policy_spill == SpillPolicy::Reallocate
                && !self.config.is_ring())
    }

    fn trim_aged(&self) -> bool {
        self.trim_step
            .is_some_and(|start| self.steps_count.since(start) >= PIN_AGE_STEPS)
    }

    // ── sizing ──────────────────────────────────────────────────

    /// Run the learning pass now.
    ///
    /// Rebuilds the buffer when it has never been sized, when it is
    /// smaller than the largest observed cycle and growth is allowed, or
    /// when a trim has aged out. No-op under [`LearningPolicy::None`].
    pub fn initialize(&mut self) -> Result<(), ArenaError> {
        self.ensure_alive()?;
        if self.config.policy_learning == LearningPolicy::None {
            return Ok(());
        }

        let mut rebuild = !self.initialized;

        let too_small = self.current_size < self.max_cycle_allocations
            || self.current_size < self.cycle_allocations;
        let growth = self.config.policy_spill == SpillPolicy::Reallocate
            || self.config.policy_learning == LearningPolicy::OverTime;
        let under_cap =
            self.config.max_size == 0 || self.max_cycle_allocations < self.config.max_size;
        if too_small && growth && under_cap && !self.config.is_ring() {
            self.release_buffer(true);
            rebuild = true;
        }

        if self.trim_aged() {
            self.release_buffer(false);
            rebuild = true;
        }

        if !rebuild {
            return Ok(());
        }

        let mut size = if self.config.max_size > 0 {
            self.max_cycle_allocations.min(self.config.max_size)
        } else {
            self.max_cycle_allocations
        };

        if self.config.is_ring() {
            size = ((size as f64) * RING_GROWTH) as usize;
            size = size.checked_next_multiple_of(8).unwrap_or(size);
            self.max_cycle_allocations = size;
        }

        self.initial_block_size = size;

        if !self.overallocated
            && self.config.policy_allocation == AllocationPolicy::Overallocate
            && self.config.overallocation_limit > 0.0
            && size > 0
        {
            size = size.saturating_add(((size as f64) * self.config.overallocation_limit) as usize);
            self.overallocated = true;
        }

        if self.config.min_size > 0 && size < self.config.min_size {
            size = self.config.min_size;
        }

        if !self.external.is_empty()
            && (self.config.policy_reset == ResetPolicy::BlockLeft || self.reset_planned)
        {
            self.purge_external();
            self.reset_planned = false;
        }

        tracing::debug!(
            arena = %self.id,
            from = self.current_size,
            to = size,
            max_cycle = self.max_cycle_allocations,
            "arena resized"
        );
        self.current_size = size;
        self.init()
    }

    /// Allocate the backing buffer for `current_size` if it is missing.
    fn init(&mut self) -> Result<(), ArenaError> {
        if let Some(storage) = &self.storage {
            if self.buffer.is_none() {
                let map = storage.map()?;
                self.current_size = map.len();
                self.buffer = Some(PagedRegion::from_mapping(map));
                self.initialized = true;
            }
            return Ok(());
        }

        if self.current_size == 0 {
            return Ok(());
        }

        if !self.overallocated
            && self.config.policy_allocation == AllocationPolicy::Overallocate
            && self.config.overallocation_limit > 0.0
        {
            let extra = ((self.current_size as f64) * self.config.overallocation_limit) as usize;
            self.current_size = self.current_size.saturating_add(extra);
            self.overallocated = true;
        }
        if self.config.max_size > 0 && self.current_size > self.config.max_size {
            self.current_size = self.config.max_size;
        }

        if self.buffer.is_none() {
            let len = self.current_size.saturating_add(SAFETY_OFFSET);
            let region = self.provider.allocate(len, MemoryKind::Host, true)?;
            self.tracker.mark_allocated(AllocationKind::Workspace, region.len());
            self.buffer = Some(PagedRegion::from_region(region));
            self.initialized = true;
            if self.debug {
                tracing::trace!(arena = %self.id, bytes = len, "buffer allocated");
            }
        }
        Ok(())
    }

    fn release_buffer(&mut self, extended: bool) {
        if let Some(buffer) = self.buffer.take() {
            if !buffer.is_mapped() {
                self.tracker
                    .mark_released(AllocationKind::Workspace, buffer.physical_len());
            }
            buffer.release(&*self.provider);
        }
        self.initialized = false;
        self.bump_offset = 0;
        self.epoch += 1;

        if extended {
            self.purge_external();
        }
        self.purge_pinned(extended);
    }

    // ── allocation ──────────────────────────────────────────────

    /// Allocate `len` bytes for elements of `dtype`.
    ///
    /// Requires an open or borrowed scope. The returned handle stays valid
    /// until the arena resets, wraps, resizes or is destroyed. When `zero`
    /// is set the bytes are zero-filled.
    pub fn alloc(
        &mut self,
        len: usize,
        dtype: DataType,
        kind: MemoryKind,
        zero: bool,
    ) -> Result<BlockHandle, ArenaError> {
        self.ensure_alive()?;
        if !self.state.is_active() {
            return Err(ArenaError::ScopeNotOpen { arena: self.id });
        }

        let elements = dtype.elements_in(len);
        let rounded = align_len(len).ok_or(ArenaError::CapacityExceeded {
            arena: self.id,
            requested: len,
            available: self.available(),
        })?;
        self.tracker.record(
            self.id,
            AllocationCategory::General,
            dtype,
            kind,
            elements,
            rounded,
        );

        if !self.enabled {
            self.disabled_allocations += 1;
            if self.disabled_allocations % 10 == 0 {
                tracing::warn!(
                    arena = %self.id,
                    allocations = self.disabled_allocations,
                    "arena is in pass-through mode"
                );
            }
            let request = Request::new(rounded, elements, dtype, kind, zero);
            return self.spill(request, Spill::PassThrough);
        }

        let trimming = self.config.is_ring()
            && ((self.initial_block_size > 0
                && rounded.saturating_add(self.cycle_allocations) > self.initial_block_size)
                || self.trim_step.is_some());
        if trimming
            && self.config.policy_spill == SpillPolicy::Reallocate
            && self.trim_step.is_none()
        {
            self.trim_step = Some(self.steps_count);
            tracing::debug!(arena = %self.id, step = %self.steps_count, "entering trimmed mode");
        }

        let request = Request::new(rounded, elements, dtype, kind, zero);
        if !trimming && self.debug_mode != DebugMode::SpillEverything {
            if let Some(handle) = self.bump(request) {
                return Ok(handle);
            }
            if self.config.is_ring() && self.current_size > 0 && rounded <= self.current_size {
                self.wrap();
                if let Some(handle) = self.bump(request) {
                    return Ok(handle);
                }
            }
        }

        match self.config.policy_spill {
            SpillPolicy::Fail => Err(ArenaError::CapacityExceeded {
                arena: self.id,
                requested: rounded,
                available: self.available(),
            }),
            SpillPolicy::External | SpillPolicy::Reallocate => {
                self.cycle_allocations = self.cycle_allocations.saturating_add(rounded);
                let spill = if trimming { Spill::Pinned } else { Spill::External };
                self.spill(request, spill)
            }
        }
    }

    fn bump(&mut self, req: Request) -> Option<BlockHandle> {
        let end = self.bump_offset.checked_add(req.rounded)?;
        if end > self.current_size {
            return None;
        }
        let buffer = self.buffer.as_mut()?;
        let offset = self.bump_offset;
        if req.zero {
            buffer.zero(offset, req.rounded);
        }
        self.bump_offset = end;
        self.cycle_allocations = self.cycle_allocations.saturating_add(req.rounded);

        if self.debug {
            tracing::trace!(
                arena = %self.id,
                bytes = req.rounded,
                elements = req.elements,
                offset,
                next = end,
                "bump allocation"
            );
        }
        Some(self.handle(req, offset, BlockLocation::Buffer))
    }

    fn wrap(&mut self) {
        tracing::debug!(arena = %self.id, offset = self.bump_offset, "ring buffer wrapped");
        self.reset();
        self.reset_planned = true;
    }

    fn spill(&mut self, req: Request, spill: Spill) -> Result<BlockHandle, ArenaError> {
        let region = self.provider.allocate(req.rounded, req.kind, req.zero)?;
        let slot = self.next_slot;
        self.next_slot += 1;
        self.tracker
            .mark_allocated(AllocationKind::General, region.len());

        let location = match spill {
            Spill::PassThrough => {
                self.record(AllocationCategory::External, req);
                self.external.insert(slot, region);
                BlockLocation::External { slot }
            }
            Spill::External => {
                self.record(AllocationCategory::Spilled, req);
                self.record(AllocationCategory::External, req);
                self.spilled_bytes += req.rounded;
                self.external.insert(slot, region);
                BlockLocation::External { slot }
            }
            Spill::Pinned => {
                self.record(AllocationCategory::Pinned, req);
                self.pinned_bytes += req.rounded;
                self.pinned.push_back(PinnedBlock {
                    slot,
                    step: self.steps_count,
                    region,
                });
                BlockLocation::Pinned { slot }
            }
        };

        if self.debug {
            tracing::trace!(
                arena = %self.id,
                step = %self.steps_count,
                bytes = req.rounded,
                ?location,
                "spilled allocation"
            );
        }
        Ok(self.handle(req, 0, location))
    }

    fn record(&self, category: AllocationCategory, req: Request) {
        self.tracker
            .record(self.id, category, req.dtype, req.kind, req.elements, req.rounded);
    }

    fn handle(&self, req: Request, offset: usize, location: BlockLocation) -> BlockHandle {
        BlockHandle {
            arena: self.id,
            generation: self.generation,
            epoch: self.epoch,
            offset,
            len: req.rounded,
            elements: req.elements,
            dtype: req.dtype,
            kind: req.kind,
            location,
        }
    }

    fn purge_external(&mut self) {
        if self.external.is_empty() {
            return;
        }
        let count = self.external.len();
        for (_, region) in self.external.drain(..) {
            self.tracker
                .mark_released(AllocationKind::General, region.len());
            self.provider.release(region);
        }
        self.spilled_bytes = 0;
        tracing::debug!(arena = %self.id, count, "external allocations purged");
    }

    /// Release pinned blocks from the front of the queue while they are
    /// aged, or all of them when `all` is set.
    fn purge_pinned(&mut self, all: bool) {
        let mut released = 0usize;
        while let Some(front) = self.pinned.front() {
            if !all && self.steps_count.since(front.step) < PIN_AGE_STEPS {
                break;
            }
            let Some(block) = self.pinned.pop_front() else {
                break;
            };
            self.pinned_bytes = self.pinned_bytes.saturating_sub(block.region.len());
            self.tracker
                .mark_released(AllocationKind::General, block.region.len());
            self.provider.release(block.region);
            released += 1;
        }
        if released > 0 {
            tracing::debug!(arena = %self.id, released, step = %self.steps_count, "pinned allocations purged");
        }
    }

    // ── administration ──────────────────────────────────────────

    /// Reset the bump offset to zero. Every buffer handle issued so far
    /// becomes stale.
    pub fn reset(&mut self) {
        self.bump_offset = 0;
        self.epoch += 1;
    }

    /// Switch pooling on or off. While off, every request is served by an
    /// external allocation. Closing a scope switches pooling back on.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            tracing::debug!(arena = %self.id, enabled, "pooling toggled");
        }
        self.enabled = enabled;
    }

    /// Whether pooling is on.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Emit per-allocation `trace!` events.
    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    /// Apply a manager-wide debug mode.
    pub fn set_debug_mode(&mut self, mode: DebugMode) {
        self.debug_mode = mode;
    }

    // ── handle resolution ───────────────────────────────────────

    /// Resolve `handle` to its bytes.
    pub fn bytes(&self, handle: &BlockHandle) -> Result<&[u8], ArenaError> {
        self.check_handle(handle)?;
        let stale = self.stale(handle);
        match handle.location {
            BlockLocation::Buffer => self
                .buffer
                .as_ref()
                .and_then(|b| b.slice(handle.offset, handle.len))
                .ok_or(stale),
            BlockLocation::External { slot } => self
                .external
                .get(&slot)
                .and_then(|r| r.as_bytes().get(..handle.len))
                .ok_or(stale),
            BlockLocation::Pinned { slot } => self
                .pinned
                .iter()
                .find(|b| b.slot == slot)
                .and_then(|b| b.region.as_bytes().get(..handle.len))
                .ok_or(stale),
        }
    }

    /// Resolve `handle` to its bytes, mutably.
    pub fn bytes_mut(&mut self, handle: &BlockHandle) -> Result<&mut [u8], ArenaError> {
        self.check_handle(handle)?;
        let stale = self.stale(handle);
        match handle.location {
            BlockLocation::Buffer => self
                .buffer
                .as_mut()
                .and_then(|b| b.slice_mut(handle.offset, handle.len))
                .ok_or(stale),
            BlockLocation::External { slot } => self
                .external
                .get_mut(&slot)
                .and_then(|r| r.as_bytes_mut().get_mut(..handle.len))
                .ok_or(stale),
            BlockLocation::Pinned { slot } => self
                .pinned
                .iter_mut()
                .find(|b| b.slot == slot)
                .and_then(|b| b.region.as_bytes_mut().get_mut(..handle.len))
                .ok_or(stale),
        }
    }

    fn check_handle(&self, handle: &BlockHandle) -> Result<(), ArenaError> {
        if handle.arena != self.id {
            return Err(ArenaError::UnknownArena {
                arena: handle.arena,
            });
        }
        self.ensure_alive()?;
        if handle.location == BlockLocation::Buffer && handle.epoch != self.epoch {
            return Err(self.stale(handle));
        }
        Ok(())
    }

    fn stale(&self, handle: &BlockHandle) -> ArenaError {
        ArenaError::StaleHandle {
            arena: self.id,
            handle_epoch: handle.epoch,
            current_epoch: self.epoch,
        }
    }

    fn ensure_alive(&self) -> Result<(), ArenaError> {
        if self.state.is_destroyed() {
            Err(ArenaError::Destroyed { arena: self.id })
        } else {
            Ok(())
        }
    }

    fn check_thread(&self) -> Result<(), ArenaError> {
        if thread::current().id() == self.owner {
            Ok(())
        } else {
            Err(ArenaError::ForeignThread { arena: self.id })
        }
    }

    fn available(&self) -> usize {
        self.current_size.saturating_sub(self.bump_offset)
    }

    // ── accessors ───────────────────────────────────────────────

    /// Unique identifier.
    pub fn id(&self) -> ArenaId {
        self.id
    }

    /// Registered name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Effective configuration. For memory-mapped arenas `initial_size`
    /// reflects the backing file length.
    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    /// Usable capacity of the buffer in bytes.
    pub fn current_size(&self) -> usize {
        self.current_size
    }

    /// Block size ring padding aligns to. Zero until the first learning pass.
    pub fn initial_block_size(&self) -> usize {
        self.initial_block_size
    }

    /// Next free byte offset.
    pub fn bump_offset(&self) -> usize {
        self.bump_offset
    }

    /// Bytes requested in the open cycle.
    pub fn cycle_allocations(&self) -> usize {
        self.cycle_allocations
    }

    /// Bytes requested in the previous cycle.
    pub fn last_cycle_allocations(&self) -> usize {
        self.last_cycle_allocations
    }

    /// Largest cycle observed (inflated by ring growth after learning).
    pub fn max_cycle_allocations(&self) -> usize {
        self.max_cycle_allocations
    }

    /// Closed cycles.
    pub fn cycles_count(&self) -> u64 {
        self.cycles_count
    }

    /// Ring-buffer steps.
    pub fn steps_count(&self) -> StepId {
        self.steps_count
    }

    /// Current scope generation.
    pub fn generation(&self) -> GenerationId {
        self.generation
    }

    /// Current offset epoch.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Outstanding external allocations.
    pub fn external_count(&self) -> usize {
        self.external.len()
    }

    /// Outstanding pinned allocations.
    pub fn pinned_count(&self) -> usize {
        self.pinned.len()
    }

    /// Steps at which the outstanding pinned allocations were made, oldest first.
    pub fn pinned_steps(&self) -> Vec<StepId> {
        self.pinned.iter().map(|b| b.step).collect()
    }

    /// Whether trimmed mode is active.
    pub fn is_trimming(&self) -> bool {
        self.trim_step.is_some()
    }

    /// Whether a cycle is open.
    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    /// Whether the arena is lent out.
    pub fn is_borrowed(&self) -> bool {
        self.state.is_borrowed()
    }

    /// Whether allocations are allowed right now.
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Whether the arena has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.state.is_destroyed()
    }

    /// Nested re-entries currently stacked.
    pub fn reentry_depth(&self) -> usize {
        self.state.reentry_depth()
    }

    /// Arena displaced by the open cycle's top-level entry.
    pub fn previous(&self) -> Option<ArenaId> {
        self.state.previous()
    }

    /// Backing file of a memory-mapped arena.
    pub fn backing_file(&self) -> Option<&BackingFile> {
        self.storage.as_ref()
    }

    /// The tracker this arena reports to.
    pub fn tracker(&self) -> &SharedTracker {
        &self.tracker
    }

    /// Snapshot of the diagnostics counters.
    pub fn stats(&self) -> ArenaStats {
        ArenaStats {
            id: self.id,
            name: self.name.clone(),
            current_size: self.current_size,
            bump_offset: self.bump_offset,
            cycle_allocations: self.cycle_allocations,
            last_cycle_allocations: self.last_cycle_allocations,
            max_cycle_allocations: self.max_cycle_allocations,
            cycles_count: self.cycles_count,
            steps_count: self.steps_count,
            generation: self.generation,
            external_count: self.external.len(),
            spilled_bytes: self.spilled_bytes,
            pinned_count: self.pinned.len(),
            pinned_bytes: self.pinned_bytes,
            is_open: self.state.is_open(),
            is_borrowed: self.state.is_borrowed(),
            trimming: self.trim_step.is_some(),
        }
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        if !self.state.is_destroyed() {
            self.release_buffer(true);
            self.tracker.deregister(self.id);
        }
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("current_size", &self.current_size)
            .field("bump_offset", &self.bump_offset)
            .field("generation", &self.generation)
            .field("state", &self.state.phase())
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Copy)]
struct Request {
    rounded: usize,
    elements: usize,
    dtype: DataType,
    kind: MemoryKind,
    zero: bool,
}

impl Request {
    fn new(rounded: usize, elements: usize, dtype: DataType, kind: MemoryKind, zero: bool) -> Self {
        Self {
            rounded,
            elements,
            dtype,
            kind,
            zero,
        }
    }
}

#[derive(Clone, Copy)]
enum Spill {
    PassThrough,
    External,
    Pinned,
}
