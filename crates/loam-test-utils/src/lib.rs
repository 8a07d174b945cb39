//! Test utilities and mock memory providers for Loam development.
//!
//! Provides [`MemoryProvider`] implementations that record what arenas
//! ask of them ([`CountingMemory`]) or refuse on cue ([`FailingMemory`]),
//! plus config [`fixtures`] shared by integration tests.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use loam_core::{HostMemory, MemoryError, MemoryKind, MemoryProvider, RawRegion};

/// One `allocate` call as seen by [`CountingMemory`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocRecord {
    pub len: usize,
    pub kind: MemoryKind,
    pub zero: bool,
}

/// Host-backed provider that logs every request.
///
/// Wrap it in an `Arc`, hand a clone to the arena, and inspect the log
/// afterwards with [`allocations`](CountingMemory::allocations).
pub struct CountingMemory {
    inner: HostMemory,
    log: Mutex<Vec<AllocRecord>>,
    releases: AtomicUsize,
}

impl CountingMemory {
    pub fn new() -> Self {
        Self {
            inner: HostMemory::new(),
            log: Mutex::new(Vec::new()),
            releases: AtomicUsize::new(0),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Every successful `allocate` call, oldest first.
    pub fn allocations(&self) -> Vec<AllocRecord> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of successful `allocate` calls.
    pub fn allocation_count(&self) -> usize {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Number of `release` calls.
    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::Relaxed)
    }

    /// Allocations of the given kind.
    pub fn count_kind(&self, kind: MemoryKind) -> usize {
        self.allocations().iter().filter(|r| r.kind == kind).count()
    }
}

impl Default for CountingMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProvider for CountingMemory {
    fn allocate(&self, len: usize, kind: MemoryKind, zero: bool) -> Result<RawRegion, MemoryError> {
        let region = self.inner.allocate(len, kind, zero)?;
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(AllocRecord { len, kind, zero });
        Ok(region)
    }

    fn release(&self, region: RawRegion) {
        self.releases.fetch_add(1, Ordering::Relaxed);
        self.inner.release(region);
    }

    fn allocated_bytes(&self) -> usize {
        self.inner.allocated_bytes()
    }

    fn live_regions(&self) -> usize {
        self.inner.live_regions()
    }
}

/// Succeeds a fixed number of times, then refuses every request.
///
/// Useful for driving the error paths of buffer creation, resize and
/// spilling.
pub struct FailingMemory {
    inner: HostMemory,
    succeed_count: usize,
    call_count: AtomicUsize,
}

impl FailingMemory {
    /// A provider that serves `succeed_count` requests then fails.
    pub fn new(succeed_count: usize) -> Self {
        Self {
            inner: HostMemory::new(),
            succeed_count,
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn shared(succeed_count: usize) -> Arc<Self> {
        Arc::new(Self::new(succeed_count))
    }

    /// How many times `allocate` has been called.
    pub fn calls(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Reset the call counter.
    pub fn reset(&self) {
        self.call_count.store(0, Ordering::Relaxed);
    }
}

impl MemoryProvider for FailingMemory {
    fn allocate(&self, len: usize, kind: MemoryKind, zero: bool) -> Result<RawRegion, MemoryError> {
        let n = self.call_count.fetch_add(1, Ordering::Relaxed);
        if n >= self.succeed_count {
            return Err(MemoryError::Refused { requested: len });
        }
        self.inner.allocate(len, kind, zero)
    }

    fn release(&self, region: RawRegion) {
        self.inner.release(region);
    }

    fn allocated_bytes(&self) -> usize {
        self.inner.allocated_bytes()
    }

    fn live_regions(&self) -> usize {
        self.inner.live_regions()
    }
}
