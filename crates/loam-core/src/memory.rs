//! The memory-primitive boundary.
//!
//! Arenas never talk to the system allocator directly. Every byte they
//! own, whether the backing buffer or a spilled overflow block, is obtained
//! from a [`MemoryProvider`] and handed back to it on release.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::dtype::MemoryKind;
use crate::error::MemoryError;
use crate::id::RegionId;

/// A contiguous region obtained from a [`MemoryProvider`].
///
/// The region owns its bytes. Arenas only ever carve offsets out of it;
/// they never resize or move it.
pub struct RawRegion {
    id: RegionId,
    kind: MemoryKind,
    bytes: Box<[u8]>,
}

impl RawRegion {
    /// Wrap an owned byte buffer as a region.
    ///
    /// Intended for [`MemoryProvider`] implementations.
    pub fn new(id: RegionId, kind: MemoryKind, bytes: Box<[u8]>) -> Self {
        Self { id, kind, bytes }
    }

    /// Provider-assigned identifier.
    pub fn id(&self) -> RegionId {
        self.id
    }

    /// Storage kind the region was requested for.
    pub fn kind(&self) -> MemoryKind {
        self.kind
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the region is zero-length.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Shared view of the region's bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Mutable view of the region's bytes.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl fmt::Debug for RawRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawRegion")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Trait abstracting the native memory primitive.
///
/// Implementations must be shareable across threads: one provider
/// typically serves every arena in the process.
pub trait MemoryProvider: Send + Sync {
    /// Allocate `len` bytes of the given kind.
    ///
    /// When `zero` is set the region must be zero-filled. Failure is
    /// reported, never retried.
    fn allocate(&self, len: usize, kind: MemoryKind, zero: bool) -> Result<RawRegion, MemoryError>;

    /// Return a region to the provider.
    fn release(&self, region: RawRegion);

    /// Total bytes currently held by live regions.
    fn allocated_bytes(&self) -> usize;

    /// Number of regions handed out and not yet released.
    fn live_regions(&self) -> usize;
}

/// Shared handle to a memory provider.
pub type SharedMemoryProvider = Arc<dyn MemoryProvider>;

/// Default provider backed by the global allocator.
///
/// Regions are always zero-filled (the `zero` flag is satisfied
/// trivially). An optional byte limit turns the provider into a bounded
/// pool; requests beyond it fail with [`MemoryError::OutOfMemory`].
pub struct HostMemory {
    limit: Option<usize>,
    next_id: AtomicU64,
    allocated: AtomicUsize,
    live: AtomicUsize,
}

impl HostMemory {
    /// Unbounded provider.
    pub fn new() -> Self {
        Self {
            limit: None,
            next_id: AtomicU64::new(1),
            allocated: AtomicUsize::new(0),
            live: AtomicUsize::new(0),
        }
    }

    /// Provider that refuses to hold more than `limit` bytes at once.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::new()
        }
    }

    /// Wrap this provider for sharing.
    pub fn into_shared(self) -> SharedMemoryProvider {
        Arc::new(self)
    }

    /// The configured byte limit, if any.
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    fn reserve(&self, len: usize) -> Result<(), MemoryError> {
        let limit = self.limit;
        self.allocated
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                let next = current.checked_add(len)?;
                match limit {
                    Some(limit) if next > limit => None,
                    _ => Some(next),
                }
            })
            .map(|_| ())
            .map_err(|current| MemoryError::OutOfMemory {
                requested: len,
                available: limit.map_or(0, |l| l.saturating_sub(current)),
            })
    }
}

impl Default for HostMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProvider for HostMemory {
    fn allocate(&self, len: usize, kind: MemoryKind, _zero: bool) -> Result<RawRegion, MemoryError> {
        self.reserve(len)?;

        let mut bytes = Vec::new();
        if bytes.try_reserve_exact(len).is_err() {
            self.allocated.fetch_sub(len, Ordering::AcqRel);
            tracing::warn!(requested = len, %kind, "host allocation refused");
            return Err(MemoryError::Refused { requested: len });
        }
        bytes.resize(len, 0);

        let id = RegionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.live.fetch_add(1, Ordering::Relaxed);
        Ok(RawRegion::new(id, kind, bytes.into_boxed_slice()))
    }

    fn release(&self, region: RawRegion) {
        self.allocated.fetch_sub(region.len(), Ordering::AcqRel);
        self.live.fetch_sub(1, Ordering::Relaxed);
        drop(region);
    }

    fn allocated_bytes(&self) -> usize {
        self.allocated.load(Ordering::Acquire)
    }

    fn live_regions(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }
}
