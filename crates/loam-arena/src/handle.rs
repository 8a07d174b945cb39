//! Block handles and location descriptors.
//!
//! A [`BlockHandle`] is what callers get back from an allocation instead of
//! a raw address. It names the arena, the offset epoch it was issued in and
//! where the bytes live, so the arena can reject it in O(1) once the
//! offsets it refers to have been recycled.

use std::fmt;

use loam_core::{ArenaId, DataType, GenerationId, MemoryKind};

/// Opaque reference to one allocation.
///
/// Valid until the issuing arena resets, wraps, resizes or is destroyed.
/// Resolve it with [`Arena::bytes`](crate::Arena::bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use]
pub struct BlockHandle {
    pub(crate) arena: ArenaId,
    pub(crate) generation: GenerationId,
    pub(crate) epoch: u64,
    pub(crate) offset: usize,
    pub(crate) len: usize,
    pub(crate) elements: usize,
    pub(crate) dtype: DataType,
    pub(crate) kind: MemoryKind,
    pub(crate) location: BlockLocation,
}

impl BlockHandle {
    /// The arena that issued this handle.
    pub fn arena(&self) -> ArenaId {
        self.arena
    }

    /// Scope generation the allocation was made in.
    pub fn generation(&self) -> GenerationId {
        self.generation
    }

    /// Offset epoch the allocation was made in.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Byte offset within the arena buffer (zero for external blocks).
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Length in bytes, rounded up to the alignment unit.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether this is a zero-length allocation.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of whole elements of [`dtype`](Self::dtype) requested.
    pub fn elements(&self) -> usize {
        self.elements
    }

    /// Logical element type.
    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    /// Storage kind.
    pub fn kind(&self) -> MemoryKind {
        self.kind
    }

    /// Where the bytes live.
    pub fn location(&self) -> BlockLocation {
        self.location
    }

    /// Whether the block was carved from the arena buffer.
    pub fn is_spilled(&self) -> bool {
        !matches!(self.location, BlockLocation::Buffer)
    }
}

impl fmt::Display for BlockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BlockHandle(arena={}, gen={}, epoch={}, off={}, len={}, {:?})",
            self.arena, self.generation, self.epoch, self.offset, self.len, self.location
        )
    }
}

/// Describes which store a [`BlockHandle`] points into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockLocation {
    /// Carved from the bump buffer.
    Buffer,
    /// A spilled allocation released at the next purge.
    External {
        /// Slot key in the arena's external list.
        slot: u64,
    },
    /// A spilled allocation kept alive until it has aged two steps.
    Pinned {
        /// Slot key in the arena's pinned queue.
        slot: u64,
    },
}
