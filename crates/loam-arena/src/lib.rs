//! Scoped workspace arenas for tensor-style temporary memory.
//!
//! An [`Arena`] is a bump allocator over one contiguous buffer whose
//! lifetime is split into *cycles*: every allocation made between an
//! enter and the matching close is freed in bulk when the cycle closes.
//! Arenas learn the buffer size their workload needs, spill to external
//! allocations when they run out, and can run as a ring buffer that
//! wraps instead of resetting.
//!
//! # Architecture
//!
//! ```text
//! ArenaManager (explicit context, replaces per-thread globals)
//! ├── current: Option<ArenaId>   (active-arena register)
//! ├── SharedMemoryProvider       (loam-core; host memory by default)
//! ├── SharedTracker              (per-arena usage accounting)
//! └── Arena[]
//!     ├── ScopeState             (LIFO frames: cycle / nested / borrow)
//!     ├── PagedRegion            (buffer + safety slack, RAM or mmap)
//!     ├── external spills        (Fail / External / Reallocate)
//!     └── pinned spills          (ring-buffer trim, aged out by step)
//! ```
//!
//! # Handles
//!
//! Allocations return a [`BlockHandle`], a plain value naming the arena,
//! generation and epoch it was issued under. Resolving a handle after the
//! buffer has been reset, wrapped or reallocated fails with
//! [`ArenaError::StaleHandle`] instead of aliasing newer data.
//!
//! # Safety
//!
//! The only `unsafe` code lives in the private `raw` module, which maps
//! backing files for [`LocationPolicy::Mmap`].

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod arena;
pub mod cache;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod handle;
pub mod manager;
pub mod paged;
mod raw;
pub mod state;
pub mod storage;
pub mod tracker;

// Public re-exports for the primary API surface.
pub use arena::{align_len, Arena, ALIGNMENT_BASE, PIN_AGE_STEPS};
pub use cache::GenerationCache;
pub use config::{
    AllocationPolicy, ArenaConfig, DebugMode, LearningPolicy, LocationPolicy, ResetPolicy,
    SpillPolicy,
};
pub use diagnostics::ArenaStats;
pub use error::ArenaError;
pub use handle::{BlockHandle, BlockLocation};
pub use manager::{ArenaManager, ScopeGuard, ScopeOut};
pub use paged::SAFETY_OFFSET;
pub use state::{ScopeAction, ScopePhase};
pub use storage::BackingFile;
pub use tracker::{AllocationCategory, AllocationKind, AllocationTracker, SharedTracker, Usage};
