//! Loam: scoped workspace arenas for tensor-style temporary memory.
//!
//! This is the top-level facade crate that re-exports the public API from
//! the Loam sub-crates. For most users, adding `loam` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use loam::prelude::*;
//!
//! let mut manager = ArenaManager::new();
//! let ws = manager
//!     .create("forward", ArenaConfig::new(4096).with_allocation(AllocationPolicy::Strict))
//!     .unwrap();
//!
//! for _ in 0..3 {
//!     let mut scope = manager.enter(ws).unwrap();
//!     let block = scope
//!         .alloc(1024, DataType::Float, MemoryKind::Host, true)
//!         .unwrap()
//!         .expect("an arena is active");
//!     scope.bytes_mut(&block).unwrap().fill(7);
//!     assert_eq!(block.elements(), 256);
//! } // scope closed, offsets reset
//!
//! let arena = manager.arena(ws).unwrap();
//! assert_eq!(arena.cycles_count(), 3);
//! assert_eq!(arena.bump_offset(), 0);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`arena`] | `loam-arena` | Arenas, manager, config, handles, tracker |
//! | [`types`] | `loam-core` | IDs, data types, memory providers |
//! | [`logging`] | this crate | `tracing-subscriber` initialisation |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod logging;

/// Arenas, the arena manager and allocation bookkeeping (`loam-arena`).
///
/// Most users only need [`arena::ArenaManager`] and [`arena::ArenaConfig`]
/// from this module. Both are also available in the [`prelude`].
pub use loam_arena as arena;

/// Identifiers, data types and the memory-provider boundary (`loam-core`).
///
/// Implement [`types::MemoryProvider`] to back arenas with something other
/// than [`types::HostMemory`].
pub use loam_core as types;

/// Common imports for typical Loam usage.
///
/// ```rust
/// use loam::prelude::*;
/// ```
pub mod prelude {
    // Arenas
    pub use loam_arena::{Arena, ArenaManager, ArenaStats, BlockHandle, ScopeGuard};

    // Configuration
    pub use loam_arena::{
        AllocationPolicy, ArenaConfig, DebugMode, LearningPolicy, LocationPolicy, ResetPolicy,
        SpillPolicy,
    };

    // Errors
    pub use loam_arena::ArenaError;
    pub use loam_core::MemoryError;

    // Core types
    pub use loam_core::{ArenaId, DataType, MemoryKind};
}
