//! Core types and traits for the Loam workspace arena allocator.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the vocabulary shared by every other crate in the workspace:
//! identifiers, logical element types, storage kinds, and the
//! [`MemoryProvider`] boundary through which arenas obtain real memory.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod dtype;
pub mod error;
pub mod id;
pub mod memory;

pub use dtype::{DataType, MemoryKind};
pub use error::MemoryError;
pub use id::{ArenaId, GenerationId, RegionId, StepId};
pub use memory::{HostMemory, MemoryProvider, RawRegion, SharedMemoryProvider};
