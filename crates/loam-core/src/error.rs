//! Errors raised at the memory-provider boundary.

use std::error::Error;
use std::fmt;

/// The memory primitive refused or could not satisfy a request.
///
/// Arenas never retry on these; they are surfaced to the caller
/// unmodified, wrapped in the arena's own error type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemoryError {
    /// The provider's byte budget cannot cover the request.
    OutOfMemory {
        /// Number of bytes requested.
        requested: usize,
        /// Number of bytes still available to the provider.
        available: usize,
    },
    /// The system allocator refused the request.
    Refused {
        /// Number of bytes requested.
        requested: usize,
    },
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory {
                requested,
                available,
            } => {
                write!(
                    f,
                    "out of memory: requested {requested} bytes, {available} bytes available"
                )
            }
            Self::Refused { requested } => {
                write!(f, "allocation of {requested} bytes refused by the system")
            }
        }
    }
}

impl Error for MemoryError {}
