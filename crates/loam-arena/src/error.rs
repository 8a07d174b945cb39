//! Arena-specific error types.

use std::error::Error;
use std::fmt;
use std::path::PathBuf;

use loam_core::{ArenaId, MemoryError};

/// Errors that can occur during arena operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArenaError {
    /// The request does not fit and the spill policy is `Fail`.
    CapacityExceeded {
        /// The arena that refused the request.
        arena: ArenaId,
        /// Number of bytes requested (after alignment).
        requested: usize,
        /// Bytes left between the bump offset and the end of the buffer.
        available: usize,
    },
    /// The configuration is self-contradictory.
    InvalidConfig {
        /// Human-readable description.
        reason: String,
    },
    /// The arena is already lent out through a borrow.
    AlreadyBorrowed {
        /// The borrowed arena.
        arena: ArenaId,
    },
    /// The operation needs an open (or borrowed) scope.
    ScopeNotOpen {
        /// The closed arena.
        arena: ArenaId,
    },
    /// The arena cannot be destroyed while a scope is open or borrowed.
    ScopeStillOpen {
        /// The arena still in use.
        arena: ArenaId,
    },
    /// The arena has been destroyed.
    Destroyed {
        /// The destroyed arena.
        arena: ArenaId,
    },
    /// No arena with this id is registered with the manager.
    UnknownArena {
        /// The unrecognised arena.
        arena: ArenaId,
    },
    /// The arena is owned by another thread.
    ForeignThread {
        /// The arena that was touched from the wrong thread.
        arena: ArenaId,
    },
    /// A handle whose memory has since been reset, wrapped or released.
    StaleHandle {
        /// The arena the handle was issued by.
        arena: ArenaId,
        /// The offset epoch encoded in the handle.
        handle_epoch: u64,
        /// The arena's current offset epoch.
        current_epoch: u64,
    },
    /// Preparing or mapping the backing file failed.
    Storage {
        /// The file involved, when one was known.
        path: Option<PathBuf>,
        /// Human-readable description of the I/O failure.
        reason: String,
    },
    /// The memory provider refused a request.
    Memory(MemoryError),
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapacityExceeded {
                arena,
                requested,
                available,
            } => {
                write!(
                    f,
                    "arena {arena} capacity exceeded: requested {requested} bytes, {available} bytes available"
                )
            }
            Self::InvalidConfig { reason } => write!(f, "invalid arena config: {reason}"),
            Self::AlreadyBorrowed { arena } => {
                write!(f, "arena {arena} is already borrowed")
            }
            Self::ScopeNotOpen { arena } => write!(f, "arena {arena} has no open scope"),
            Self::ScopeStillOpen { arena } => {
                write!(f, "arena {arena} still has an open or borrowed scope")
            }
            Self::Destroyed { arena } => write!(f, "arena {arena} has been destroyed"),
            Self::UnknownArena { arena } => write!(f, "unknown arena: {arena}"),
            Self::ForeignThread { arena } => {
                write!(f, "arena {arena} is owned by another thread")
            }
            Self::StaleHandle {
                arena,
                handle_epoch,
                current_epoch,
            } => {
                write!(
                    f,
                    "stale handle for arena {arena}: epoch {handle_epoch}, current {current_epoch}"
                )
            }
            Self::Storage { path, reason } => match path {
                Some(path) => write!(f, "backing file {}: {reason}", path.display()),
                None => write!(f, "backing file: {reason}"),
            },
            Self::Memory(err) => write!(f, "memory provider: {err}"),
        }
    }
}

impl Error for ArenaError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Memory(err) => Some(err),
            _ => None,
        }
    }
}

impl From<MemoryError> for ArenaError {
    fn from(err: MemoryError) -> Self {
        Self::Memory(err)
    }
}
