//! Low-level primitives for arena memory operations.
//!
//! The only `unsafe` in the crate: mapping a backing file into memory.
//! Every other path works on owned byte slices.

#![allow(unsafe_code)]

use std::fs::File;
use std::io;

use memmap2::{MmapMut, MmapOptions};

/// Map the first `len` bytes of `file` read-write.
///
/// `len` must be non-zero and must not exceed the file length.
pub(crate) fn map_file(file: &File, len: usize) -> io::Result<MmapMut> {
    // SAFETY: the file is owned by the arena's `BackingFile` for as long
    // as the mapping exists and is never truncated while mapped. Arenas
    // are single-owner, so no other handle in this process writes through
    // the file while the map is live.
    unsafe { MmapOptions::new().len(len).map_mut(file) }
}
