//! File-backed storage for memory-mapped arenas.
//!
//! A [`BackingFile`] is prepared once at arena construction. Either the
//! caller names a file, which is reused (and its length adopted as the
//! arena size when it is already large enough), or an anonymous temporary
//! file is created and zero-filled to the configured initial size. The
//! temporary file is deleted when the arena is dropped.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use memmap2::MmapMut;
use tempfile::NamedTempFile;

use crate::config::ArenaConfig;
use crate::error::ArenaError;
use crate::raw;

/// The file behind a memory-mapped arena.
#[derive(Debug)]
pub struct BackingFile {
    file: File,
    path: PathBuf,
    len: usize,
    // Keeps the temp file alive; removed from disk on drop.
    _temp: Option<NamedTempFile>,
}

impl BackingFile {
    /// Prepare the backing file for `config`.
    ///
    /// Returns `Storage` on I/O failure and `InvalidConfig` when an
    /// explicit file is empty and no initial size was given.
    pub fn prepare(config: &ArenaConfig) -> Result<Self, ArenaError> {
        match &config.temp_file_path {
            Some(path) => Self::open_explicit(path, config.initial_size),
            None if config.initial_size > 0 => Self::create_temp(config.initial_size),
            None => Err(ArenaError::InvalidConfig {
                reason: "memory-mapped arenas need initial_size > 0 or an explicit file"
                    .to_string(),
            }),
        }
    }

    fn open_explicit(path: &Path, initial_size: usize) -> Result<Self, ArenaError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| storage_error(Some(path), &e))?;
        let existing = file
            .metadata()
            .map_err(|e| storage_error(Some(path), &e))?
            .len() as usize;

        let len = if existing == 0 || existing < initial_size {
            if initial_size == 0 {
                return Err(ArenaError::InvalidConfig {
                    reason: format!("backing file {} is empty", path.display()),
                });
            }
            fill_zeros(&file, initial_size).map_err(|e| storage_error(Some(path), &e))?;
            initial_size
        } else {
            existing
        };

        tracing::debug!(path = %path.display(), len, "backing file ready");
        Ok(Self {
            file,
            path: path.to_path_buf(),
            len,
            _temp: None,
        })
    }

    fn create_temp(len: usize) -> Result<Self, ArenaError> {
        let temp = tempfile::Builder::new()
            .prefix("loam-arena-")
            .suffix(".mmap")
            .tempfile()
            .map_err(|e| storage_error(None, &e))?;
        let path = temp.path().to_path_buf();
        let file = temp.reopen().map_err(|e| storage_error(Some(&path), &e))?;
        fill_zeros(&file, len).map_err(|e| storage_error(Some(&path), &e))?;

        tracing::debug!(path = %path.display(), len, "temporary backing file created");
        Ok(Self {
            file,
            path,
            len,
            _temp: Some(temp),
        })
    }

    /// Path of the file on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Length in bytes, which is also the arena capacity.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the file is zero-length.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the file is deleted when dropped.
    pub fn is_temporary(&self) -> bool {
        self._temp.is_some()
    }

    pub(crate) fn map(&self) -> Result<MmapMut, ArenaError> {
        raw::map_file(&self.file, self.len).map_err(|e| storage_error(Some(&self.path), &e))
    }
}

/// Extend `file` to `len` bytes; the new tail reads as zeros.
fn fill_zeros(file: &File, len: usize) -> io::Result<()> {
    file.set_len(len as u64)?;
    file.sync_all()
}

fn storage_error(path: Option<&Path>, err: &io::Error) -> ArenaError {
    ArenaError::Storage {
        path: path.map(Path::to_path_buf),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LearningPolicy, LocationPolicy};

    fn mmap_config(initial: usize) -> ArenaConfig {
        ArenaConfig::new(initial)
            .with_location(LocationPolicy::Mmap)
            .with_learning(LearningPolicy::None)
    }

    #[test]
    fn temp_file_is_zero_filled_to_initial_size() {
        let backing = BackingFile::prepare(&mmap_config(8192)).unwrap();
        assert!(backing.is_temporary());
        assert_eq!(backing.len(), 8192);
        assert_eq!(std::fs::metadata(backing.path()).unwrap().len(), 8192);
    }

    #[test]
    fn temp_file_removed_on_drop() {
        let backing = BackingFile::prepare(&mmap_config(1024)).unwrap();
        let path = backing.path().to_path_buf();
        drop(backing);
        assert!(!path.exists());
    }

    #[test]
    fn explicit_short_file_is_extended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arena.bin");
        std::fs::write(&path, [1u8; 16]).unwrap();

        let backing = BackingFile::prepare(&mmap_config(4096).with_temp_file(&path)).unwrap();
        assert!(!backing.is_temporary());
        assert_eq!(backing.len(), 4096);
    }

    #[test]
    fn explicit_large_file_length_is_adopted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arena.bin");
        std::fs::write(&path, vec![0u8; 10_000]).unwrap();

        let backing = BackingFile::prepare(&mmap_config(1024).with_temp_file(&path)).unwrap();
        assert_eq!(backing.len(), 10_000);
        drop(backing);
        assert!(path.exists(), "explicit files are never deleted");
    }

    #[test]
    fn explicit_empty_file_without_size_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.bin");
        let err = BackingFile::prepare(&mmap_config(0).with_temp_file(&path)).unwrap_err();
        assert!(matches!(err, ArenaError::InvalidConfig { .. }));
    }

    #[test]
    fn mapping_sees_file_contents() {
        let backing = BackingFile::prepare(&mmap_config(2048)).unwrap();
        let map = backing.map().unwrap();
        assert_eq!(map.len(), 2048);
    }
}
