//! In-process byte store

use super::{Blob, ByteStore};
use crate::error::CacheResult;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Byte store that keeps blobs in memory, keyed by path.
///
/// Nothing touches disk, so nothing needs encrypting. Useful for hosts that
/// only want the format handling, and for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<PathBuf, Vec<u8>>>,
    writes: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `write` calls that stored or deleted something
    pub fn write_count(&self) -> usize {
        *self.writes.lock()
    }

    /// Place raw bytes at `path`, bypassing the write counter
    pub fn insert_raw(&self, path: impl Into<PathBuf>, bytes: Vec<u8>) {
        self.blobs.lock().insert(path.into(), bytes);
    }
}

impl ByteStore for MemoryStore {
    fn read(&self, path: &Path) -> CacheResult<Blob> {
        Ok(self.blobs.lock().get(path).cloned().into())
    }

    fn write(&self, path: &Path, blob: &Blob) -> CacheResult<()> {
        let mut blobs = self.blobs.lock();
        let changed = match blob {
            Blob::Present(bytes) => {
                blobs.insert(path.to_path_buf(), bytes.clone());
                true
            }
            Blob::Absent => blobs.remove(path).is_some(),
        };
        if changed {
            *self.writes.lock() += 1;
        }
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.blobs.lock().contains_key(path)
    }
}
