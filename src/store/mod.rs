//! Secure byte store
//!
//! Reads and writes whole cache files as opaque blobs. Missing files are a
//! normal condition and surface as [`Blob::Absent`]; writing `Blob::Absent`
//! deletes the file.
//!
//! # Implementations
//!
//! | Store | Backing | Encryption |
//! |-------|---------|------------|
//! | [`ProtectedFileStore`] | files, atomic rename | XChaCha20-Poly1305, principal-scoped |
//! | [`MemoryStore`] | process memory | none |

pub mod blob;
pub mod file;
pub mod memory;
pub mod protect;

pub use blob::Blob;
pub use file::ProtectedFileStore;
pub use memory::MemoryStore;
pub use protect::{DataProtector, Principal};

use crate::error::CacheResult;
use std::path::Path;

/// Whole-file blob storage used by the persistence bridge
pub trait ByteStore: Send + Sync {
    /// Read the content at `path`.
    ///
    /// Returns `Blob::Absent` when nothing is stored there. Content that
    /// cannot be opened is a `CorruptCache` error, never `Absent`.
    fn read(&self, path: &Path) -> CacheResult<Blob>;

    /// Replace the content at `path`, or delete it when `blob` is absent.
    ///
    /// Deleting something that does not exist is a no-op.
    fn write(&self, path: &Path, blob: &Blob) -> CacheResult<()>;

    /// Whether anything is stored at `path`, without opening it
    fn exists(&self, path: &Path) -> bool;
}
