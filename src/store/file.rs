//! Encrypted file-backed byte store

use super::{Blob, ByteStore, DataProtector};
use crate::error::{CacheError, CacheResult};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Byte store that seals every blob with a [`DataProtector`] and replaces
/// files atomically (write temp, fsync, rename)
#[derive(Debug, Clone)]
pub struct ProtectedFileStore {
    protector: DataProtector,
}

impl ProtectedFileStore {
    pub fn new(protector: DataProtector) -> Self {
        Self { protector }
    }

    pub fn protector(&self) -> &DataProtector {
        &self.protector
    }

    fn write_atomic(&self, path: &Path, sealed: &[u8]) -> CacheResult<()> {
        if let Some(parent) = path.parent() {
            create_private_dir(parent)?;
        }

        let temp_path = temp_path(path);
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&temp_path).map_err(|e| {
            CacheError::io(format!("creating temporary file {}", temp_path.display()), e)
        })?;
        file.write_all(sealed)
            .and_then(|()| file.sync_all())
            .map_err(|e| {
                CacheError::io(format!("writing temporary file {}", temp_path.display()), e)
            })?;
        drop(file);

        fs::rename(&temp_path, path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            CacheError::io(
                format!("renaming {} to {}", temp_path.display(), path.display()),
                e,
            )
        })
    }
}

impl ByteStore for ProtectedFileStore {
    fn read(&self, path: &Path) -> CacheResult<Blob> {
        let sealed = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Cache file {} not present", path.display());
                return Ok(Blob::Absent);
            }
            Err(e) => {
                return Err(CacheError::io(
                    format!("reading cache file {}", path.display()),
                    e,
                ))
            }
        };

        let plaintext = self.protector.unprotect(&sealed, path)?;
        debug!("Read {} bytes from {}", plaintext.len(), path.display());
        Ok(Blob::Present(plaintext))
    }

    fn write(&self, path: &Path, blob: &Blob) -> CacheResult<()> {
        match blob {
            Blob::Present(plaintext) => {
                let sealed = self.protector.protect(plaintext)?;
                self.write_atomic(path, &sealed)?;
                debug!("Wrote {} bytes to {}", plaintext.len(), path.display());
                Ok(())
            }
            Blob::Absent => match fs::remove_file(path) {
                Ok(()) => {
                    debug!("Deleted cache file {}", path.display());
                    Ok(())
                }
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(CacheError::io(
                    format!("removing cache file {}", path.display()),
                    e,
                )),
            },
        }
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// Create a directory (and parents) readable only by the current user
pub(crate) fn create_private_dir(dir: &Path) -> CacheResult<()> {
    if dir.as_os_str().is_empty() || dir.is_dir() {
        return Ok(());
    }

    fs::create_dir_all(dir)
        .map_err(|e| CacheError::io(format!("creating directory {}", dir.display()), e))?;

    // Set restrictive permissions
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o700);
        fs::set_permissions(dir, perms)
            .map_err(|e| CacheError::io("setting cache dir permissions", e))?;
    }

    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
