//! In-process locking of cache file sets
//!
//! Every cache instance locks the set of files it is configured with. Two
//! instances configured with the same files share one lock, so they never
//! interleave a load with a persist; instances on different files never
//! contend.
//!
//! This is not a cross-process lock. Two processes writing the same files
//! can still lose each other's updates (last writer wins).

use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock, Weak};
use tracing::debug;

static REGISTRY: LazyLock<Mutex<HashMap<Vec<PathBuf>, Weak<FileLock>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Mutual exclusion for one set of cache files
#[derive(Debug)]
pub struct FileLock {
    paths: Vec<PathBuf>,
    inner: Mutex<()>,
}

/// Held while inside a load or persist critical section
pub type FileLockGuard<'a> = MutexGuard<'a, ()>;

impl FileLock {
    /// The process-wide lock for this set of files
    pub fn for_paths(paths: impl IntoIterator<Item = PathBuf>) -> Arc<Self> {
        let mut key: Vec<PathBuf> = paths.into_iter().map(normalize).collect();
        key.sort();
        key.dedup();

        let mut registry = REGISTRY.lock();
        if let Some(existing) = registry.get(&key).and_then(Weak::upgrade) {
            return existing;
        }

        // Drop entries whose locks are gone
        registry.retain(|_, lock| lock.strong_count() > 0);

        debug!("Creating file lock for {} paths", key.len());
        let lock = Arc::new(Self {
            paths: key.clone(),
            inner: Mutex::new(()),
        });
        registry.insert(key, Arc::downgrade(&lock));
        lock
    }

    /// Block until the lock is free
    pub fn lock(&self) -> FileLockGuard<'_> {
        self.inner.lock()
    }

    /// Files covered by this lock, sorted
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

/// Make relative paths absolute so the same file maps to the same lock
fn normalize(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(&path))
        .unwrap_or(path)
}
