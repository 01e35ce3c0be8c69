//! CLI command implementations

pub mod add;
pub mod clear;
pub mod config;
pub mod list;
pub mod migrate;
pub mod remove;
pub mod status;

pub use add::execute as add;
pub use clear::execute as clear;
pub use config::execute as config;
pub use list::execute as list;
pub use migrate::execute as migrate;
pub use remove::execute as remove;
pub use status::execute as status;

use crate::audit::{AuditEvent, AuditLog, AuditSink};
use crate::bridge::{CacheHandle, PersistentCache};
use crate::config::{Config, ResolvedPaths};
use crate::error::{CacheError, CacheResult};
use crate::store::{DataProtector, ProtectedFileStore};
use console::Emoji;
use std::sync::Arc;
use tracing::debug;

pub(crate) static CHECK: Emoji<'_, '_> = Emoji("✓ ", "[OK] ");
pub(crate) static CROSS: Emoji<'_, '_> = Emoji("✗ ", "[FAIL] ");
pub(crate) static WARN: Emoji<'_, '_> = Emoji("⚠ ", "[WARN] ");

/// An opened on-disk cache
pub(crate) struct OpenCache {
    pub handle: CacheHandle,
    pub protector: DataProtector,
    audit: Option<Arc<AuditLog>>,
}

impl OpenCache {
    /// Record an entry-level event next to the bridge's own events
    pub fn audit(&self, event: AuditEvent) {
        if let Some(log) = &self.audit {
            log.record(&event);
        }
    }
}

/// Build the encrypted, file-backed cache the config and overrides describe
pub(crate) fn open_cache(config: &Config, paths: &ResolvedPaths) -> CacheResult<OpenCache> {
    let protector = DataProtector::for_current_user(&paths.key_file)?;
    debug!(
        "Opened protection key {} for {}",
        protector.fingerprint(),
        protector.principal()
    );

    let formats = config.formats.format_set(&paths.cache_dir);
    let store = Arc::new(ProtectedFileStore::new(protector.clone()));
    let mut hooks = PersistentCache::new(formats, config.cache.migration_policy(), store)?;
    let audit = AuditLog::from_config(config, &paths.cache_dir).map(Arc::new);
    if let Some(log) = &audit {
        debug!("Auditing to {}", log.path().display());
        hooks = hooks.with_audit(log.clone());
    }

    Ok(OpenCache {
        handle: CacheHandle::new(hooks),
        protector,
        audit,
    })
}

/// Open the cache and run `f` on a blocking thread.
///
/// The hooks do synchronous file IO and hold a lock, so they stay off the
/// async runtime.
pub(crate) async fn with_cache<T, F>(config: &Config, paths: &ResolvedPaths, f: F) -> CacheResult<T>
where
    F: FnOnce(&OpenCache) -> CacheResult<T> + Send + 'static,
    T: Send + 'static,
{
    let config = config.clone();
    let paths = paths.clone();
    tokio::task::spawn_blocking(move || {
        let cache = open_cache(&config, &paths)?;
        f(&cache)
    })
    .await
    .map_err(|e| CacheError::Internal(format!("cache task failed: {}", e)))?
}
