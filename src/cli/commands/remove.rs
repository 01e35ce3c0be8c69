//! Remove command - delete one entry

use super::{with_cache, CHECK};
use crate::audit::AuditEvent;
use crate::cli::args::RemoveArgs;
use crate::config::{Config, ResolvedPaths};
use crate::error::{CacheError, CacheResult};
use console::style;

/// Execute the remove command
pub async fn execute(args: RemoveArgs, config: &Config, paths: &ResolvedPaths) -> CacheResult<()> {
    let key = args.key.clone();
    let removed = with_cache(config, paths, move |cache| {
        let removed = cache.handle.access(|c| {
            c.remove(&key)
                .ok_or_else(|| CacheError::EntryNotFound(key.clone()))
        })?;
        cache.audit(AuditEvent::EntryRemoved {
            key,
            kind: removed.kind,
        });
        Ok(removed)
    })
    .await?;

    println!("{} Removed {} ({})", CHECK, style(&args.key).bold(), removed.kind);
    Ok(())
}
