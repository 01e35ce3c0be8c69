//! Add command - insert or replace one entry

use super::{with_cache, CHECK};
use crate::audit::AuditEvent;
use crate::cli::args::AddArgs;
use crate::codec::{CacheEntry, EntryKind};
use crate::config::{Config, ResolvedPaths};
use crate::error::{CacheError, CacheResult};
use chrono::Utc;
use console::style;

/// Execute the add command
pub async fn execute(args: AddArgs, config: &Config, paths: &ResolvedPaths) -> CacheResult<()> {
    if args.key.trim().is_empty() {
        return Err(CacheError::User("Entry key must not be empty".to_string()));
    }

    let kind = EntryKind::from(args.kind);
    let entry = build_entry(&args, kind);
    let key = args.key.clone();

    let replaced = with_cache(config, paths, move |cache| {
        let replaced = cache
            .handle
            .access(|c| Ok(c.insert(key.clone(), entry).is_some()))?;
        cache.audit(AuditEvent::EntryAdded {
            key,
            kind,
            replaced,
        });
        Ok(replaced)
    })
    .await?;

    let verb = if replaced { "Updated" } else { "Added" };
    println!("{} {} {} ({})", CHECK, verb, style(&args.key).bold(), kind);
    Ok(())
}

fn build_entry(args: &AddArgs, kind: EntryKind) -> CacheEntry {
    let mut entry = CacheEntry::new(kind, args.secret.clone());
    if let Some(client_id) = &args.client_id {
        entry = entry.with_client_id(client_id.clone());
    }
    if let Some(environment) = &args.environment {
        entry = entry.with_environment(environment.clone());
    }
    if let Some(secs) = args.expires_in {
        entry = entry.with_expires_on(Utc::now().timestamp() + i64::from(secs));
    }
    entry
}
