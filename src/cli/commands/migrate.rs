//! Migrate command - load every format and rewrite all enabled ones

use super::{with_cache, CHECK, WARN};
use crate::bridge::PersistOutcome;
use crate::config::{Config, ResolvedPaths};
use crate::error::CacheResult;
use console::style;

/// Execute the migrate command
pub async fn execute(config: &Config, paths: &ResolvedPaths) -> CacheResult<()> {
    let (report, outcome) = with_cache(config, paths, |cache| cache.handle.force_persist()).await?;

    for err in &report.malformed {
        println!("{} {}", WARN, style(err).yellow());
    }

    let PersistOutcome::Written { formats, entries } = outcome else {
        println!("{}", style("Nothing to write").dim());
        return Ok(());
    };

    let to: Vec<String> = formats.iter().map(ToString::to_string).collect();

    println!(
        "{} Migrated {} entries from {} to {}",
        CHECK,
        entries,
        report.disk_state,
        to.join(", ")
    );
    Ok(())
}
