//! Status command - show cache files and what they hold

use super::{with_cache, OpenCache, CHECK, CROSS, WARN};
use crate::bridge::{FormatOutcome, LoadReport};
use crate::config::{Config, ResolvedPaths};
use crate::error::CacheResult;
use console::style;

/// Execute the status command
pub async fn execute(config: &Config, paths: &ResolvedPaths) -> CacheResult<()> {
    println!("{}", style("Token Cache Status").bold().cyan());
    println!();

    let resolved = paths.clone();
    with_cache(config, paths, move |cache| {
        report(cache, &resolved);
        Ok(())
    })
    .await
}

fn report(cache: &OpenCache, paths: &ResolvedPaths) {
    let persistent = cache.handle.hooks();

    println!("{}", style("Location:").bold());
    println!("  {} Folder: {}", CHECK, paths.cache_dir.display());
    println!(
        "  {} Key: {} (fingerprint {}, {})",
        CHECK,
        paths.key_file.display(),
        cache.protector.fingerprint(),
        cache.protector.principal()
    );
    let policy = persistent.policy();
    println!(
        "  {} Legacy fallback: {}, on corrupt: {:?}",
        CHECK,
        if policy.allow_legacy_fallback { "on" } else { "off" },
        policy.on_corrupt
    );

    // Presence first, so files are listed even when one cannot be opened
    println!();
    println!("{}", style("Files:").bold());
    for (descriptor, exists) in persistent.formats().presence(persistent.store()) {
        let state = match (descriptor.enabled, exists) {
            (false, true) => style("disabled, present").yellow(),
            (false, false) => style("disabled").dim(),
            (true, true) => style("present").green(),
            (true, false) => style("absent").dim(),
        };
        println!(
            "  {:<11} {:<20} {}",
            descriptor.kind.to_string(),
            state,
            descriptor.path.display()
        );
    }

    println!();
    println!("{}", style("Contents:").bold());
    match cache.handle.access_with_report(|c| Ok(c.len())) {
        Ok((_, report)) => print_load(&report),
        Err(e) => {
            println!("  {} {}", CROSS, style(&e).red());
            if let Some(hint) = e.hint() {
                println!("    {}", style(hint).dim());
            }
        }
    }
}

fn print_load(report: &LoadReport) {
    println!("  Disk state: {}", report.disk_state);
    for (format, outcome) in &report.outcomes {
        let line = match outcome {
            FormatOutcome::Disabled | FormatOutcome::Absent => continue,
            FormatOutcome::Loaded { entries } => {
                format!("{}{}: {} entries", CHECK, format, entries)
            }
            FormatOutcome::Skipped { entries } => format!(
                "{}{}: {} entries ignored (legacy fallback off)",
                WARN, format, entries
            ),
            FormatOutcome::Malformed => format!("{}{}: unreadable", CROSS, format),
            FormatOutcome::Discarded => format!("{}{}: corrupt, discarded", WARN, format),
        };
        println!("  {}", line);
    }
    for err in &report.malformed {
        println!("    {}", style(err).dim());
    }

    match report.authoritative {
        Some(format) => println!("  Entries: {} (authoritative: {})", report.entries, format),
        None => println!("  Entries: {}", report.entries),
    }
}
