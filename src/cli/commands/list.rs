//! List command - show cached entries without their secrets

use super::with_cache;
use crate::cli::args::{ListArgs, OutputFormat};
use crate::codec::CacheEntry;
use crate::config::{Config, ResolvedPaths};
use crate::error::CacheResult;
use console::style;
use serde::Serialize;

/// What list prints for one entry
#[derive(Debug, Serialize)]
struct EntrySummary {
    key: String,
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    environment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<String>,
    expired: bool,
}

impl EntrySummary {
    fn new(key: String, entry: &CacheEntry) -> Self {
        Self {
            key,
            kind: entry.kind.to_string(),
            client_id: entry.client_id.clone(),
            environment: entry.environment.clone(),
            expires_at: entry.expires_at().map(|at| at.to_rfc3339()),
            expired: entry.is_expired(),
        }
    }
}

/// Execute the list command
pub async fn execute(args: ListArgs, config: &Config, paths: &ResolvedPaths) -> CacheResult<()> {
    let entries = with_cache(config, paths, |cache| cache.handle.access(|c| Ok(c.entries()))).await?;
    let summaries: Vec<EntrySummary> = entries
        .into_iter()
        .map(|(key, entry)| EntrySummary::new(key, &entry))
        .collect();

    if summaries.is_empty() {
        match args.format {
            OutputFormat::Json => println!("[]"),
            OutputFormat::Plain => {}
            OutputFormat::Table => println!("{}", style("No cached entries").dim()),
        }
        return Ok(());
    }

    match args.format {
        OutputFormat::Table => print_table(&summaries),
        OutputFormat::Json => print_json(&summaries)?,
        OutputFormat::Plain => print_plain(&summaries),
    }

    Ok(())
}

fn print_table(entries: &[EntrySummary]) {
    println!(
        "{:<32} {:<14} {:<24} {:<20}",
        style("KEY").bold(),
        style("KIND").bold(),
        style("CLIENT").bold(),
        style("EXPIRES").bold()
    );
    println!("{}", "-".repeat(92));

    for entry in entries {
        let expires = match &entry.expires_at {
            Some(at) if entry.expired => style(at.clone()).red(),
            Some(at) => style(at.clone()).green(),
            None => style("-".to_string()).dim(),
        };

        println!(
            "{:<32} {:<14} {:<24} {:<20}",
            entry.key,
            entry.kind,
            entry.client_id.as_deref().unwrap_or("-"),
            expires
        );
    }

    println!();
    println!("{} entry(s)", entries.len());
}

fn print_json(entries: &[EntrySummary]) -> CacheResult<()> {
    let json = serde_json::to_string_pretty(entries)?;
    println!("{}", json);
    Ok(())
}

fn print_plain(entries: &[EntrySummary]) {
    for entry in entries {
        println!("{}", entry.key);
    }
}
