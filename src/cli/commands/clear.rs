//! Clear command - delete every cache file

use super::{with_cache, CHECK};
use crate::cli::args::ClearArgs;
use crate::config::{Config, ResolvedPaths};
use crate::error::{CacheError, CacheResult};
use console::{style, Term};

/// Execute the clear command
pub async fn execute(args: ClearArgs, config: &Config, paths: &ResolvedPaths) -> CacheResult<()> {
    if !args.yes && !confirm(paths)? {
        println!("{}", style("Aborted").dim());
        return Ok(());
    }

    let deleted = with_cache(config, paths, |cache| cache.handle.clear()).await?;
    let names: Vec<String> = deleted.iter().map(ToString::to_string).collect();

    if names.is_empty() {
        println!("{} No cache files to delete", CHECK);
    } else {
        println!("{} Deleted {}", CHECK, names.join(", "));
    }
    Ok(())
}

fn confirm(paths: &ResolvedPaths) -> CacheResult<bool> {
    let term = Term::stdout();
    if !term.is_term() {
        return Err(CacheError::User(
            "Refusing to clear without confirmation; pass --yes".to_string(),
        ));
    }

    term.write_str(&format!(
        "Delete all cache files in {}? [y/N] ",
        paths.cache_dir.display()
    ))
    .map_err(|e| CacheError::io("writing prompt", e))?;
    let answer = term
        .read_line()
        .map_err(|e| CacheError::io("reading confirmation", e))?;

    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
