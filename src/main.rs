//! tokencache - encrypted multi-format credential cache
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use std::process::ExitCode;
use tokencache::cli::args::{ConfigAction, LogFormat};
use tokencache::cli::{commands, Cli, Commands};
use tokencache::config::{Config, ConfigManager, ResolvedPaths};
use tokencache::error::CacheResult;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> CacheResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };

    // Path and init must work even when the existing file does not parse
    let config = match &cli.command {
        Commands::Config(args)
            if matches!(
                args.action,
                Some(ConfigAction::Path) | Some(ConfigAction::Init { .. })
            ) =>
        {
            Config::default()
        }
        _ => config_manager.load().await?,
    };

    let log_format = cli
        .log_format
        .unwrap_or_else(|| LogFormat::from_config(&config.general.log_format));
    init_logging(cli.verbose, log_format);
    debug!("Using config {}", config_manager.path().display());

    let mut paths = ResolvedPaths::resolve(&config, cli.cache_dir.as_deref());
    if cli.app {
        paths = paths.for_app();
    }
    debug!(
        "Cache folder {}, key file {}",
        paths.cache_dir.display(),
        paths.key_file.display()
    );

    match cli.command {
        Commands::Status => commands::status(&config, &paths).await,
        Commands::List(args) => commands::list(args, &config, &paths).await,
        Commands::Add(args) => commands::add(args, &config, &paths).await,
        Commands::Remove(args) => commands::remove(args, &config, &paths).await,
        Commands::Migrate => commands::migrate(&config, &paths).await,
        Commands::Clear(args) => commands::clear(args, &config, &paths).await,
        Commands::Config(args) => commands::config(args, &config, &config_manager).await,
    }
}

/// 0 = warn, 1 = info, 2+ = debug; logs go to stderr
fn init_logging(verbose: u8, format: LogFormat) {
    let filter = match verbose {
        0 => EnvFilter::new("tokencache=warn"),
        1 => EnvFilter::new("tokencache=info"),
        _ => EnvFilter::new("tokencache=debug"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        LogFormat::Text => builder.without_time().init(),
        LogFormat::Json => builder.json().init(),
    }
}
