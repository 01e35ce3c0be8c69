//! CLI argument definitions using clap derive

use crate::codec::EntryKind;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// tokencache - Encrypted credential cache across legacy and unified formats
///
/// Inspects, edits and migrates a token cache kept in up to three on-disk
/// formats at once.
#[derive(Parser, Debug)]
#[command(name = "tokencache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "TOKENCACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Folder holding the cache files (overrides cache.folder)
    #[arg(long, global = true, env = "TOKENCACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Use the app-token cache (an `app/` subfolder) instead of the user cache
    #[arg(long, global = true)]
    pub app: bool,

    /// Log output format (overrides general.log_format)
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show cache files, their formats and what they hold
    Status,

    /// List cached entries (secrets are never shown)
    List(ListArgs),

    /// Add or replace an entry
    Add(AddArgs),

    /// Remove an entry
    Remove(RemoveArgs),

    /// Rewrite every enabled format from what is on disk
    Migrate,

    /// Delete every cache file
    Clear(ClearArgs),

    /// Show or edit configuration
    Config(ConfigArgs),
}

/// Arguments for the list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the add command
#[derive(Parser, Debug)]
pub struct AddArgs {
    /// Credential key
    pub key: String,

    /// Kind of credential
    #[arg(short, long, default_value = "refresh-token")]
    pub kind: KindArg,

    /// Opaque token material
    #[arg(short, long, env = "TOKENCACHE_SECRET", hide_env_values = true)]
    pub secret: String,

    /// Client (application) id
    #[arg(long)]
    pub client_id: Option<String>,

    /// Authority host that issued the credential
    #[arg(long)]
    pub environment: Option<String>,

    /// Lifetime in seconds from now
    #[arg(long)]
    pub expires_in: Option<u32>,
}

/// Arguments for the remove command
#[derive(Parser, Debug)]
pub struct RemoveArgs {
    /// Credential key
    pub key: String,
}

/// Arguments for the clear command
#[derive(Parser, Debug)]
pub struct ClearArgs {
    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for list command
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one key per line)
    Plain,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    /// Parse the `general.log_format` config value; unknown values mean text
    pub fn from_config(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Text
        }
    }
}

/// Entry kind as accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    AccessToken,
    RefreshToken,
    IdToken,
    Account,
    AppMetadata,
}

impl From<KindArg> for EntryKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::AccessToken => EntryKind::AccessToken,
            KindArg::RefreshToken => EntryKind::RefreshToken,
            KindArg::IdToken => EntryKind::IdToken,
            KindArg::Account => EntryKind::Account,
            KindArg::AppMetadata => EntryKind::AppMetadata,
        }
    }
}
