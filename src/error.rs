//! Error types for tokencache
//!
//! All modules use `CacheResult<T>` as their return type.

use crate::codec::FormatKind;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for tokencache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// All errors that can occur in tokencache
#[derive(Error, Debug)]
pub enum CacheError {
    // Store errors
    /// A cache file does not exist. Never returned by `ByteStore::read`,
    /// which reports missing files as `Blob::Absent`; kept so callers that
    /// require a file can say so.
    #[error("Cache file not found: {0}")]
    FileAbsent(PathBuf),

    #[error("Cache file {path} is corrupt: {reason}")]
    CorruptCache { path: PathBuf, reason: String },

    #[error("Protection key unavailable at {path}: {reason}")]
    KeyUnavailable { path: PathBuf, reason: String },

    // Codec errors
    #[error("Malformed {format} cache data: {reason}")]
    MalformedFormat { format: FormatKind, reason: String },

    #[error("Entry {key} cannot be represented in the {format} format")]
    Unrepresentable { format: FormatKind, key: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No cache formats enabled")]
    NoFormatsEnabled,

    // Access errors
    #[error("Cache entry not found: {0}")]
    EntryNotFound(String),

    #[error("Cache operation failed ({operation}) and persisting afterwards also failed ({persist})")]
    OperationAndPersist {
        operation: Box<CacheError>,
        persist: Box<CacheError>,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl CacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a corrupt cache error for a file
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptCache {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a malformed format error
    pub fn malformed(format: FormatKind, reason: impl Into<String>) -> Self {
        Self::MalformedFormat {
            format,
            reason: reason.into(),
        }
    }

    /// Whether the cache can keep working after this error.
    ///
    /// Malformed data for one format only drops that format's fragment;
    /// corruption is recoverable when the caller chooses to start empty.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::FileAbsent(_)
                | Self::MalformedFormat { .. }
                | Self::Unrepresentable { .. }
                | Self::CorruptCache { .. }
                | Self::EntryNotFound(_)
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::CorruptCache { .. } => Some(
                "Run: tokencache clear, or set cache.on_corrupt = \"discard\" to start empty",
            ),
            Self::KeyUnavailable { .. } => {
                Some("Check permissions on the protection key file (expected mode 0600)")
            }
            Self::NoFormatsEnabled => Some("Enable at least one [formats.*] section in the config"),
            Self::ConfigInvalid { .. } => Some("Run: tokencache config init --force"),
            _ => None,
        }
    }
}
