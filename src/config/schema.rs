//! Configuration schema for tokencache
//!
//! Configuration is stored at `~/.config/tokencache/config.toml`

use crate::codec::{FormatDescriptor, FormatKind, FormatSet};
use crate::policy::{CorruptPolicy, MigrationPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Cache location and load policy
    pub cache: CacheConfig,

    /// Per-format switches
    pub formats: FormatsConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Enable audit logging
    pub audit_log: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            audit_log: true,
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Folder holding the cache files (default: data dir)
    pub folder: Option<PathBuf>,

    /// Protection key file (default: data dir)
    pub key_file: Option<PathBuf>,

    /// Merge older formats in for keys the newest format lacks
    pub allow_legacy_fallback: bool,

    /// What to do with files that cannot be decrypted
    pub on_corrupt: CorruptPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            folder: None,
            key_file: None,
            allow_legacy_fallback: true,
            on_corrupt: CorruptPolicy::Fail,
        }
    }
}

impl CacheConfig {
    pub fn migration_policy(&self) -> MigrationPolicy {
        MigrationPolicy::new(self.allow_legacy_fallback).with_corrupt_policy(self.on_corrupt)
    }
}

/// One format's settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatConfig {
    /// Read and write this format
    pub enabled: bool,

    /// File name or path; relative names resolve against the cache folder
    pub file: Option<PathBuf>,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            file: None,
        }
    }
}

/// Settings for every format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatsConfig {
    pub legacy: FormatConfig,
    pub unified_v1: FormatConfig,
    pub unified_v2: FormatConfig,
}

impl FormatsConfig {
    pub fn get(&self, kind: FormatKind) -> &FormatConfig {
        match kind {
            FormatKind::Legacy => &self.legacy,
            FormatKind::UnifiedV1 => &self.unified_v1,
            FormatKind::UnifiedV2 => &self.unified_v2,
        }
    }

    /// Descriptors for every format under `folder`
    pub fn format_set(&self, folder: &Path) -> FormatSet {
        FormatSet::new(FormatKind::all().iter().map(|kind| {
            let settings = self.get(*kind);
            let path = match &settings.file {
                Some(file) => folder.join(file),
                None => folder.join(kind.default_file_name()),
            };
            let descriptor = FormatDescriptor::new(*kind, path);
            if settings.enabled {
                descriptor
            } else {
                descriptor.disabled()
            }
        }))
    }
}
