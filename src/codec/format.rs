//! Supported on-disk formats and where they live

use crate::store::ByteStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Supported on-disk formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormatKind {
    /// Oldest binary format; token kinds only, no environment or extensions
    Legacy,
    /// First unified JSON format, grouped by credential kind
    UnifiedV1,
    /// Current unified JSON format, lossless
    UnifiedV2,
}

impl FormatKind {
    /// Merge precedence; higher wins for overlapping entries
    pub fn precedence(&self) -> u8 {
        match self {
            Self::Legacy => 0,
            Self::UnifiedV1 => 1,
            Self::UnifiedV2 => 2,
        }
    }

    /// Conventional file name for this format
    pub fn default_file_name(&self) -> &'static str {
        match self {
            Self::Legacy => "cacheAdalV3.bin",
            Self::UnifiedV1 => "unifiedCache.bin",
            Self::UnifiedV2 => "unifiedCacheV2.bin",
        }
    }

    /// All formats, lowest precedence first
    pub fn all() -> &'static [Self] {
        &[Self::Legacy, Self::UnifiedV1, Self::UnifiedV2]
    }
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Legacy => "legacy",
            Self::UnifiedV1 => "unified-v1",
            Self::UnifiedV2 => "unified-v2",
        };
        write!(f, "{}", name)
    }
}

/// One configured format: which codec, which file, and whether it is used
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatDescriptor {
    pub kind: FormatKind,
    pub path: PathBuf,
    /// Disabled formats are neither read nor written, only deleted by `clear`
    pub enabled: bool,
}

impl FormatDescriptor {
    pub fn new(kind: FormatKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// The formats one cache instance is configured with, fixed at construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatSet {
    descriptors: Vec<FormatDescriptor>,
}

impl FormatSet {
    /// Build a set, ordering descriptors by precedence.
    ///
    /// A later descriptor for the same kind replaces an earlier one.
    pub fn new(descriptors: impl IntoIterator<Item = FormatDescriptor>) -> Self {
        let mut descriptors: Vec<FormatDescriptor> = descriptors.into_iter().collect();
        descriptors.reverse();
        descriptors.sort_by_key(|d| d.kind.precedence());
        descriptors.dedup_by_key(|d| d.kind);
        Self { descriptors }
    }

    /// All three formats, enabled, under their conventional names in `folder`
    pub fn in_folder(folder: &Path) -> Self {
        Self::new(
            FormatKind::all()
                .iter()
                .map(|kind| FormatDescriptor::new(*kind, folder.join(kind.default_file_name()))),
        )
    }

    /// Every configured descriptor, lowest precedence first
    pub fn all(&self) -> &[FormatDescriptor] {
        &self.descriptors
    }

    /// Enabled descriptors, lowest precedence first
    pub fn enabled(&self) -> impl Iterator<Item = &FormatDescriptor> {
        self.descriptors.iter().filter(|d| d.enabled)
    }

    pub fn get(&self, kind: FormatKind) -> Option<&FormatDescriptor> {
        self.descriptors.iter().find(|d| d.kind == kind)
    }

    /// Paths of every configured file, enabled or not
    pub fn paths(&self) -> Vec<PathBuf> {
        self.descriptors.iter().map(|d| d.path.clone()).collect()
    }

    /// Which configured files currently exist in `store`
    pub fn presence(&self, store: &dyn ByteStore) -> Vec<(FormatDescriptor, bool)> {
        self.descriptors
            .iter()
            .map(|d| (d.clone(), store.exists(&d.path)))
            .collect()
    }
}
