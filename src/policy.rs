//! Migration policy
//!
//! Decides, from which formats are on disk, which content to trust and which
//! files to write back.
//!
//! # Load rules
//!
//! | Decoded formats | Result |
//! |-----------------|--------|
//! | none | empty state |
//! | one | that format |
//! | several, fallback on | newest wins per key, older fill the gaps |
//! | several, fallback off | newest only, older skipped |
//!
//! "Newest" means the highest-precedence format that decoded successfully;
//! a malformed file does not get to be authoritative.

use crate::codec::{FormatDescriptor, FormatKind, FormatSet, Fragment};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Which formats exist on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskState {
    None,
    OnlyLegacy,
    OnlyUnifiedV1,
    OnlyUnifiedV2,
    Mixed(BTreeSet<FormatKind>),
}

impl DiskState {
    pub fn from_present(present: impl IntoIterator<Item = FormatKind>) -> Self {
        let present: BTreeSet<FormatKind> = present.into_iter().collect();
        let mut iter = present.iter();
        match (iter.next(), iter.next()) {
            (None, _) => Self::None,
            (Some(FormatKind::Legacy), None) => Self::OnlyLegacy,
            (Some(FormatKind::UnifiedV1), None) => Self::OnlyUnifiedV1,
            (Some(FormatKind::UnifiedV2), None) => Self::OnlyUnifiedV2,
            (Some(_), Some(_)) => Self::Mixed(present),
        }
    }

    /// Present formats, lowest precedence first
    pub fn present(&self) -> Vec<FormatKind> {
        match self {
            Self::None => vec![],
            Self::OnlyLegacy => vec![FormatKind::Legacy],
            Self::OnlyUnifiedV1 => vec![FormatKind::UnifiedV1],
            Self::OnlyUnifiedV2 => vec![FormatKind::UnifiedV2],
            Self::Mixed(set) => set.iter().copied().collect(),
        }
    }

    pub fn contains(&self, format: FormatKind) -> bool {
        self.present().contains(&format)
    }
}

impl fmt::Display for DiskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::OnlyLegacy => write!(f, "legacy only"),
            Self::OnlyUnifiedV1 => write!(f, "unified-v1 only"),
            Self::OnlyUnifiedV2 => write!(f, "unified-v2 only"),
            Self::Mixed(set) => {
                let names: Vec<String> = set.iter().map(ToString::to_string).collect();
                write!(f, "mixed ({})", names.join(", "))
            }
        }
    }
}

/// What to do when a cache file cannot be decrypted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorruptPolicy {
    /// Propagate `CorruptCache` to the caller
    #[default]
    Fail,
    /// Log and treat the file as absent; it is overwritten on the next persist
    Discard,
}

/// Fragments chosen for merging
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Highest-precedence decoded format, if any
    pub authoritative: Option<FormatKind>,
    /// Fragments to merge, lowest precedence first
    pub used: Vec<Fragment>,
    /// Formats that decoded but were left out
    pub skipped: Vec<FormatKind>,
}

/// Load and write rules for one cache instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationPolicy {
    /// Merge older formats in for keys the authoritative one lacks
    pub allow_legacy_fallback: bool,
    pub on_corrupt: CorruptPolicy,
}

impl MigrationPolicy {
    pub fn new(allow_legacy_fallback: bool) -> Self {
        Self {
            allow_legacy_fallback,
            on_corrupt: CorruptPolicy::Fail,
        }
    }

    pub fn with_corrupt_policy(mut self, on_corrupt: CorruptPolicy) -> Self {
        self.on_corrupt = on_corrupt;
        self
    }

    /// Choose which decoded fragments contribute to the merged state
    pub fn select(&self, mut fragments: Vec<Fragment>) -> Selection {
        fragments.sort_by_key(|f| f.format.precedence());

        let Some(authoritative) = fragments.last().map(|f| f.format) else {
            return Selection::default();
        };

        if self.allow_legacy_fallback {
            return Selection {
                authoritative: Some(authoritative),
                used: fragments,
                skipped: vec![],
            };
        }

        let (used, older): (Vec<Fragment>, Vec<Fragment>) = fragments
            .into_iter()
            .partition(|f| f.format == authoritative);
        Selection {
            authoritative: Some(authoritative),
            used,
            skipped: older.into_iter().map(|f| f.format).collect(),
        }
    }

    /// Files to write after a mutation: every enabled format
    pub fn write_targets<'a>(&self, formats: &'a FormatSet) -> Vec<&'a FormatDescriptor> {
        formats.enabled().collect()
    }
}

impl Default for MigrationPolicy {
    fn default() -> Self {
        Self::new(true)
    }
}
