//! Combining fragments decoded from several formats

use super::{CacheState, FormatKind};

/// Entries decoded from one format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub format: FormatKind,
    pub state: CacheState,
}

impl Fragment {
    pub fn new(format: FormatKind, state: CacheState) -> Self {
        Self { format, state }
    }
}

/// Merge fragments into one state.
///
/// Fragments are applied in ascending format precedence and the last one
/// wins per key, so newer formats supersede older ones for overlapping
/// entries while entries only present in older formats survive.
pub fn merge(fragments: impl IntoIterator<Item = Fragment>) -> CacheState {
    let mut fragments: Vec<Fragment> = fragments.into_iter().collect();
    fragments.sort_by_key(|f| f.format.precedence());

    let mut merged = CacheState::new();
    for fragment in fragments {
        for (key, entry) in fragment.state {
            merged.insert(key, entry);
        }
    }
    merged
}
