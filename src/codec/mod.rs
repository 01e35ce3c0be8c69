//! Format codecs
//!
//! Converts the in-memory [`CacheState`] to and from each supported on-disk
//! format, and merges what several formats hold into one state.
//!
//! # Field coverage
//!
//! | Field | Legacy | Unified v1 | Unified v2 |
//! |-------|--------|------------|------------|
//! | kind | token kinds only | all | all |
//! | secret, client id, expiry | yes | yes | yes |
//! | environment | - | yes | yes |
//! | extended expiry, family id, extra | - | - | yes |
//!
//! Decoding what was encoded gives back the state restricted to the format's
//! columns ([`CacheState::restricted_to`]); the remaining fields of a record
//! are never altered.

pub mod entry;
pub mod format;
pub mod legacy;
pub mod merge;
pub mod unified_v1;
pub mod unified_v2;

pub use entry::{CacheEntry, CacheState, EntryKind};
pub use format::{FormatDescriptor, FormatKind, FormatSet};
pub use merge::{merge, Fragment};

use crate::error::CacheResult;

/// Decode bytes stored in `format` into a fragment
pub fn decode(format: FormatKind, bytes: &[u8]) -> CacheResult<Fragment> {
    let state = match format {
        FormatKind::Legacy => legacy::decode(bytes)?,
        FormatKind::UnifiedV1 => unified_v1::decode(bytes)?,
        FormatKind::UnifiedV2 => unified_v2::decode(bytes)?,
    };
    Ok(Fragment::new(format, state))
}

/// Encode the full state in `format`. Deterministic for a given state.
pub fn encode(format: FormatKind, state: &CacheState) -> CacheResult<Vec<u8>> {
    match format {
        FormatKind::Legacy => legacy::encode(state),
        FormatKind::UnifiedV1 => unified_v1::encode(state),
        FormatKind::UnifiedV2 => unified_v2::encode(state),
    }
}
