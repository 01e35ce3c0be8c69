//! Unified format, second revision
//!
//! A versioned JSON document holding every entry field:
//!
//! ```json
//! {"version": 2, "entries": {"<key>": {"kind": "AccessToken", "secret": "...", ...}}}
//! ```
//!
//! Lossless for every field of [`CacheEntry`].

use super::{CacheEntry, CacheState, FormatKind};
use crate::error::{CacheError, CacheResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Document version written and accepted
pub const VERSION: u32 = 2;

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct DocumentV2 {
    version: u32,
    #[serde(default)]
    entries: BTreeMap<String, CacheEntry>,
}

#[derive(Serialize)]
struct DocumentV2Ref<'a> {
    version: u32,
    entries: BTreeMap<&'a str, &'a CacheEntry>,
}

/// Parse a unified v2 blob
pub fn decode(bytes: &[u8]) -> CacheResult<CacheState> {
    let document: DocumentV2 = serde_json::from_slice(bytes)
        .map_err(|e| CacheError::malformed(FormatKind::UnifiedV2, e.to_string()))?;

    if document.version != VERSION {
        return Err(CacheError::malformed(
            FormatKind::UnifiedV2,
            format!("unsupported version {}", document.version),
        ));
    }

    Ok(document.entries.into_iter().collect())
}

/// Serialize `state`
pub fn encode(state: &CacheState) -> CacheResult<Vec<u8>> {
    let document = DocumentV2Ref {
        version: VERSION,
        entries: state.iter().map(|(k, v)| (k.as_str(), v)).collect(),
    };
    Ok(serde_json::to_vec(&document)?)
}
