//! Unified format, first revision
//!
//! A JSON object with one section per credential kind, each mapping the
//! credential key to its record:
//!
//! ```json
//! {"AccessToken": {"<key>": {"secret": "...", "client_id": "...",
//!   "environment": "...", "expires_on": "1700000000"}}, "RefreshToken": {}, ...}
//! ```
//!
//! Expiry is a decimal string of unix seconds. Extended expiry, family id and
//! extra fields are not stored. Unknown fields inside a record are ignored;
//! unknown sections are rejected.

use super::{CacheEntry, CacheState, EntryKind, FormatKind};
use crate::error::{CacheError, CacheResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

type Section = BTreeMap<String, RecordV1>;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct DocumentV1 {
    #[serde(rename = "AccessToken", default)]
    access_token: Section,
    #[serde(rename = "RefreshToken", default)]
    refresh_token: Section,
    #[serde(rename = "IdToken", default)]
    id_token: Section,
    #[serde(rename = "Account", default)]
    account: Section,
    #[serde(rename = "AppMetadata", default)]
    app_metadata: Section,
}

impl DocumentV1 {
    fn section_mut(&mut self, kind: EntryKind) -> &mut Section {
        match kind {
            EntryKind::AccessToken => &mut self.access_token,
            EntryKind::RefreshToken => &mut self.refresh_token,
            EntryKind::IdToken => &mut self.id_token,
            EntryKind::Account => &mut self.account,
            EntryKind::AppMetadata => &mut self.app_metadata,
        }
    }

    fn into_sections(self) -> [(EntryKind, Section); 5] {
        [
            (EntryKind::AccessToken, self.access_token),
            (EntryKind::RefreshToken, self.refresh_token),
            (EntryKind::IdToken, self.id_token),
            (EntryKind::Account, self.account),
            (EntryKind::AppMetadata, self.app_metadata),
        ]
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RecordV1 {
    secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    environment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_on: Option<String>,
}

/// Parse a unified v1 blob
pub fn decode(bytes: &[u8]) -> CacheResult<CacheState> {
    let document: DocumentV1 = serde_json::from_slice(bytes)
        .map_err(|e| CacheError::malformed(FormatKind::UnifiedV1, e.to_string()))?;

    let mut state = CacheState::new();
    for (kind, section) in document.into_sections() {
        for (key, record) in section {
            let expires_on = record
                .expires_on
                .as_deref()
                .map(|s| {
                    s.parse::<i64>().map_err(|_| {
                        CacheError::malformed(
                            FormatKind::UnifiedV1,
                            format!("entry {} has non-numeric expires_on {:?}", key, s),
                        )
                    })
                })
                .transpose()?;

            let entry = CacheEntry {
                client_id: record.client_id,
                environment: record.environment,
                expires_on,
                ..CacheEntry::new(kind, record.secret)
            };

            if state.insert(key.clone(), entry).is_some() {
                return Err(CacheError::malformed(
                    FormatKind::UnifiedV1,
                    format!("key {} appears in more than one section", key),
                ));
            }
        }
    }

    Ok(state)
}

/// Serialize `state`, dropping fields this revision cannot hold
pub fn encode(state: &CacheState) -> CacheResult<Vec<u8>> {
    let mut document = DocumentV1::default();
    for (key, entry) in state {
        document.section_mut(entry.kind).insert(
            key.clone(),
            RecordV1 {
                secret: entry.secret.clone(),
                client_id: entry.client_id.clone(),
                environment: entry.environment.clone(),
                expires_on: entry.expires_on.map(|s| s.to_string()),
            },
        );
    }
    Ok(serde_json::to_vec(&document)?)
}
