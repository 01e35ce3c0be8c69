//! Cache entries and the in-memory cache state

use super::FormatKind;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::btree_map::{self, BTreeMap};
use std::collections::BTreeSet;
use std::fmt;

/// Kind of credential an entry holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    AccessToken,
    RefreshToken,
    IdToken,
    Account,
    AppMetadata,
}

impl EntryKind {
    /// All kinds, in the order unified documents list them
    pub fn all() -> &'static [Self] {
        &[
            Self::AccessToken,
            Self::RefreshToken,
            Self::IdToken,
            Self::Account,
            Self::AppMetadata,
        ]
    }

    /// Name used as section key in unified documents
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessToken => "AccessToken",
            Self::RefreshToken => "RefreshToken",
            Self::IdToken => "IdToken",
            Self::Account => "Account",
            Self::AppMetadata => "AppMetadata",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One cached credential record.
///
/// The secret is opaque token material; nothing here interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub kind: EntryKind,

    pub secret: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Authority host the credential was issued by
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,

    /// Expiry as unix seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_on: Option<i64>,

    /// Extended expiry as unix seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extended_expires_on: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_id: Option<String>,

    /// Additional fields carried through untouched
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl CacheEntry {
    /// Create an entry with only the mandatory fields
    pub fn new(kind: EntryKind, secret: impl Into<String>) -> Self {
        Self {
            kind,
            secret: secret.into(),
            client_id: None,
            environment: None,
            expires_on: None,
            extended_expires_on: None,
            family_id: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn with_expires_on(mut self, unix_secs: i64) -> Self {
        self.expires_on = Some(unix_secs);
        self
    }

    pub fn with_extended_expires_on(mut self, unix_secs: i64) -> Self {
        self.extended_expires_on = Some(unix_secs);
        self
    }

    pub fn with_family_id(mut self, family_id: impl Into<String>) -> Self {
        self.family_id = Some(family_id.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Expiry as a timestamp
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_on.and_then(|s| DateTime::from_timestamp(s, 0))
    }

    /// Check if the entry is expired
    pub fn is_expired(&self) -> bool {
        // Add 60 second buffer to prevent using almost-expired tokens
        self.expires_at()
            .is_some_and(|at| Utc::now() >= at - Duration::seconds(60))
    }

    /// The part of this entry `format` can represent, or `None` when the
    /// format cannot hold entries of this kind at all.
    ///
    /// Legacy keeps kind, secret, client id and expiry for token kinds only.
    /// Unified v1 adds the environment and every kind. Unified v2 keeps
    /// everything.
    pub fn restricted_to(&self, format: FormatKind) -> Option<Self> {
        match format {
            FormatKind::Legacy => {
                if !matches!(
                    self.kind,
                    EntryKind::AccessToken | EntryKind::RefreshToken | EntryKind::IdToken
                ) {
                    return None;
                }
                Some(Self {
                    kind: self.kind,
                    secret: self.secret.clone(),
                    client_id: self.client_id.clone(),
                    expires_on: self.expires_on,
                    ..Self::new(self.kind, "")
                })
            }
            FormatKind::UnifiedV1 => Some(Self {
                extended_expires_on: None,
                family_id: None,
                extra: BTreeMap::new(),
                ..self.clone()
            }),
            FormatKind::UnifiedV2 => Some(self.clone()),
        }
    }
}

/// The live set of cached credentials, keyed by credential key.
///
/// Ordered so that every encoding of the same state is byte-identical.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheState {
    entries: BTreeMap<String, CacheEntry>,
}

impl CacheState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Insert or replace an entry, returning the previous one
    pub fn insert(&mut self, key: impl Into<String>, entry: CacheEntry) -> Option<CacheEntry> {
        self.entries.insert(key.into(), entry)
    }

    pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        self.entries.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, CacheEntry> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Add entries from `other` whose keys are not present here and not
    /// listed in `skip`.
    ///
    /// Returns how many entries were added.
    pub fn fill_missing(&mut self, other: CacheState, skip: &BTreeSet<String>) -> usize {
        let mut added = 0;
        for (key, entry) in other.entries {
            if skip.contains(&key) {
                continue;
            }
            if let btree_map::Entry::Vacant(slot) = self.entries.entry(key) {
                slot.insert(entry);
                added += 1;
            }
        }
        added
    }

    /// This state restricted to what `format` can represent
    pub fn restricted_to(&self, format: FormatKind) -> Self {
        self.entries
            .iter()
            .filter_map(|(key, entry)| Some((key.clone(), entry.restricted_to(format)?)))
            .collect()
    }
}

impl FromIterator<(String, CacheEntry)> for CacheState {
    fn from_iter<I: IntoIterator<Item = (String, CacheEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for CacheState {
    type Item = (String, CacheEntry);
    type IntoIter = btree_map::IntoIter<String, CacheEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a CacheState {
    type Item = (&'a String, &'a CacheEntry);
    type IntoIter = btree_map::Iter<'a, String, CacheEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
