//! The live token cache and its change flag

use crate::codec::{CacheEntry, CacheState};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use tracing::debug;

#[derive(Debug, Default)]
struct CacheInner {
    state: CacheState,
    has_state_changed: bool,
    // Bumped on every mutation so a persist only clears the flag for the
    // state it actually wrote
    generation: u64,
    // Keys removed since the last successful persist; a reload under
    // pending changes must not bring them back
    removed: BTreeSet<String>,
}

impl CacheInner {
    fn touch(&mut self) {
        self.has_state_changed = true;
        self.generation = self.generation.wrapping_add(1);
    }
}

/// How loaded disk content was applied to the live cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    /// Disk content replaced the live state
    Replaced,
    /// The live state had unpersisted changes; disk content only filled
    /// keys the live state lacks
    MergedUnderPending { added: usize },
}

/// In-memory credential cache shared by the token flow and the persistence
/// hooks.
///
/// Every mutation sets the change flag; only a successful persist clears it.
/// Several mutations between two persists coalesce into one write.
#[derive(Debug, Default)]
pub struct TokenCache {
    inner: Mutex<CacheInner>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.inner.lock().state.get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.lock().state.contains_key(key)
    }

    /// Copy of all entries, ordered by key
    pub fn entries(&self) -> Vec<(String, CacheEntry)> {
        self.inner
            .lock()
            .state
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Copy of the whole state
    pub fn snapshot(&self) -> CacheState {
        self.inner.lock().state.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().state.is_empty()
    }

    /// Add or update an entry, returning the previous one.
    ///
    /// Writing an identical entry is not a change.
    pub fn insert(&self, key: impl Into<String>, entry: CacheEntry) -> Option<CacheEntry> {
        let key = key.into();
        let mut inner = self.inner.lock();
        if inner.state.get(&key) == Some(&entry) {
            return Some(entry);
        }
        debug!("Cache entry {} updated", key);
        inner.touch();
        inner.removed.remove(&key);
        inner.state.insert(key, entry)
    }

    pub fn remove(&self, key: &str) -> Option<CacheEntry> {
        let mut inner = self.inner.lock();
        let removed = inner.state.remove(key);
        if removed.is_some() {
            debug!("Cache entry {} removed", key);
            inner.touch();
            inner.removed.insert(key.to_string());
        }
        removed
    }

    /// Remove every entry. The emptied state still has to be persisted.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        if !inner.state.is_empty() {
            let keys: Vec<String> = inner.state.keys().map(str::to_string).collect();
            inner.removed.extend(keys);
            inner.state.clear();
            inner.touch();
        }
    }

    /// Whether the state changed since the last successful persist
    pub fn has_state_changed(&self) -> bool {
        self.inner.lock().has_state_changed
    }

    /// Force the next persist to write, even without a mutation
    pub fn mark_changed(&self) {
        self.inner.lock().touch();
    }

    /// Apply state loaded from disk.
    ///
    /// Under pending changes, keys removed since the last persist stay
    /// removed.
    pub(crate) fn apply_loaded(&self, loaded: CacheState) -> ApplyMode {
        let mut inner = self.inner.lock();
        if inner.has_state_changed {
            let CacheInner { state, removed, .. } = &mut *inner;
            let added = state.fill_missing(loaded, removed);
            ApplyMode::MergedUnderPending { added }
        } else {
            inner.state = loaded;
            ApplyMode::Replaced
        }
    }

    /// The state to persist and its generation, if anything changed
    pub(crate) fn pending_changes(&self) -> Option<(CacheState, u64)> {
        let inner = self.inner.lock();
        inner
            .has_state_changed
            .then(|| (inner.state.clone(), inner.generation))
    }

    /// Clear the change flag if nothing changed since `generation` was taken
    pub(crate) fn mark_persisted(&self, generation: u64) -> bool {
        let mut inner = self.inner.lock();
        if inner.generation == generation {
            inner.has_state_changed = false;
            inner.removed.clear();
            true
        } else {
            false
        }
    }

    /// Empty the cache after its files were deleted
    pub(crate) fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state.clear();
        inner.removed.clear();
        inner.has_state_changed = false;
        inner.generation = inner.generation.wrapping_add(1);
    }
}
