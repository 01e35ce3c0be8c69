//! Cache notification bridge
//!
//! The single integration point between a token flow and persistence. A
//! flow brackets every cache access with two hooks:
//!
//! 1. [`CacheAccessHooks::on_before_access`] reads every enabled format,
//!    decodes, selects and merges, then applies the result to the live cache
//! 2. the flow reads or mutates the [`TokenCache`]
//! 3. [`CacheAccessHooks::on_after_access`] writes every enabled format if
//!    the change flag is set, and does nothing otherwise
//!
//! [`CacheHandle`] wires the two together so the after-hook runs even when
//! the operation fails.
//!
//! Both hooks hold the [`FileLock`] for the configured file set for their
//! whole critical section. Nothing inside them awaits.

use crate::audit::{AuditEvent, AuditSink};
use crate::cache::{ApplyMode, TokenCache};
use crate::codec::{self, FormatKind, FormatSet, Fragment};
use crate::error::{CacheError, CacheResult};
use crate::policy::{CorruptPolicy, DiskState, MigrationPolicy};
use crate::store::{Blob, ByteStore};
use crate::sync::FileLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The before/after protocol a token flow drives around each cache access
pub trait CacheAccessHooks: Send + Sync {
    /// Load and merge persisted state into `cache`
    fn on_before_access(&self, cache: &TokenCache) -> CacheResult<LoadReport>;

    /// Persist `cache` if it changed since the last persist
    fn on_after_access(&self, cache: &TokenCache) -> CacheResult<PersistOutcome>;
}

/// What happened to one format during a load
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatOutcome {
    /// Format is disabled and was not read
    Disabled,
    /// No file
    Absent,
    /// Decoded and merged
    Loaded { entries: usize },
    /// Decoded, but older than the authoritative format with fallback off
    Skipped { entries: usize },
    /// Decrypted but did not parse
    Malformed,
    /// Could not be decrypted and was ignored by policy
    Discarded,
}

/// Result of a before-hook
#[derive(Debug)]
pub struct LoadReport {
    pub disk_state: DiskState,
    pub authoritative: Option<FormatKind>,
    pub outcomes: BTreeMap<FormatKind, FormatOutcome>,
    /// Per-format parse failures that did not abort the load
    pub malformed: Vec<CacheError>,
    /// How the merged state was applied to the live cache
    pub applied: ApplyMode,
    /// Entries in the live cache after the load
    pub entries: usize,
}

impl LoadReport {
    pub fn outcome(&self, format: FormatKind) -> Option<&FormatOutcome> {
        self.outcomes.get(&format)
    }

    /// Whether every present format loaded cleanly
    pub fn is_clean(&self) -> bool {
        self.malformed.is_empty()
            && !self
                .outcomes
                .values()
                .any(|o| matches!(o, FormatOutcome::Discarded))
    }
}

/// Result of an after-hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    /// Change flag was clear; nothing written
    Skipped,
    Written {
        formats: Vec<FormatKind>,
        entries: usize,
    },
}

impl PersistOutcome {
    pub fn wrote(&self) -> bool {
        matches!(self, Self::Written { .. })
    }
}

/// File-backed persistence for one cache instance
pub struct PersistentCache {
    formats: FormatSet,
    policy: MigrationPolicy,
    store: Arc<dyn ByteStore>,
    lock: Arc<FileLock>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl std::fmt::Debug for PersistentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentCache")
            .field("formats", &self.formats)
            .field("policy", &self.policy)
            .field("audited", &self.audit.is_some())
            .finish_non_exhaustive()
    }
}

impl PersistentCache {
    /// Fails when no format is enabled
    pub fn new(
        formats: FormatSet,
        policy: MigrationPolicy,
        store: Arc<dyn ByteStore>,
    ) -> CacheResult<Self> {
        if formats.enabled().next().is_none() {
            return Err(CacheError::NoFormatsEnabled);
        }
        let lock = FileLock::for_paths(formats.paths());
        Ok(Self {
            formats,
            policy,
            store,
            lock,
            audit: None,
        })
    }

    /// Report writes, migrations, skipped files and clears to `sink`
    pub fn with_audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    fn audit(&self, event: AuditEvent) {
        if let Some(sink) = &self.audit {
            sink.record(&event);
        }
    }

    pub fn formats(&self) -> &FormatSet {
        &self.formats
    }

    pub fn policy(&self) -> &MigrationPolicy {
        &self.policy
    }

    pub fn store(&self) -> &dyn ByteStore {
        self.store.as_ref()
    }

    /// Which enabled format files exist, without opening them
    pub fn disk_state(&self) -> DiskState {
        DiskState::from_present(
            self.formats
                .enabled()
                .filter(|d| self.store.exists(&d.path))
                .map(|d| d.kind),
        )
    }

    /// Delete every configured file, enabled or not, and empty `cache`
    pub fn clear(&self, cache: &TokenCache) -> CacheResult<Vec<FormatKind>> {
        let _guard = self.lock.lock();
        let mut deleted = Vec::new();
        for descriptor in self.formats.all() {
            if self.store.exists(&descriptor.path) {
                deleted.push(descriptor.kind);
            }
            self.store.write(&descriptor.path, &Blob::Absent)?;
        }
        cache.reset();
        info!("Cleared cache files: {:?}", deleted);
        self.audit(AuditEvent::Cleared {
            deleted: deleted.clone(),
        });
        Ok(deleted)
    }

    fn read_fragments(&self) -> CacheResult<RawLoad> {
        let mut load = RawLoad::default();

        for descriptor in self.formats.all() {
            if !descriptor.enabled {
                load.outcomes.insert(descriptor.kind, FormatOutcome::Disabled);
                continue;
            }

            let bytes = match self.store.read(&descriptor.path) {
                Ok(Blob::Present(bytes)) => bytes,
                Ok(Blob::Absent) => {
                    load.outcomes.insert(descriptor.kind, FormatOutcome::Absent);
                    continue;
                }
                Err(err @ CacheError::CorruptCache { .. })
                    if self.policy.on_corrupt == CorruptPolicy::Discard =>
                {
                    warn!("Discarding {} cache: {}", descriptor.kind, err);
                    load.present.push(descriptor.kind);
                    load.outcomes.insert(descriptor.kind, FormatOutcome::Discarded);
                    continue;
                }
                Err(err) => return Err(err),
            };
            load.present.push(descriptor.kind);

            match codec::decode(descriptor.kind, &bytes) {
                Ok(fragment) => {
                    debug!(
                        "Decoded {} entries from {}",
                        fragment.state.len(),
                        descriptor.kind
                    );
                    load.fragments.push(fragment);
                }
                Err(err @ CacheError::MalformedFormat { .. }) => {
                    warn!("{}", err);
                    load.outcomes.insert(descriptor.kind, FormatOutcome::Malformed);
                    load.malformed.push(err);
                }
                Err(err) => return Err(err),
            }
        }

        Ok(load)
    }
}

#[derive(Default)]
struct RawLoad {
    present: Vec<FormatKind>,
    fragments: Vec<Fragment>,
    outcomes: BTreeMap<FormatKind, FormatOutcome>,
    malformed: Vec<CacheError>,
}

impl CacheAccessHooks for PersistentCache {
    fn on_before_access(&self, cache: &TokenCache) -> CacheResult<LoadReport> {
        let _guard = self.lock.lock();

        let RawLoad {
            present,
            fragments,
            mut outcomes,
            malformed,
        } = self.read_fragments()?;

        let sizes: BTreeMap<FormatKind, usize> = fragments
            .iter()
            .map(|f| (f.format, f.state.len()))
            .collect();
        let selection = self.policy.select(fragments);

        for fragment in &selection.used {
            outcomes.insert(
                fragment.format,
                FormatOutcome::Loaded {
                    entries: fragment.state.len(),
                },
            );
        }
        for format in &selection.skipped {
            debug!("Skipping {} content, fallback disabled", format);
            outcomes.insert(
                *format,
                FormatOutcome::Skipped {
                    entries: sizes.get(format).copied().unwrap_or(0),
                },
            );
        }

        for (format, outcome) in &outcomes {
            match outcome {
                FormatOutcome::Discarded => {
                    self.audit(AuditEvent::FormatDiscarded { format: *format })
                }
                FormatOutcome::Malformed => {
                    self.audit(AuditEvent::FormatMalformed { format: *format })
                }
                _ => {}
            }
        }

        let applied = cache.apply_loaded(codec::merge(selection.used));
        let disk_state = DiskState::from_present(present);
        debug!("Loaded cache, disk state {}", disk_state);

        Ok(LoadReport {
            disk_state,
            authoritative: selection.authoritative,
            outcomes,
            malformed,
            applied,
            entries: cache.len(),
        })
    }

    fn on_after_access(&self, cache: &TokenCache) -> CacheResult<PersistOutcome> {
        let _guard = self.lock.lock();

        let Some((state, generation)) = cache.pending_changes() else {
            return Ok(PersistOutcome::Skipped);
        };

        // Encode everything before touching disk
        let encoded = self
            .policy
            .write_targets(&self.formats)
            .into_iter()
            .map(|d| codec::encode(d.kind, &state).map(|bytes| (d, bytes)))
            .collect::<CacheResult<Vec<_>>>()?;

        let before = self.disk_state();
        let mut formats = Vec::with_capacity(encoded.len());
        for (descriptor, bytes) in encoded {
            self.store.write(&descriptor.path, &Blob::Present(bytes))?;
            formats.push(descriptor.kind);
        }

        cache.mark_persisted(generation);
        info!("Persisted {} entries to {:?}", state.len(), formats);
        self.audit(AuditEvent::for_write(&before, &formats, state.len()));
        Ok(PersistOutcome::Written {
            formats,
            entries: state.len(),
        })
    }
}

/// A token cache together with the hooks that persist it.
///
/// Owned by whoever constructs it; there is no shared global instance.
#[derive(Debug)]
pub struct CacheHandle<H: CacheAccessHooks = PersistentCache> {
    cache: TokenCache,
    hooks: H,
}

impl<H: CacheAccessHooks> CacheHandle<H> {
    pub fn new(hooks: H) -> Self {
        Self {
            cache: TokenCache::new(),
            hooks,
        }
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    /// Run `op` between the before and after hooks
    pub fn access<T>(&self, op: impl FnOnce(&TokenCache) -> CacheResult<T>) -> CacheResult<T> {
        self.access_with_report(op).map(|(value, _)| value)
    }

    /// Like [`access`](Self::access), also returning what the load found
    pub fn access_with_report<T>(
        &self,
        op: impl FnOnce(&TokenCache) -> CacheResult<T>,
    ) -> CacheResult<(T, LoadReport)> {
        let report = self.hooks.on_before_access(&self.cache)?;
        let result = op(&self.cache);
        let persisted = self.hooks.on_after_access(&self.cache);

        match (result, persisted) {
            (Ok(value), Ok(_)) => Ok((value, report)),
            (Ok(_), Err(persist)) => Err(persist),
            (Err(operation), Ok(_)) => Err(operation),
            (Err(operation), Err(persist)) => Err(CacheError::OperationAndPersist {
                operation: Box::new(operation),
                persist: Box::new(persist),
            }),
        }
    }

    /// Load, then write every enabled format even if nothing changed.
    ///
    /// Used to migrate older files into the newer formats. An empty cache
    /// with no files on disk is left alone.
    pub fn force_persist(&self) -> CacheResult<(LoadReport, PersistOutcome)> {
        let report = self.hooks.on_before_access(&self.cache)?;
        if report.disk_state == DiskState::None && self.cache.is_empty() {
            debug!("Nothing on disk or in memory, skipping forced write");
            return Ok((report, PersistOutcome::Skipped));
        }
        self.cache.mark_changed();
        let outcome = self.hooks.on_after_access(&self.cache)?;
        Ok((report, outcome))
    }
}

impl CacheHandle<PersistentCache> {
    pub fn persistent(
        formats: FormatSet,
        policy: MigrationPolicy,
        store: Arc<dyn ByteStore>,
    ) -> CacheResult<Self> {
        Ok(Self::new(PersistentCache::new(formats, policy, store)?))
    }

    /// Delete all configured files and reset the cache to empty.
    ///
    /// Files that are already gone are skipped.
    pub fn clear(&self) -> CacheResult<Vec<FormatKind>> {
        self.hooks.clear(&self.cache)
    }
}
