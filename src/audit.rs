//! Audit trail for cache persistence
//!
//! The persistence bridge reports what it did to disk through an
//! [`AuditSink`]: writes, forward migrations, files it discarded or could not
//! parse, and clears. Hosts add entry-level events through the same sink.
//!
//! [`AuditLog`] appends one JSON line per event to the state dir
//! (`~/.local/state/tokencache/audit.log` on Linux). Events carry keys, kinds
//! and formats, never secrets.

use crate::codec::{EntryKind, FormatKind};
use crate::config::{schema::Config, ConfigManager};
use crate::policy::DiskState;
use chrono::Utc;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Something that happened to a cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    EntryAdded {
        key: String,
        kind: EntryKind,
        replaced: bool,
    },
    EntryRemoved {
        key: String,
        kind: EntryKind,
    },
    /// Formats rewritten with the current state
    Persisted {
        formats: Vec<FormatKind>,
        entries: usize,
    },
    /// A write created formats newer than anything that was on disk
    Migrated {
        from: Vec<FormatKind>,
        to: Vec<FormatKind>,
        entries: usize,
    },
    /// A file that could not be decrypted was ignored
    FormatDiscarded { format: FormatKind },
    /// A file decrypted but did not parse
    FormatMalformed { format: FormatKind },
    Cleared { deleted: Vec<FormatKind> },
}

impl AuditEvent {
    /// Classify a completed write given what was on disk before it
    pub fn for_write(before: &DiskState, written: &[FormatKind], entries: usize) -> Self {
        let from = before.present();
        let newest_before = from.iter().map(FormatKind::precedence).max();
        let created: Vec<FormatKind> = written
            .iter()
            .copied()
            .filter(|f| !from.contains(f))
            .filter(|f| newest_before.is_some_and(|newest| f.precedence() > newest))
            .collect();

        if created.is_empty() {
            Self::Persisted {
                formats: written.to_vec(),
                entries,
            }
        } else {
            Self::Migrated {
                from,
                to: created,
                entries,
            }
        }
    }
}

/// Receives audit events from the persistence bridge
pub trait AuditSink: Send + Sync {
    /// Record one event. Must not fail the cache operation that caused it.
    fn record(&self, event: &AuditEvent);
}

#[derive(Serialize)]
struct AuditRecord<'a> {
    timestamp: String,
    folder: &'a Path,
    #[serde(flatten)]
    event: &'a AuditEvent,
}

/// Appends audit events for one cache folder as JSON lines
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
    folder: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>, folder: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            folder: folder.into(),
        }
    }

    /// Audit log for `folder` at the default location, or `None` when
    /// `general.audit_log` is off
    pub fn from_config(config: &Config, folder: &Path) -> Option<Self> {
        config
            .general
            .audit_log
            .then(|| Self::new(ConfigManager::audit_log_path(), folder))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.flush()
    }
}

impl AuditSink for AuditLog {
    fn record(&self, event: &AuditEvent) {
        let record = AuditRecord {
            timestamp: Utc::now().to_rfc3339(),
            folder: &self.folder,
            event,
        };

        let mut line = match serde_json::to_string(&record) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to serialize audit event: {}", e);
                return;
            }
        };
        line.push('\n');

        if let Err(e) = self.append(&line) {
            warn!("Failed to write audit log {}: {}", self.path.display(), e);
        }
    }
}
