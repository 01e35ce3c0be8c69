//! tokencache - encrypted multi-format credential cache
//!
//! Keeps an in-memory token cache in step with up to three on-disk formats
//! (legacy binary, unified v1 and unified v2 JSON), sealing every file for the
//! current user and migrating older files forward as the cache is written.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokencache::codec::{CacheEntry, EntryKind, FormatSet};
//! use tokencache::store::{DataProtector, ProtectedFileStore};
//! use tokencache::{CacheHandle, MigrationPolicy};
//!
//! # fn main() -> tokencache::CacheResult<()> {
//! let folder = std::path::Path::new("/var/lib/app/tokens");
//! let protector = DataProtector::for_current_user(&folder.join(".protect.key"))?;
//! let cache = CacheHandle::persistent(
//!     FormatSet::in_folder(folder),
//!     MigrationPolicy::new(true),
//!     Arc::new(ProtectedFileStore::new(protector)),
//! )?;
//!
//! cache.access(|tokens| {
//!     tokens.insert("rt-1", CacheEntry::new(EntryKind::RefreshToken, "secret"));
//!     Ok(())
//! })?;
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod bridge;
pub mod cache;
pub mod cli;
pub mod codec;
pub mod config;
pub mod error;
pub mod policy;
pub mod store;
pub mod sync;

pub use bridge::{CacheAccessHooks, CacheHandle, LoadReport, PersistOutcome, PersistentCache};
pub use cache::TokenCache;
pub use error::{CacheError, CacheResult};
pub use policy::{CorruptPolicy, DiskState, MigrationPolicy};
