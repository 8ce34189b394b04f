//! Disk-backed blob store for the sequence cache.
//!
//! Payloads are addressed by `(key, version, subkey)`. Small payloads are
//! kept inline in an embedded ordered key-value store; payloads larger than
//! the inline threshold spill to one overflow file each under the store
//! root. Every entry carries an [`AttributeRecord`] with its last access
//! time and overflow flag, which drives eviction.
//!
//! # Components
//!
//! - [`BlobStore`] -- the engine: store, load, remove, purge
//! - [`BlobWriter`] / [`BlobReader`] -- scoped write and read streams
//! - [`KvBackend`] -- capability trait over the key-value engine, with
//!   [`RedbBackend`] (persistent) and [`InMemoryBackend`] (tests, embedding)
//! - [`StoreConfig`] -- TOML-loadable settings
//! - [`Clock`] -- access-time source
//!
//! # Rules
//!
//! 1. A reader never observes a partially written entry.
//! 2. Inline row and overflow file of one entry never coexist.
//! 3. Mutations are serialized through one store-wide lock.
//! 4. A missing or undecodable entry is a miss, not an error.

pub mod backend;
pub mod clock;
pub mod config;
pub mod entry;
pub mod error;
pub mod memory;
pub mod overflow;
pub mod purge;
pub mod redb_backend;
pub mod store;
pub mod stream;

pub use backend::{KvBackend, Table};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{KeepVersions, StoreConfig};
pub use entry::{AttributeRecord, EntryKey};
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryBackend;
pub use purge::PurgeReport;
pub use redb_backend::RedbBackend;
pub use store::{BlobStore, StoreStats};
pub use stream::{BlobReader, BlobWriter};
