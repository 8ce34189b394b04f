//! The [`KvBackend`] capability trait over the embedded ordered store.
//!
//! The blob store needs four things from its key-value engine: point lookup,
//! insert/update, delete, and an ordered prefix scan. Any engine providing
//! them can sit underneath [`BlobStore`](crate::BlobStore).

use crate::error::StoreResult;

/// Logical tables kept by the blob store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Table {
    /// Per-entry attribute rows (version, last access, overflow flag).
    Attributes,
    /// Inline payload bytes.
    Payloads,
}

impl Table {
    /// Both tables.
    pub const ALL: [Table; 2] = [Table::Attributes, Table::Payloads];

    /// Stable table name used by persistent backends.
    pub const fn name(&self) -> &'static str {
        match self {
            Table::Attributes => "entry_attributes",
            Table::Payloads => "entry_payloads",
        }
    }
}

/// Ordered key-value engine underneath the blob store.
///
/// Keys are compared as raw bytes. Implementations must be thread-safe; the
/// blob store additionally serializes every mutation through its own lock,
/// so backends need not coordinate multi-call sequences themselves.
pub trait KvBackend: Send + Sync {
    /// Read a value. Returns `Ok(None)` if the key does not exist.
    fn get(&self, table: Table, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    /// Insert or replace a value.
    fn put(&self, table: Table, key: &[u8], value: &[u8]) -> StoreResult<()>;

    /// Delete a value. Returns `true` if the key existed.
    fn delete(&self, table: Table, key: &[u8]) -> StoreResult<bool>;

    /// All entries whose key starts with `prefix`, in ascending key order.
    ///
    /// Pass an empty prefix for a full table scan.
    fn scan_prefix(&self, table: Table, prefix: &[u8]) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Remove every entry of a table.
    fn truncate(&self, table: Table) -> StoreResult<()>;

    /// Length of a value without handing it to the caller.
    ///
    /// Default implementation reads the value. Backends may override when
    /// the engine can answer from metadata.
    fn value_len(&self, table: Table, key: &[u8]) -> StoreResult<Option<u64>> {
        Ok(self.get(table, key)?.map(|v| v.len() as u64))
    }
}

/// Smallest key strictly greater than every key starting with `prefix`.
///
/// Returns `None` when no such bound exists (empty or all-`0xFF` prefix),
/// in which case a scan is unbounded above.
pub(crate) fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut bound = prefix.to_vec();
    while let Some(last) = bound.pop() {
        if last < u8::MAX {
            bound.push(last + 1);
            return Some(bound);
        }
    }
    None
}
