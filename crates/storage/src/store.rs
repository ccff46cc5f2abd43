use std::path::Path;

use crate::consistency::Consistency;
use crate::error::{Result, StorageError};
use crate::ipc::IpcStore;
use crate::memory::MemoryStore;
use crate::schema::{PreparedWrite, TableDescriptor, WriteTemplate};
use crate::value::{Row, Value};

/// Lazy, single-pass sequence of rows from a full table scan.
pub type RowIter<'a> = Box<dyn Iterator<Item = Result<Row>> + 'a>;

pub const MEMORY_ENDPOINT: &str = "memory://";

/// The narrow interface the pipeline needs from a replicated column store.
///
/// Every call blocks until the store answers. Writes are upserts keyed by
/// the table's primary key, so replaying a write is harmless.
pub trait Store: Send + Sync {
    fn namespace(&self) -> &str;

    /// Create the namespace if absent. Idempotent; must precede
    /// [`Store::ensure_schema`].
    fn ensure_namespace(&self, replication_factor: u32) -> Result<()>;

    /// Create the table if absent. An existing table with a different
    /// descriptor is a schema error.
    fn ensure_schema(&self, table: &TableDescriptor) -> Result<()>;

    /// Full, unordered scan.
    fn scan_all(&self, table: &str) -> Result<RowIter<'_>>;

    /// Check a write template once so it can be bound many times.
    fn prepare(&self, template: &WriteTemplate) -> Result<PreparedWrite>;

    /// Apply `rows` (bound positionally to the prepared columns) as one unit.
    fn execute_batch(
        &self,
        write: &PreparedWrite,
        rows: Vec<Vec<Value>>,
        consistency: Consistency,
    ) -> Result<()>;

    /// Remove rows by full primary key. Missing keys are ignored.
    fn delete_keys(
        &self,
        table: &str,
        keys: Vec<Vec<Value>>,
        consistency: Consistency,
    ) -> Result<()>;
}

/// Open the store named by `endpoint`: `memory://` for an in-process store,
/// otherwise a directory holding one subdirectory per namespace.
pub fn connect(endpoint: &str, namespace: &str) -> Result<Box<dyn Store>> {
    if namespace.is_empty() || namespace.contains(['/', '\\']) {
        return Err(StorageError::schema(
            namespace,
            "namespace must be a non-empty plain name",
        ));
    }
    if endpoint == MEMORY_ENDPOINT {
        tracing::debug!(namespace, "connecting to in-memory store");
        return Ok(Box::new(MemoryStore::new(namespace)));
    }
    let root = Path::new(endpoint);
    tracing::debug!(endpoint, namespace, "connecting to ipc store");
    Ok(Box::new(IpcStore::open(root, namespace)?))
}

pub(crate) fn check_acks(
    table: &str,
    consistency: Consistency,
    replication_factor: u32,
    live: u32,
) -> Result<()> {
    let required = consistency.required_acks(replication_factor);
    if live < required {
        return Err(StorageError::Unavailable {
            table: table.to_string(),
            level: consistency.to_string(),
            required,
            live,
        });
    }
    Ok(())
}

pub(crate) fn check_key_arity(table: &TableDescriptor, keys: &[Vec<Value>]) -> Result<()> {
    let arity = table.primary_key().count();
    match keys.iter().find(|k| k.len() != arity) {
        Some(k) => Err(StorageError::write(
            &table.name,
            format!("key has {} components, table key has {arity}", k.len()),
        )),
        None => Ok(()),
    }
}
