use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::consistency::Consistency;
use crate::error::{Result, StorageError};
use crate::schema::{PreparedWrite, TableDescriptor, WriteTemplate};
use crate::store::{check_acks, check_key_arity, RowIter, Store};
use crate::value::{Row, Value};

/// In-process store. Rows live in an ordered map per table keyed by primary
/// key; the replication factor is bookkeeping only, but the live replica
/// count can be lowered to exercise unavailable-replica failures.
pub struct MemoryStore {
    namespace: String,
    state: RwLock<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    replication_factor: Option<u32>,
    live_replicas: Option<u32>,
    tables: HashMap<String, MemoryTable>,
    batches_until_failure: Option<usize>,
    rows_until_scan_failure: Option<usize>,
}

struct MemoryTable {
    descriptor: TableDescriptor,
    name: Arc<str>,
    columns: Arc<[String]>,
    key_positions: Vec<usize>,
    rows: BTreeMap<Vec<Value>, Vec<Value>>,
}

impl MemoryStore {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            state: RwLock::new(MemoryState::default()),
        }
    }

    /// Replicas answering writes. Defaults to the replication factor.
    pub fn set_live_replicas(&self, live: u32) {
        self.state.write().live_replicas = Some(live);
    }

    /// Let `batches` more batches succeed, then fail every write.
    pub fn fail_writes_after(&self, batches: usize) {
        self.state.write().batches_until_failure = Some(batches);
    }

    /// Fail any scan that reaches its `rows`-th row. Scans of smaller tables
    /// are unaffected.
    pub fn fail_scans_after(&self, rows: usize) {
        self.state.write().rows_until_scan_failure = Some(rows);
    }

    pub fn row_count(&self, table: &str) -> Option<usize> {
        self.state.read().tables.get(table).map(|t| t.rows.len())
    }

    fn live(state: &MemoryState, rf: u32) -> u32 {
        state.live_replicas.unwrap_or(rf)
    }

    fn consume_write_budget(state: &mut MemoryState, table: &str) -> Result<()> {
        match state.batches_until_failure.as_mut() {
            Some(0) => Err(StorageError::write(table, "write timed out (injected)")),
            Some(n) => {
                *n -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Store for MemoryStore {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn ensure_namespace(&self, replication_factor: u32) -> Result<()> {
        if replication_factor == 0 {
            return Err(StorageError::schema(
                &self.namespace,
                "replication factor must be at least 1",
            ));
        }
        let mut st = self.state.write();
        if st.replication_factor.is_none() {
            st.replication_factor = Some(replication_factor);
        }
        Ok(())
    }

    fn ensure_schema(&self, table: &TableDescriptor) -> Result<()> {
        table.validate()?;
        let mut st = self.state.write();
        if st.replication_factor.is_none() {
            return Err(StorageError::schema(
                &table.name,
                format!("namespace {} does not exist", self.namespace),
            ));
        }
        if let Some(existing) = st.tables.get(&table.name) {
            if existing.descriptor != *table {
                return Err(StorageError::schema(
                    &table.name,
                    "table exists with a different definition",
                ));
            }
            return Ok(());
        }
        st.tables.insert(
            table.name.clone(),
            MemoryTable {
                descriptor: table.clone(),
                name: Arc::from(table.name.as_str()),
                columns: table.column_names(),
                key_positions: table.key_positions()?,
                rows: BTreeMap::new(),
            },
        );
        Ok(())
    }

    fn scan_all(&self, table: &str) -> Result<RowIter<'_>> {
        let st = self.state.read();
        let t = st.tables.get(table).ok_or_else(|| StorageError::UnknownTable {
            table: table.to_string(),
        })?;
        let snapshot: Vec<Vec<Value>> = t.rows.values().cloned().collect();
        let name = t.name.clone();
        let columns = t.columns.clone();
        let fail_after = st.rows_until_scan_failure;
        drop(st);

        let rows = snapshot.into_iter().enumerate().map(move |(i, values)| {
            if fail_after.is_some_and(|limit| i >= limit) {
                return Err(StorageError::read(name.as_ref(), "scan timed out (injected)"));
            }
            Ok(Row::new(name.clone(), columns.clone(), values))
        });
        Ok(Box::new(rows))
    }

    fn prepare(&self, template: &WriteTemplate) -> Result<PreparedWrite> {
        let st = self.state.read();
        let t = st
            .tables
            .get(&template.table)
            .ok_or_else(|| StorageError::UnknownTable {
                table: template.table.clone(),
            })?;
        PreparedWrite::compile(&t.descriptor, template)
    }

    fn execute_batch(
        &self,
        write: &PreparedWrite,
        rows: Vec<Vec<Value>>,
        consistency: Consistency,
    ) -> Result<()> {
        let mut st = self.state.write();
        let rf = st.replication_factor.unwrap_or(1);
        check_acks(write.table(), consistency, rf, Self::live(&st, rf))?;
        Self::consume_write_budget(&mut st, write.table())?;

        let t = st
            .tables
            .get_mut(write.table())
            .ok_or_else(|| StorageError::UnknownTable {
                table: write.table().to_string(),
            })?;
        // Bind everything before touching the table so a bad row leaves the
        // whole batch unapplied.
        let bound = rows
            .into_iter()
            .map(|r| write.bind(r))
            .collect::<Result<Vec<_>>>()?;
        for values in bound {
            let key = t.descriptor.key_of(&t.key_positions, &values);
            t.rows.insert(key, values);
        }
        Ok(())
    }

    fn delete_keys(
        &self,
        table: &str,
        keys: Vec<Vec<Value>>,
        consistency: Consistency,
    ) -> Result<()> {
        let mut st = self.state.write();
        let rf = st.replication_factor.unwrap_or(1);
        check_acks(table, consistency, rf, Self::live(&st, rf))?;
        Self::consume_write_budget(&mut st, table)?;
        let t = st
            .tables
            .get_mut(table)
            .ok_or_else(|| StorageError::UnknownTable {
                table: table.to_string(),
            })?;
        check_key_arity(&t.descriptor, &keys)?;
        for k in keys {
            t.rows.remove(&k);
        }
        Ok(())
    }
}
