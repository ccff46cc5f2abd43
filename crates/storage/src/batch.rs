use crate::consistency::Consistency;
use crate::error::{Result, StorageError};
use crate::schema::{PreparedWrite, WriteTemplate};
use crate::store::Store;
use crate::value::Value;

pub const DEFAULT_BATCH_SIZE: usize = 100;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteStats {
    pub rows_written: u64,
    pub batches: u64,
}

/// Buffers rows for one prepared write and submits them in fixed-size
/// batches. Every pushed row is submitted exactly once; [`BatchWriter::finish`]
/// flushes the last, possibly short, batch. A failed batch is returned to the
/// caller as is, nothing is retried.
pub struct BatchWriter<'a> {
    store: &'a dyn Store,
    prepared: PreparedWrite,
    batch_size: usize,
    consistency: Consistency,
    pending: Vec<Vec<Value>>,
    stats: WriteStats,
}

impl<'a> BatchWriter<'a> {
    pub fn new(
        store: &'a dyn Store,
        template: &WriteTemplate,
        batch_size: usize,
        consistency: Consistency,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(StorageError::write(&template.table, "batch size must be at least 1"));
        }
        let prepared = store.prepare(template)?;
        Ok(Self {
            store,
            prepared,
            batch_size,
            consistency,
            pending: Vec::with_capacity(batch_size),
            stats: WriteStats::default(),
        })
    }

    pub fn table(&self) -> &str {
        self.prepared.table()
    }

    pub fn push(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.prepared.arity() {
            return Err(StorageError::write(
                self.prepared.table(),
                format!("expected {} values, got {}", self.prepared.arity(), row.len()),
            ));
        }
        self.pending.push(row);
        if self.pending.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let batch = std::mem::replace(&mut self.pending, Vec::with_capacity(self.batch_size));
        let n = batch.len() as u64;
        self.store
            .execute_batch(&self.prepared, batch, self.consistency)?;
        self.stats.rows_written += n;
        self.stats.batches += 1;
        tracing::debug!(
            table = self.prepared.table(),
            rows = n,
            total = self.stats.rows_written,
            "batch flushed"
        );
        Ok(())
    }

    pub fn finish(mut self) -> Result<WriteStats> {
        self.flush()?;
        Ok(self.stats)
    }

    /// Push every row, then finish.
    pub fn write_all<I>(mut self, rows: I) -> Result<WriteStats>
    where
        I: IntoIterator<Item = Vec<Value>>,
    {
        for row in rows {
            self.push(row)?;
        }
        self.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::schema::TableDescriptor;
    use crate::value::ColumnType;

    fn store() -> MemoryStore {
        let s = MemoryStore::new("ks");
        s.ensure_namespace(1).unwrap();
        s.ensure_schema(
            &TableDescriptor::new("t")
                .column("id", ColumnType::BigInt)
                .column("v", ColumnType::Int)
                .partition_key(&["id"]),
        )
        .unwrap();
        s
    }

    fn rows(n: i64) -> impl Iterator<Item = Vec<Value>> {
        (0..n).map(|i| vec![Value::BigInt(i), Value::Int(i as i32)])
    }

    #[test]
    fn partial_last_batch_is_flushed() {
        let s = store();
        let w = BatchWriter::new(&s, &WriteTemplate::new("t", &["id", "v"]), 100, Consistency::Quorum)
            .unwrap();
        let stats = w.write_all(rows(250)).unwrap();
        assert_eq!(stats, WriteStats { rows_written: 250, batches: 3 });
        assert_eq!(s.row_count("t"), Some(250));
    }

    #[test]
    fn exact_multiple_has_no_empty_trailing_batch() {
        let s = store();
        let w = BatchWriter::new(&s, &WriteTemplate::new("t", &["id", "v"]), 10, Consistency::One)
            .unwrap();
        let stats = w.write_all(rows(30)).unwrap();
        assert_eq!(stats.batches, 3);
    }

    #[test]
    fn empty_input_writes_nothing() {
        let s = store();
        let w = BatchWriter::new(&s, &WriteTemplate::new("t", &["id", "v"]), 10, Consistency::One)
            .unwrap();
        assert_eq!(w.write_all(rows(0)).unwrap(), WriteStats::default());
        assert_eq!(s.row_count("t"), Some(0));
    }

    #[test]
    fn failed_batch_propagates() {
        let s = store();
        s.fail_writes_after(1);
        let w = BatchWriter::new(&s, &WriteTemplate::new("t", &["id", "v"]), 10, Consistency::One)
            .unwrap();
        let err = w.write_all(rows(25)).unwrap_err();
        assert!(matches!(err, StorageError::Write { .. }));
        assert_eq!(s.row_count("t"), Some(10));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let s = store();
        assert!(
            BatchWriter::new(&s, &WriteTemplate::new("t", &["id", "v"]), 0, Consistency::One).is_err()
        );
    }
}
