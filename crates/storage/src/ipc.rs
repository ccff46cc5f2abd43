//! Directory-backed store.
//!
//! Layout under `<endpoint>/<namespace>/`:
//!
//! ```text
//! _namespace.json
//! <table>/_table.json
//! <table>/part-000000.arrow
//! <table>/part-000001.arrow
//! ```
//!
//! Each committed batch becomes one Arrow IPC part file, written to a `.tmp`
//! sibling and renamed into place so a batch is visible whole or not at all.
//! Part files carry a `_deleted` flag column. Scans replay parts in sequence
//! order and keep the last version of every primary key. Once a table has
//! more than [`COMPACT_AFTER_PARTS`] parts, a scan rewrites the live rows as
//! a single part and removes the older ones.
//!
//! Decimals are stored as their exact decimal text, so every value a
//! `rust_decimal::Decimal` can hold comes back with the same digits and scale.

use arrow::array::{
    Array, ArrayRef, BooleanArray, Int32Array, Int32Builder, Int64Array, Int64Builder,
    StringArray, StringBuilder, TimestampMillisecondArray, TimestampMillisecondBuilder,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::ipc::reader::FileReader as IpcReader;
use arrow::ipc::writer::FileWriter as IpcWriter;
use arrow::record_batch::RecordBatch;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::{OffsetDateTime, PrimitiveDateTime};

use crate::consistency::Consistency;
use crate::error::{Result, StorageError};
use crate::schema::{PreparedWrite, TableDescriptor, WriteTemplate};
use crate::store::{check_acks, check_key_arity, RowIter, Store};
use crate::value::{ColumnType, Row, Value};

const NAMESPACE_FILE: &str = "_namespace.json";
const TABLE_FILE: &str = "_table.json";
const DELETED_COLUMN: &str = "_deleted";
pub const COMPACT_AFTER_PARTS: usize = 8;

#[derive(Debug, Serialize, Deserialize)]
struct NamespaceMeta {
    name: String,
    replication_factor: u32,
}

pub struct IpcStore {
    namespace: String,
    dir: PathBuf,
    state: Mutex<IpcState>,
}

#[derive(Default)]
struct IpcState {
    replication_factor: Option<u32>,
    tables: HashMap<String, IpcTable>,
}

struct IpcTable {
    descriptor: TableDescriptor,
    name: Arc<str>,
    columns: Arc<[String]>,
    key_positions: Vec<usize>,
    schema: SchemaRef,
    dir: PathBuf,
    next_part: u64,
}

impl IpcStore {
    /// Open `<root>/<namespace>`. Nothing is created until
    /// [`Store::ensure_namespace`] runs.
    pub fn open(root: &Path, namespace: &str) -> Result<Self> {
        let dir = root.join(namespace);
        let mut state = IpcState::default();
        let meta_path = dir.join(NAMESPACE_FILE);
        if meta_path.exists() {
            let txt = fs::read_to_string(&meta_path).map_err(|e| StorageError::io(namespace, e))?;
            let meta: NamespaceMeta = serde_json::from_str(&txt).map_err(|e| {
                StorageError::schema(namespace, format!("corrupt {}: {e}", meta_path.display()))
            })?;
            state.replication_factor = Some(meta.replication_factor);
        }
        Ok(Self {
            namespace: namespace.to_string(),
            dir,
            state: Mutex::new(state),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load a table definition from disk into the cache if it exists there.
    fn load_table<'a>(&self, st: &'a mut IpcState, name: &str) -> Result<Option<&'a mut IpcTable>> {
        if !st.tables.contains_key(name) {
            let dir = self.dir.join(name);
            let def_path = dir.join(TABLE_FILE);
            if !def_path.exists() {
                return Ok(None);
            }
            let txt = fs::read_to_string(&def_path).map_err(|e| StorageError::io(name, e))?;
            let descriptor: TableDescriptor = serde_json::from_str(&txt).map_err(|e| {
                StorageError::schema(name, format!("corrupt {}: {e}", def_path.display()))
            })?;
            let next_part = list_parts(name, &dir)?
                .last()
                .map_or(0, |(seq, _)| seq + 1);
            st.tables
                .insert(name.to_string(), IpcTable::new(descriptor, dir, next_part)?);
        }
        Ok(st.tables.get_mut(name))
    }

    fn live_replicas(&self) -> u32 {
        1
    }
}

impl IpcTable {
    fn new(descriptor: TableDescriptor, dir: PathBuf, next_part: u64) -> Result<Self> {
        descriptor.validate()?;
        Ok(Self {
            name: Arc::from(descriptor.name.as_str()),
            columns: descriptor.column_names(),
            key_positions: descriptor.key_positions()?,
            schema: arrow_schema(&descriptor),
            descriptor,
            dir,
            next_part,
        })
    }

    /// Write `rows` (in table column order) as the next part file.
    fn append_part(&mut self, rows: &[Vec<Value>], deleted: bool) -> Result<PathBuf> {
        let batch = encode_batch(self, rows, deleted)?;
        let final_path = self.dir.join(format!("part-{:06}.arrow", self.next_part));
        let tmp_path = self.dir.join(format!("part-{:06}.arrow.tmp", self.next_part));
        let file = File::create(&tmp_path).map_err(|e| StorageError::io(&*self.name, e))?;
        let mut writer = IpcWriter::try_new(file, &self.schema)
            .map_err(|e| StorageError::arrow(&*self.name, e))?;
        writer
            .write(&batch)
            .map_err(|e| StorageError::arrow(&*self.name, e))?;
        writer
            .finish()
            .map_err(|e| StorageError::arrow(&*self.name, e))?;
        let file = writer
            .into_inner()
            .map_err(|e| StorageError::arrow(&*self.name, e))?;
        file.sync_all().map_err(|e| StorageError::io(&*self.name, e))?;
        fs::rename(&tmp_path, &final_path).map_err(|e| StorageError::io(&*self.name, e))?;
        self.next_part += 1;
        Ok(final_path)
    }

    /// Replay every part and keep the latest version of each key. Also
    /// returns the parts that were replayed.
    fn merged_rows(&self) -> Result<(BTreeMap<Vec<Value>, Vec<Value>>, Vec<(u64, PathBuf)>)> {
        let mut merged: BTreeMap<Vec<Value>, Vec<Value>> = BTreeMap::new();
        let parts = list_parts(&self.name, &self.dir)?;
        for (_, path) in &parts {
            let f = File::open(&path).map_err(|e| {
                StorageError::read(&*self.name, format!("open {}: {e}", path.display()))
            })?;
            let reader = IpcReader::try_new(f, None)
                .map_err(|e| StorageError::read(&*self.name, format!("{}: {e}", path.display())))?;
            for maybe_batch in reader {
                let batch = maybe_batch.map_err(|e| {
                    StorageError::read(&*self.name, format!("{}: {e}", path.display()))
                })?;
                for (values, deleted) in decode_batch(self, &batch)? {
                    let key = self.descriptor.key_of(&self.key_positions, &values);
                    if deleted {
                        merged.remove(&key);
                    } else {
                        merged.insert(key, values);
                    }
                }
            }
        }
        Ok((merged, parts))
    }

    /// Replace `replayed` with one part holding `live`. The new part is
    /// committed first and old parts are removed oldest first, so a crash at
    /// any point leaves a directory that still replays to `live`.
    fn compact(
        &mut self,
        live: &BTreeMap<Vec<Value>, Vec<Value>>,
        replayed: &[(u64, PathBuf)],
    ) -> Result<()> {
        if !live.is_empty() {
            let rows: Vec<Vec<Value>> = live.values().cloned().collect();
            self.append_part(&rows, false)?;
        }
        for (_, path) in replayed {
            fs::remove_file(path).map_err(|e| StorageError::io(&*self.name, e))?;
        }
        tracing::debug!(
            table = %self.name,
            parts = replayed.len(),
            rows = live.len(),
            "compacted table parts"
        );
        Ok(())
    }
}

impl Store for IpcStore {
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
        let mut st = self.state.lock();
        if st.replication_factor.is_some() {
            return Ok(());
        }
        fs::create_dir_all(&self.dir).map_err(|e| StorageError::io(&self.namespace, e))?;
        let meta = NamespaceMeta {
            name: self.namespace.clone(),
            replication_factor,
        };
        write_json_atomic(&self.namespace, &self.dir.join(NAMESPACE_FILE), &meta)?;
        st.replication_factor = Some(replication_factor);
        tracing::info!(namespace = %self.namespace, replication_factor, "namespace created");
        Ok(())
    }

    fn ensure_schema(&self, table: &TableDescriptor) -> Result<()> {
        table.validate()?;
        let mut st = self.state.lock();
        if st.replication_factor.is_none() {
            return Err(StorageError::schema(
                &table.name,
                format!("namespace {} does not exist", self.namespace),
            ));
        }
        if let Some(existing) = self.load_table(&mut st, &table.name)? {
            if existing.descriptor != *table {
                return Err(StorageError::schema(
                    &table.name,
                    "table exists with a different definition",
                ));
            }
            return Ok(());
        }
        let dir = self.dir.join(&table.name);
        fs::create_dir_all(&dir).map_err(|e| StorageError::io(&table.name, e))?;
        write_json_atomic(&table.name, &dir.join(TABLE_FILE), table)?;
        st.tables
            .insert(table.name.clone(), IpcTable::new(table.clone(), dir, 0)?);
        tracing::info!(table = %table.name, "table created");
        Ok(())
    }

    fn scan_all(&self, table: &str) -> Result<RowIter<'_>> {
        let mut st = self.state.lock();
        let t = self
            .load_table(&mut st, table)?
            .ok_or_else(|| StorageError::UnknownTable {
                table: table.to_string(),
            })?;
        let (merged, parts) = t.merged_rows()?;
        if parts.len() > COMPACT_AFTER_PARTS {
            t.compact(&merged, &parts)?;
        }
        let name = t.name.clone();
        let columns = t.columns.clone();
        Ok(Box::new(merged.into_values().map(move |values| {
            Ok(Row::new(name.clone(), columns.clone(), values))
        })))
    }

    fn prepare(&self, template: &WriteTemplate) -> Result<PreparedWrite> {
        let mut st = self.state.lock();
        let t = self
            .load_table(&mut st, &template.table)?
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
        let mut st = self.state.lock();
        let rf = st.replication_factor.unwrap_or(1);
        check_acks(write.table(), consistency, rf, self.live_replicas())?;
        let t = self
            .load_table(&mut st, write.table())?
            .ok_or_else(|| StorageError::UnknownTable {
                table: write.table().to_string(),
            })?;
        let bound = rows
            .into_iter()
            .map(|r| write.bind(r))
            .collect::<Result<Vec<_>>>()?;
        if bound.is_empty() {
            return Ok(());
        }
        let path = t.append_part(&bound, false)?;
        tracing::debug!(table = %t.name, rows = bound.len(), part = %path.display(), "batch committed");
        Ok(())
    }

    fn delete_keys(
        &self,
        table: &str,
        keys: Vec<Vec<Value>>,
        consistency: Consistency,
    ) -> Result<()> {
        let mut st = self.state.lock();
        let rf = st.replication_factor.unwrap_or(1);
        check_acks(table, consistency, rf, self.live_replicas())?;
        let t = self
            .load_table(&mut st, table)?
            .ok_or_else(|| StorageError::UnknownTable {
                table: table.to_string(),
            })?;
        check_key_arity(&t.descriptor, &keys)?;
        if keys.is_empty() {
            return Ok(());
        }
        let width = t.descriptor.columns.len();
        let tombstones: Vec<Vec<Value>> = keys
            .into_iter()
            .map(|key| {
                let mut values = vec![Value::Null; width];
                for (&pos, v) in t.key_positions.iter().zip(key) {
                    values[pos] = v;
                }
                values
            })
            .collect();
        t.append_part(&tombstones, true)?;
        Ok(())
    }
}

// ---------- files

fn list_parts(table: &str, dir: &Path) -> Result<Vec<(u64, PathBuf)>> {
    let mut parts = Vec::new();
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(parts),
        Err(e) => return Err(StorageError::io(table, e)),
    };
    for entry in entries {
        let entry = entry.map_err(|e| StorageError::io(table, e))?;
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        let seq = name
            .strip_prefix("part-")
            .and_then(|s| s.strip_suffix(".arrow"))
            .and_then(|s| s.parse::<u64>().ok());
        if let Some(seq) = seq {
            parts.push((seq, entry.path()));
        }
    }
    parts.sort_by_key(|(seq, _)| *seq);
    Ok(parts)
}

fn write_json_atomic<T: Serialize>(table: &str, path: &Path, value: &T) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| StorageError::schema(table, format!("serialize {}: {e}", path.display())))?;
    {
        let mut out = File::create(&tmp).map_err(|e| StorageError::io(table, e))?;
        out.write_all(json.as_bytes())
            .map_err(|e| StorageError::io(table, e))?;
        out.flush().map_err(|e| StorageError::io(table, e))?;
    }
    fs::rename(&tmp, path).map_err(|e| StorageError::io(table, e))
}

// ---------- arrow codec

fn data_type(ty: ColumnType) -> DataType {
    match ty {
        ColumnType::Text => DataType::Utf8,
        ColumnType::Int => DataType::Int32,
        ColumnType::BigInt => DataType::Int64,
        ColumnType::Decimal => DataType::Utf8,
        ColumnType::Timestamp => DataType::Timestamp(TimeUnit::Millisecond, None),
    }
}

fn arrow_schema(descriptor: &TableDescriptor) -> SchemaRef {
    let mut fields: Vec<Field> = descriptor
        .columns
        .iter()
        .map(|c| Field::new(&c.name, data_type(c.ty), true))
        .collect();
    fields.push(Field::new(DELETED_COLUMN, DataType::Boolean, false));
    Arc::new(Schema::new(fields))
}

fn encode_batch(t: &IpcTable, rows: &[Vec<Value>], deleted: bool) -> Result<RecordBatch> {
    let n = rows.len();
    let mut cols: Vec<ArrayRef> = Vec::with_capacity(t.descriptor.columns.len() + 1);
    for (c, def) in t.descriptor.columns.iter().enumerate() {
        let cells = rows.iter().map(|r| &r[c]);
        let arr: ArrayRef = match def.ty {
            ColumnType::Text => {
                let mut b = StringBuilder::with_capacity(n, n * 16);
                for v in cells {
                    match v {
                        Value::Text(s) => b.append_value(s),
                        _ => b.append_null(),
                    }
                }
                Arc::new(b.finish())
            }
            ColumnType::Int => {
                let mut b = Int32Builder::with_capacity(n);
                for v in cells {
                    match v {
                        Value::Int(i) => b.append_value(*i),
                        _ => b.append_null(),
                    }
                }
                Arc::new(b.finish())
            }
            ColumnType::BigInt => {
                let mut b = Int64Builder::with_capacity(n);
                for v in cells {
                    match v {
                        Value::BigInt(i) => b.append_value(*i),
                        _ => b.append_null(),
                    }
                }
                Arc::new(b.finish())
            }
            ColumnType::Decimal => {
                let mut b = StringBuilder::with_capacity(n, n * 12);
                for v in cells {
                    match v {
                        Value::Decimal(d) => b.append_value(d.to_string()),
                        _ => b.append_null(),
                    }
                }
                Arc::new(b.finish())
            }
            ColumnType::Timestamp => {
                let mut b = TimestampMillisecondBuilder::with_capacity(n);
                for v in cells {
                    match v {
                        Value::Timestamp(ts) => b.append_value(timestamp_to_millis(*ts)),
                        _ => b.append_null(),
                    }
                }
                Arc::new(b.finish())
            }
        };
        cols.push(arr);
    }
    cols.push(Arc::new(BooleanArray::from(vec![deleted; n])));
    RecordBatch::try_new(t.schema.clone(), cols).map_err(|e| StorageError::arrow(&*t.name, e))
}

fn decode_batch(t: &IpcTable, batch: &RecordBatch) -> Result<Vec<(Vec<Value>, bool)>> {
    let n = batch.num_rows();
    let width = t.descriptor.columns.len();
    if batch.num_columns() != width + 1 {
        return Err(StorageError::read(
            &*t.name,
            format!("part has {} columns, table has {}", batch.num_columns(), width + 1),
        ));
    }
    let mut rows: Vec<Vec<Value>> = (0..n).map(|_| Vec::with_capacity(width)).collect();
    for (c, def) in t.descriptor.columns.iter().enumerate() {
        let arr = batch.column(c);
        let mismatch = || {
            StorageError::read(
                &*t.name,
                format!("column {} is not stored as {}", def.name, def.ty),
            )
        };
        match def.ty {
            ColumnType::Text => {
                let a = arr.as_any().downcast_ref::<StringArray>().ok_or_else(mismatch)?;
                for (row, out) in rows.iter_mut().enumerate() {
                    out.push(if a.is_null(row) {
                        Value::Null
                    } else {
                        Value::Text(a.value(row).to_string())
                    });
                }
            }
            ColumnType::Int => {
                let a = arr.as_any().downcast_ref::<Int32Array>().ok_or_else(mismatch)?;
                for (row, out) in rows.iter_mut().enumerate() {
                    out.push(if a.is_null(row) {
                        Value::Null
                    } else {
                        Value::Int(a.value(row))
                    });
                }
            }
            ColumnType::BigInt => {
                let a = arr.as_any().downcast_ref::<Int64Array>().ok_or_else(mismatch)?;
                for (row, out) in rows.iter_mut().enumerate() {
                    out.push(if a.is_null(row) {
                        Value::Null
                    } else {
                        Value::BigInt(a.value(row))
                    });
                }
            }
            ColumnType::Decimal => {
                let a = arr.as_any().downcast_ref::<StringArray>().ok_or_else(mismatch)?;
                for (row, out) in rows.iter_mut().enumerate() {
                    out.push(if a.is_null(row) {
                        Value::Null
                    } else {
                        Value::Decimal(decimal_from_text(&t.name, a.value(row))?)
                    });
                }
            }
            ColumnType::Timestamp => {
                let a = arr
                    .as_any()
                    .downcast_ref::<TimestampMillisecondArray>()
                    .ok_or_else(mismatch)?;
                for (row, out) in rows.iter_mut().enumerate() {
                    out.push(if a.is_null(row) {
                        Value::Null
                    } else {
                        Value::Timestamp(timestamp_from_millis(&t.name, a.value(row))?)
                    });
                }
            }
        }
    }
    let deleted = batch
        .column(width)
        .as_any()
        .downcast_ref::<BooleanArray>()
        .ok_or_else(|| StorageError::read(&*t.name, "missing _deleted flag column"))?;
    Ok(rows
        .into_iter()
        .enumerate()
        .map(|(row, values)| (values, deleted.value(row)))
        .collect())
}

fn decimal_from_text(table: &str, txt: &str) -> Result<Decimal> {
    Decimal::from_str_exact(txt)
        .map_err(|e| StorageError::read(table, format!("decimal {txt:?}: {e}")))
}

fn timestamp_to_millis(ts: PrimitiveDateTime) -> i64 {
    ts.assume_utc().unix_timestamp_nanos().div_euclid(1_000_000) as i64
}

fn timestamp_from_millis(table: &str, ms: i64) -> Result<PrimitiveDateTime> {
    let odt = OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000)
        .map_err(|e| StorageError::read(table, format!("timestamp {ms}: {e}")))?;
    Ok(PrimitiveDateTime::new(odt.date(), odt.time()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn decimal_text_keeps_digits_and_scale() {
        for d in [
            Decimal::new(-25528, 2),
            Decimal::new(123456789012, 12),
            Decimal::new(1, 12),
            Decimal::from_i128_with_scale(10_000_000_000_000_000_000, 0),
            Decimal::MAX,
            Decimal::MIN,
        ] {
            let back = decimal_from_text("t", &d.to_string()).unwrap();
            assert_eq!(back, d);
            assert_eq!(back.scale(), d.scale());
        }
    }

    #[test]
    fn unparseable_decimal_text_is_a_read_error() {
        let err = decimal_from_text("t", "12,5").unwrap_err();
        assert!(matches!(err, StorageError::Read { .. }));
    }

    #[test]
    fn naive_timestamps_do_not_shift() {
        let ts = datetime!(1969-12-31 23:59:59.5);
        let back = timestamp_from_millis("t", timestamp_to_millis(ts)).unwrap();
        assert_eq!(back, ts);
    }

    #[test]
    fn parts_are_listed_in_sequence_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["part-000010.arrow", "part-000002.arrow", "part-000003.arrow.tmp", "_table.json"] {
            File::create(dir.path().join(name)).unwrap();
        }
        let parts = list_parts("t", dir.path()).unwrap();
        let seqs: Vec<u64> = parts.iter().map(|(s, _)| *s).collect();
        assert_eq!(seqs, vec![2, 10]);
    }
}
