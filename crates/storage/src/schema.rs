use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{Result, StorageError};
use crate::value::{ColumnType, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ColumnType,
}

/// Name, columns and key structure of a table.
///
/// The primary key is the partition key followed by the clustering key.
/// Two rows with equal primary keys are the same row: a later write
/// replaces an earlier one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub partition_key: Vec<String>,
    #[serde(default)]
    pub clustering_key: Vec<String>,
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            partition_key: Vec::new(),
            clustering_key: Vec::new(),
        }
    }

    pub fn column(mut self, name: &str, ty: ColumnType) -> Self {
        self.columns.push(ColumnDef {
            name: name.to_string(),
            ty,
        });
        self
    }

    pub fn partition_key(mut self, cols: &[&str]) -> Self {
        self.partition_key = cols.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn clustering_key(mut self, cols: &[&str]) -> Self {
        self.clustering_key = cols.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn primary_key(&self) -> impl Iterator<Item = &str> {
        self.partition_key
            .iter()
            .chain(self.clustering_key.iter())
            .map(String::as_str)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column_names(&self) -> Arc<[String]> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Column positions of the primary key, in key order.
    pub fn key_positions(&self) -> Result<Vec<usize>> {
        self.primary_key()
            .map(|k| {
                self.column_index(k).ok_or_else(|| {
                    StorageError::schema(&self.name, format!("key column {k} is not declared"))
                })
            })
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(StorageError::schema("<unnamed>", "empty table name"));
        }
        if self.columns.is_empty() {
            return Err(StorageError::schema(&self.name, "no columns declared"));
        }
        if self.partition_key.is_empty() {
            return Err(StorageError::schema(&self.name, "empty partition key"));
        }
        let mut seen = HashSet::new();
        for c in &self.columns {
            if !seen.insert(c.name.as_str()) {
                return Err(StorageError::schema(
                    &self.name,
                    format!("duplicate column {}", c.name),
                ));
            }
        }
        let mut key_seen = HashSet::new();
        for k in self.primary_key() {
            if !key_seen.insert(k) {
                return Err(StorageError::schema(
                    &self.name,
                    format!("column {k} appears twice in the primary key"),
                ));
            }
        }
        self.key_positions().map(|_| ())
    }

    pub fn key_of(&self, positions: &[usize], values: &[Value]) -> Vec<Value> {
        positions.iter().map(|&i| values[i].clone()).collect()
    }
}

/// A parameterised write: target table plus the ordered column list that
/// bound rows will supply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteTemplate {
    pub table: String,
    pub columns: Vec<String>,
}

impl WriteTemplate {
    pub fn new(table: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            table: table.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// A template covering every column of `table`, in declaration order.
    pub fn for_table(table: &TableDescriptor) -> Self {
        Self {
            table: table.name.clone(),
            columns: table.columns.iter().map(|c| c.name.clone()).collect(),
        }
    }
}

/// A template checked once against the table descriptor, so per-row binding
/// is a positional copy plus a type check.
#[derive(Debug, Clone)]
pub struct PreparedWrite {
    table: String,
    /// For each template column: (table column index, declared type).
    slots: Vec<(usize, ColumnType)>,
    width: usize,
}

impl PreparedWrite {
    pub fn compile(descriptor: &TableDescriptor, template: &WriteTemplate) -> Result<Self> {
        if descriptor.name != template.table {
            return Err(StorageError::schema(
                &template.table,
                format!("template targets {} but descriptor is {}", template.table, descriptor.name),
            ));
        }
        let mut seen = HashSet::new();
        let mut slots = Vec::with_capacity(template.columns.len());
        for col in &template.columns {
            if !seen.insert(col.as_str()) {
                return Err(StorageError::schema(
                    &template.table,
                    format!("column {col} bound twice"),
                ));
            }
            let idx = descriptor.column_index(col).ok_or_else(|| {
                StorageError::schema(&template.table, format!("unknown column {col}"))
            })?;
            slots.push((idx, descriptor.columns[idx].ty));
        }
        for k in descriptor.primary_key() {
            if !seen.contains(k) {
                return Err(StorageError::schema(
                    &template.table,
                    format!("key column {k} missing from write"),
                ));
            }
        }
        Ok(Self {
            table: template.table.clone(),
            slots,
            width: descriptor.columns.len(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn arity(&self) -> usize {
        self.slots.len()
    }

    /// Lays bound values out in table column order. Columns the template does
    /// not cover are null.
    pub fn bind(&self, values: Vec<Value>) -> Result<Vec<Value>> {
        if values.len() != self.slots.len() {
            return Err(StorageError::write(
                &self.table,
                format!("expected {} values, got {}", self.slots.len(), values.len()),
            ));
        }
        let mut out = vec![Value::Null; self.width];
        for ((idx, ty), v) in self.slots.iter().zip(values) {
            if !v.fits(*ty) {
                return Err(StorageError::write(
                    &self.table,
                    format!("value {v} does not fit {ty} column #{idx}"),
                ));
            }
            out[*idx] = v;
        }
        Ok(out)
    }
}
