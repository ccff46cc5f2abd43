use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use time::PrimitiveDateTime;

use crate::error::{Result, StorageError};

/// Declared type of a stored column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Text,
    Int,
    BigInt,
    Decimal,
    Timestamp,
}

impl ColumnType {
    pub fn name(self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Int => "int",
            ColumnType::BigInt => "bigint",
            ColumnType::Decimal => "decimal",
            ColumnType::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single stored field. Timestamps carry no timezone.
///
/// `Ord` is derived so that values can be used directly as primary key
/// components in ordered maps; `Null` sorts first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    Null,
    Text(String),
    Int(i32),
    BigInt(i64),
    Decimal(Decimal),
    Timestamp(PrimitiveDateTime),
}

impl Value {
    /// `None` for `Null`, otherwise the column type this value satisfies.
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            Value::Null => None,
            Value::Text(_) => Some(ColumnType::Text),
            Value::Int(_) => Some(ColumnType::Int),
            Value::BigInt(_) => Some(ColumnType::BigInt),
            Value::Decimal(_) => Some(ColumnType::Decimal),
            Value::Timestamp(_) => Some(ColumnType::Timestamp),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Nulls fit any column.
    pub fn fits(&self, ty: ColumnType) -> bool {
        self.column_type().map_or(true, |t| t == ty)
    }

    fn kind(&self) -> &'static str {
        self.column_type().map_or("null", ColumnType::name)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Text(s) => write!(f, "'{s}'"),
            Value::Int(v) => write!(f, "{v}"),
            Value::BigInt(v) => write!(f, "{v}"),
            Value::Decimal(v) => write!(f, "{v}"),
            Value::Timestamp(v) => write!(f, "{v}"),
        }
    }
}

impl From<Option<String>> for Value {
    fn from(v: Option<String>) -> Self {
        v.map_or(Value::Null, Value::Text)
    }
}

impl From<Option<PrimitiveDateTime>> for Value {
    fn from(v: Option<PrimitiveDateTime>) -> Self {
        v.map_or(Value::Null, Value::Timestamp)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

/// One row returned by a scan: named, typed fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    table: Arc<str>,
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(table: Arc<str>, columns: Arc<[String]>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self {
            table,
            columns,
            values,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    fn field(&self, column: &str) -> Result<&Value> {
        self.get(column).ok_or_else(|| StorageError::Decode {
            table: self.table.to_string(),
            column: column.to_string(),
            expected: "column".to_string(),
            found: "missing".to_string(),
        })
    }

    fn mismatch(&self, column: &str, expected: ColumnType, found: &Value) -> StorageError {
        StorageError::Decode {
            table: self.table.to_string(),
            column: column.to_string(),
            expected: expected.to_string(),
            found: found.kind().to_string(),
        }
    }

    pub fn text(&self, column: &str) -> Result<Option<String>> {
        match self.field(column)? {
            Value::Null => Ok(None),
            Value::Text(s) => Ok(Some(s.clone())),
            other => Err(self.mismatch(column, ColumnType::Text, other)),
        }
    }

    pub fn int(&self, column: &str) -> Result<Option<i32>> {
        match self.field(column)? {
            Value::Null => Ok(None),
            Value::Int(v) => Ok(Some(*v)),
            other => Err(self.mismatch(column, ColumnType::Int, other)),
        }
    }

    pub fn bigint(&self, column: &str) -> Result<Option<i64>> {
        match self.field(column)? {
            Value::Null => Ok(None),
            Value::BigInt(v) => Ok(Some(*v)),
            other => Err(self.mismatch(column, ColumnType::BigInt, other)),
        }
    }

    pub fn decimal(&self, column: &str) -> Result<Option<Decimal>> {
        match self.field(column)? {
            Value::Null => Ok(None),
            Value::Decimal(v) => Ok(Some(*v)),
            other => Err(self.mismatch(column, ColumnType::Decimal, other)),
        }
    }

    pub fn timestamp(&self, column: &str) -> Result<Option<PrimitiveDateTime>> {
        match self.field(column)? {
            Value::Null => Ok(None),
            Value::Timestamp(v) => Ok(Some(*v)),
            other => Err(self.mismatch(column, ColumnType::Timestamp, other)),
        }
    }

    /// Like the nullable accessors, but a null is a decode error.
    pub fn required<T>(
        &self,
        column: &str,
        get: impl Fn(&Self, &str) -> Result<Option<T>>,
    ) -> Result<T> {
        get(self, column)?.ok_or_else(|| StorageError::Decode {
            table: self.table.to_string(),
            column: column.to_string(),
            expected: "non-null".to_string(),
            found: "null".to_string(),
        })
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Row(")?;
        for (i, (c, v)) in self.columns.iter().zip(&self.values).enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{c}={v}")?;
        }
        f.write_str(")")
    }
}
