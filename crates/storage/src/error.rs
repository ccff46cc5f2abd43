use thiserror::Error;

/// Failures raised by a storage collaborator. Every variant names the table
/// it concerns so a failing run can be attributed from the message alone.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("schema error on {table}: {detail}")]
    Schema { table: String, detail: String },

    #[error("unknown table {table}")]
    UnknownTable { table: String },

    #[error("read error on {table}: {detail}")]
    Read { table: String, detail: String },

    #[error("write error on {table}: {detail}")]
    Write { table: String, detail: String },

    #[error("{table}: consistency {level} needs {required} replica acks, {live} live")]
    Unavailable {
        table: String,
        level: String,
        required: u32,
        live: u32,
    },

    #[error("decode error on {table}.{column}: expected {expected}, found {found}")]
    Decode {
        table: String,
        column: String,
        expected: String,
        found: String,
    },

    #[error("io error on {table}: {source}")]
    Io {
        table: String,
        #[source]
        source: std::io::Error,
    },

    #[error("arrow error on {table}: {source}")]
    Arrow {
        table: String,
        #[source]
        source: arrow::error::ArrowError,
    },
}

impl StorageError {
    pub fn schema(table: impl Into<String>, detail: impl Into<String>) -> Self {
        StorageError::Schema {
            table: table.into(),
            detail: detail.into(),
        }
    }

    pub fn read(table: impl Into<String>, detail: impl Into<String>) -> Self {
        StorageError::Read {
            table: table.into(),
            detail: detail.into(),
        }
    }

    pub fn write(table: impl Into<String>, detail: impl Into<String>) -> Self {
        StorageError::Write {
            table: table.into(),
            detail: detail.into(),
        }
    }

    pub fn io(table: impl Into<String>, source: std::io::Error) -> Self {
        StorageError::Io {
            table: table.into(),
            source,
        }
    }

    pub fn arrow(table: impl Into<String>, source: arrow::error::ArrowError) -> Self {
        StorageError::Arrow {
            table: table.into(),
            source,
        }
    }
}

pub type Result<T, E = StorageError> = std::result::Result<T, E>;
