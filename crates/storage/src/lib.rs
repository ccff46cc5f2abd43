//! Storage collaborator used by every pipeline stage.
//!
//! Stages only see the [`Store`] trait: namespace and table provisioning, a
//! full-table scan, prepared writes and batched upserts at a chosen
//! [`Consistency`]. [`MemoryStore`] keeps everything in process,
//! [`IpcStore`] persists Arrow IPC part files under a directory.

mod batch;
mod consistency;
mod error;
mod ipc;
mod memory;
mod schema;
mod store;
mod value;

pub use batch::{BatchWriter, WriteStats, DEFAULT_BATCH_SIZE};
pub use consistency::Consistency;
pub use error::{Result, StorageError};
pub use ipc::{IpcStore, COMPACT_AFTER_PARTS};
pub use memory::MemoryStore;
pub use schema::{ColumnDef, PreparedWrite, TableDescriptor, WriteTemplate};
pub use store::{connect, RowIter, Store, MEMORY_ENDPOINT};
pub use value::{ColumnType, Row, Value};
