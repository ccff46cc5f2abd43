//! Shared definitions: pipeline configuration, table layouts and the typed
//! sales record every stage reads and writes.
mod config;
mod record;
mod tables;

pub use config::{PipelineConfig, DEFAULT_ENDPOINT, DEFAULT_NAMESPACE, DEFAULT_TOP_K};
pub use record::SalesRecord;
pub use tables::*;

use anyhow::{Context, Result};
use storage::Store;

/// Open the configured store and make sure its namespace exists.
pub fn open_store(cfg: &PipelineConfig) -> Result<Box<dyn Store>> {
    cfg.validate()?;
    let store = storage::connect(&cfg.endpoint, &cfg.namespace)
        .with_context(|| format!("connect {} (namespace {})", cfg.endpoint, cfg.namespace))?;
    store
        .ensure_namespace(cfg.replication_factor)
        .with_context(|| format!("ensure namespace {}", cfg.namespace))?;
    Ok(store)
}
