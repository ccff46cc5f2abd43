use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use storage::{Consistency, DEFAULT_BATCH_SIZE};

pub const DEFAULT_ENDPOINT: &str = "./data";
pub const DEFAULT_NAMESPACE: &str = "medallion_architecture";
pub const DEFAULT_TOP_K: usize = 10;

/// Settings every stage is constructed with. Loaded from a TOML file, then
/// optionally overridden from the command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// `memory://` or a directory path.
    pub endpoint: String,
    pub namespace: String,
    pub replication_factor: u32,
    pub batch_size: usize,
    pub consistency: Consistency,
    pub top_k: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            replication_factor: 1,
            batch_size: DEFAULT_BATCH_SIZE,
            consistency: Consistency::Quorum,
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(txt: &str) -> Result<Self> {
        let cfg: PipelineConfig = toml::from_str(txt).context("parse pipeline config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let txt = std::fs::read_to_string(path)
            .with_context(|| format!("read {}", path.display()))?;
        Self::from_toml_str(&txt).with_context(|| format!("load {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(anyhow!("endpoint must not be empty"));
        }
        if self.namespace.trim().is_empty() {
            return Err(anyhow!("namespace must not be empty"));
        }
        if self.batch_size == 0 {
            return Err(anyhow!("batch_size must be at least 1"));
        }
        if self.replication_factor == 0 {
            return Err(anyhow!("replication_factor must be at least 1"));
        }
        if self.top_k == 0 {
            return Err(anyhow!("top_k must be at least 1"));
        }
        Ok(())
    }
}
