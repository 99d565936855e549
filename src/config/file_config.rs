use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_path: Option<String>,
    pub records_count: Option<usize>,
    pub regenerate: Option<String>,

    // Generator settings
    pub names: Option<Vec<String>>,
    pub insert_batch_size: Option<usize>,
    pub read_pool_size: Option<usize>,

    pub scheduling: Option<SchedulingConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SchedulingConfig {
    pub phone_update_min_ms: Option<u64>,
    pub phone_update_max_ms: Option<u64>,
    pub dump_min_secs: Option<u64>,
    pub dump_max_secs: Option<u64>,
    pub max_contacts_to_update: Option<usize>,
    pub max_log_retention_secs: Option<u32>,
    pub worker_slots: Option<usize>,
    /// Fixed dump period; drawn from `[dump_min_secs, dump_max_secs)` when absent.
    pub dump_period_secs: Option<u64>,
    /// Fixed retention window; drawn from `[1, max_log_retention_secs)` when absent.
    pub retention_window_secs: Option<u32>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
