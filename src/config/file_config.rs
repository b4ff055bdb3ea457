use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub port: Option<u16>,
    pub workers: Option<usize>,
    pub shutdown_timeout_secs: Option<u64>,

    // Feature configs
    pub scheduler: Option<SchedulerConfig>,
    pub notifier: Option<NotifierConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Base URL results are posted to, e.g. "http://scheduler:8080"
    pub address: Option<String>,
    pub epoch: Option<i64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct NotifierConfig {
    pub retry_enabled: Option<bool>,
    pub init_interval_secs: Option<f64>,
    pub max_interval_secs: Option<f64>,
    pub max_retries: Option<u32>,
    pub request_timeout_secs: Option<u64>,
    pub idle_wait_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
