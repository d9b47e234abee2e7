use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::fixity::parse_algorithms;
use crate::orchestrator::OrchestratorSettings;
use crate::plugin::FixitySettings;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub version: String,
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default)]
    pub job_timeout_secs: Option<u64>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// `None` means the default location under the home directory.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub fixity: FixityConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_block_size() -> usize {
    100
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

fn default_poll_interval_ms() -> u64 {
    100
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            block_size: default_block_size(),
            worker_count: default_worker_count(),
            job_timeout_secs: None,
            poll_interval_ms: default_poll_interval_ms(),
            database_path: None,
            fixity: FixityConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn database_path(&self) -> Option<PathBuf> {
        self.database_path
            .clone()
            .or_else(crate::db::default_database_path)
    }

    pub fn orchestrator_settings(&self) -> Result<OrchestratorSettings, ConfigError> {
        Ok(OrchestratorSettings {
            block_size: self.block_size,
            worker_count: self.worker_count,
            job_timeout: self.job_timeout_secs.map(Duration::from_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            fixity: self.fixity.settings()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixityConfig {
    #[serde(default = "default_algorithms")]
    pub mandatory_algorithms: Vec<String>,
    #[serde(default = "default_originator")]
    pub originator: String,
}

fn default_algorithms() -> Vec<String> {
    vec!["SHA-256".to_string()]
}

fn default_originator() -> String {
    "curator".to_string()
}

impl Default for FixityConfig {
    fn default() -> Self {
        Self {
            mandatory_algorithms: default_algorithms(),
            originator: default_originator(),
        }
    }
}

impl FixityConfig {
    pub fn settings(&self) -> Result<FixitySettings, ConfigError> {
        let algorithms = parse_algorithms(&self.mandatory_algorithms.join(",")).map_err(|e| {
            ConfigError::Validation {
                message: format!("fixity.mandatory_algorithms: {}", e),
            }
        })?;
        Ok(FixitySettings {
            algorithms,
            originator: self.originator.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}
