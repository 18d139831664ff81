//! Configuration management for Strata.
//!
//! Provides the engine selection and driver options consumed by
//! `strata::engine_from_config` and `RunOptions::from_config`. Configuration
//! is plain data: nothing here holds a process-wide "current" engine.

use std::path::{Path, PathBuf};

use common_error::StrataResult;
use serde::{Deserialize, Serialize};

/// Default size (bytes) above which broadcasting a frame is refused.
pub const DEFAULT_BROADCAST_THRESHOLD: usize = 64 * 1024 * 1024;

/// Top-level Strata configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrataConfig {
    /// Execution engine configuration.
    pub execution: ExecutionConfig,
    /// Driver configuration.
    pub driver: DriverConfig,
    /// Cluster engine configuration, used when `execution.engine` is `Cluster`.
    pub cluster: ClusterConfig,
}

impl StrataConfig {
    /// Parse a configuration from a JSON document. Missing sections take
    /// their defaults.
    pub fn from_json_str(json: &str) -> StrataResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> StrataResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Render as pretty JSON.
    pub fn to_json_string(&self) -> StrataResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Execution backend configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Engine bound by `engine_from_config`.
    pub engine: EngineType,
    /// Default number of partitions; `None` uses the engine's own default.
    pub parallelism: Option<usize>,
    /// Memory limit in bytes for persisted frames.
    pub memory_limit: Option<usize>,
    /// Size in bytes above which `broadcast` fails with a resource error.
    pub broadcast_threshold: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            engine: EngineType::Local,
            parallelism: None,
            memory_limit: None,
            broadcast_threshold: DEFAULT_BROADCAST_THRESHOLD,
        }
    }
}

/// Engine type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineType {
    /// In-process reference engine.
    #[default]
    Local,
    /// Delegate engine over a worker cluster.
    Cluster,
}

/// Driver behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Stop scheduling new tasks after the first failure.
    pub fail_fast: bool,
    /// Directory for checkpointed task outputs.
    pub checkpoint_dir: Option<PathBuf>,
    /// Retry policy for engine faults.
    pub retry: RetryConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            fail_fast: true,
            checkpoint_dir: None,
            retry: RetryConfig::default(),
        }
    }
}

/// Retry policy for transient engine faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of retries per task.
    pub max_retries: u32,
    /// Also retry tasks marked deterministic.
    pub retry_deterministic: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            retry_deterministic: false,
        }
    }
}

/// Cluster engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Number of workers.
    pub num_workers: usize,
    /// Cluster address; `None` starts an in-process cluster.
    pub address: Option<String>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            address: None,
        }
    }
}
