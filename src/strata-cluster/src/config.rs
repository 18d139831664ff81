//! Cluster engine configuration.

use common_config::{DEFAULT_BROADCAST_THRESHOLD, StrataConfig};
use serde::{Deserialize, Serialize};

/// Configuration for [`ClusterEngine`](crate::ClusterEngine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterEngineConfig {
    /// Cluster address (e.g. "cluster://head:7000"); `None` starts an
    /// in-process cluster.
    pub address: Option<String>,
    /// Number of workers.
    pub num_workers: usize,
    /// Default number of partitions; `None` means one per worker.
    pub parallelism: Option<usize>,
    /// Memory limit for pinned frames in bytes (0 = unlimited).
    pub memory_limit: usize,
    /// Frames larger than this many bytes cannot be broadcast.
    pub broadcast_threshold: usize,
}

impl Default for ClusterEngineConfig {
    fn default() -> Self {
        Self {
            address: None,
            num_workers: 4,
            parallelism: None,
            memory_limit: 0,
            broadcast_threshold: DEFAULT_BROADCAST_THRESHOLD,
        }
    }
}

impl ClusterEngineConfig {
    /// In-process cluster with `num_workers` workers.
    pub fn local(num_workers: usize) -> Self {
        Self {
            num_workers: num_workers.max(1),
            ..Default::default()
        }
    }

    /// Build from the execution and cluster sections of the configuration.
    pub fn from_config(config: &StrataConfig) -> Self {
        Self {
            address: config.cluster.address.clone(),
            num_workers: config.cluster.num_workers.max(1),
            parallelism: config.execution.parallelism,
            memory_limit: config.execution.memory_limit.unwrap_or(0),
            broadcast_threshold: config.execution.broadcast_threshold,
        }
    }

    /// Set the worker count.
    pub fn with_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers.max(1);
        self
    }

    /// Set the default partition count.
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = Some(parallelism.max(1));
        self
    }

    /// Set the memory limit for pinned frames.
    pub fn with_memory_limit(mut self, limit: usize) -> Self {
        self.memory_limit = limit;
        self
    }

    /// Set the broadcast threshold.
    pub fn with_broadcast_threshold(mut self, bytes: usize) -> Self {
        self.broadcast_threshold = bytes;
        self
    }

    /// Effective default partition count.
    pub fn parallelism(&self) -> usize {
        self.parallelism.unwrap_or(self.num_workers).max(1)
    }
}

#[cfg(test)]
mod tests {
    use common_config::EngineType;

    use super::*;

    #[test]
    fn test_parallelism_defaults_to_workers() {
        let config = ClusterEngineConfig::local(3);
        assert_eq!(config.parallelism(), 3);
        assert_eq!(config.with_parallelism(8).parallelism(), 8);
    }

    #[test]
    fn test_from_config() {
        let mut strata = StrataConfig::default();
        strata.execution.engine = EngineType::Cluster;
        strata.execution.memory_limit = Some(1024);
        strata.cluster.num_workers = 2;

        let config = ClusterEngineConfig::from_config(&strata);
        assert_eq!(config.num_workers, 2);
        assert_eq!(config.memory_limit, 1024);
        assert_eq!(config.parallelism(), 2);
        assert!(config.address.is_none());
    }
}
