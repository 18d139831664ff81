//! Local engine configuration.

use common_config::{DEFAULT_BROADCAST_THRESHOLD, ExecutionConfig};

/// Configuration for [`LocalEngine`](super::LocalEngine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEngineConfig {
    /// Default number of partitions.
    pub parallelism: usize,
    /// Memory limit for persisted frames in bytes (0 = unlimited).
    pub memory_limit: usize,
    /// Frames larger than this many bytes cannot be broadcast.
    pub broadcast_threshold: usize,
}

impl Default for LocalEngineConfig {
    fn default() -> Self {
        Self {
            parallelism: std::thread::available_parallelism().map_or(1, |n| n.get()),
            memory_limit: 0,
            broadcast_threshold: DEFAULT_BROADCAST_THRESHOLD,
        }
    }
}

impl LocalEngineConfig {
    /// Build from the shared execution configuration.
    pub fn from_execution_config(config: &ExecutionConfig) -> Self {
        let defaults = Self::default();
        Self {
            parallelism: config.parallelism.unwrap_or(defaults.parallelism),
            memory_limit: config.memory_limit.unwrap_or(0),
            broadcast_threshold: config.broadcast_threshold,
        }
    }

    /// Set the default partition count.
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Set the memory limit.
    pub fn with_memory_limit(mut self, limit: usize) -> Self {
        self.memory_limit = limit;
        self
    }

    /// Set the broadcast threshold.
    pub fn with_broadcast_threshold(mut self, bytes: usize) -> Self {
        self.broadcast_threshold = bytes;
        self
    }
}
