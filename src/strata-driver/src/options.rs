//! Run options.

use std::collections::HashMap;
use std::path::PathBuf;

use common_config::{DriverConfig, RetryConfig};
use common_error::{StrataError, StrataResult};
use strata_core::PartitionSpec;
use strata_workflow::{TaskId, TaskKind, WorkflowDag};

/// When a failed task is run again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of reruns per task.
    pub max_retries: u32,
    /// Also rerun tasks marked deterministic.
    pub retry_deterministic: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(RetryConfig::default())
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_deterministic: config.retry_deterministic,
        }
    }
}

impl RetryPolicy {
    /// Never retry.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            retry_deterministic: false,
        }
    }

    /// Whether a task that failed `attempts` times with `error` runs again.
    ///
    /// Only transient engine faults qualify.
    pub fn should_retry(&self, deterministic: bool, attempts: u32, error: &StrataError) -> bool {
        error.is_transient()
            && (!deterministic || self.retry_deterministic)
            && attempts <= self.max_retries
    }
}

/// Options of one workflow run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Directory checkpointed outputs are spilled to. Checkpoint requests are
    /// ignored without one.
    pub checkpoint_dir: Option<PathBuf>,
    /// Stop starting new tasks after the first failure.
    pub fail_fast: bool,
    /// Partition specs replacing the ones declared on tasks.
    pub engine_overrides: HashMap<TaskId, PartitionSpec>,
    /// Retry policy.
    pub retry: RetryPolicy,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            checkpoint_dir: None,
            fail_fast: true,
            engine_overrides: HashMap::new(),
            retry: RetryPolicy::default(),
        }
    }
}

impl RunOptions {
    /// Options taken from the driver section of the configuration.
    pub fn from_config(config: &DriverConfig) -> Self {
        Self {
            checkpoint_dir: config.checkpoint_dir.clone(),
            fail_fast: config.fail_fast,
            engine_overrides: HashMap::new(),
            retry: RetryPolicy::from(config.retry),
        }
    }

    /// Set the checkpoint directory.
    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = Some(dir.into());
        self
    }

    /// Set fail-fast behaviour.
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Replace the partition spec of `task`.
    pub fn with_override(mut self, task: TaskId, spec: PartitionSpec) -> Self {
        self.engine_overrides.insert(task, spec);
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The spec `task` runs with.
    pub(crate) fn partition_for<'a>(&'a self, task: TaskId, declared: &'a PartitionSpec) -> &'a PartitionSpec {
        self.engine_overrides.get(&task).unwrap_or(declared)
    }

    /// Check every override against `dag`: the task must exist, have inputs,
    /// and the spec must resolve against each input schema.
    pub fn validate(&self, dag: &WorkflowDag) -> StrataResult<()> {
        for (id, spec) in &self.engine_overrides {
            let task = dag.task(*id)?;
            if task.kind() == TaskKind::Create {
                return Err(StrataError::invalid_parameter(format!(
                    "task '{}' has no inputs to partition",
                    task.name()
                )));
            }
            for input in task.input_ids() {
                let schema = dag.output_schema(input).ok_or_else(|| {
                    StrataError::internal(format!("{input} has no output schema"))
                })?;
                spec.resolve(schema).map_err(|e| {
                    StrataError::partition(format!("override for task '{}': {e}", task.name()))
                })?;
            }
        }
        Ok(())
    }
}
