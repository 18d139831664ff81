//! Strata - backend-agnostic dataflow workflows
//!
//! A workflow is declared once as a DAG of tasks over schema-typed data
//! frames and executed unchanged on any [`ExecutionEngine`]. This crate is
//! the facade over the workspace crates:
//!
//! - [`core`]: schemas, logical types, partition specs, the partitioner
//! - [`engine`]: the engine contract, data frames, the local engine
//! - [`cluster`]: the delegate engine over a worker cluster
//! - [`workflow`]: the DAG builder and contract checks
//! - [`driver`]: the topological executor

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

use std::sync::Arc;

use log::info;

pub use common_config as config;
pub use common_error as error;
pub use strata_cluster as cluster;
pub use strata_core as core;
pub use strata_driver as driver;
pub use strata_engine as engine;
pub use strata_workflow as workflow;

pub use common_config::{EngineType, StrataConfig};
pub use common_error::{StrataError, StrataResult};
pub use strata_cluster::ClusterEngine;
pub use strata_core::{LogicalType, PartitionSpec, Schema, Value};
pub use strata_driver::{Driver, RunOptions, RunResult, TaskState, run};
pub use strata_engine::{DataFrame, ExecutionEngine, LocalEngine, TabularSource};
pub use strata_workflow::{WorkflowBuilder, WorkflowDag};

/// Strata version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build the engine selected by `config.execution.engine`.
pub fn engine_from_config(config: &StrataConfig) -> StrataResult<Arc<dyn ExecutionEngine>> {
    let engine: Arc<dyn ExecutionEngine> = match config.execution.engine {
        EngineType::Local => Arc::new(LocalEngine::new(
            strata_engine::LocalEngineConfig::from_execution_config(&config.execution),
        )),
        EngineType::Cluster => Arc::new(ClusterEngine::new(
            strata_cluster::ClusterEngineConfig::from_config(config),
        )?),
    };
    info!(
        "created {} engine (parallelism {})",
        engine.name(),
        engine.default_parallelism()
    );
    Ok(engine)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_from_config() {
        let config = StrataConfig::default();
        assert_eq!(engine_from_config(&config).unwrap().name(), "local");

        let config = StrataConfig::from_json_str(
            r#"{"execution": {"engine": "cluster", "parallelism": 2}, "cluster": {"num_workers": 2}}"#,
        )
        .unwrap();
        let engine = engine_from_config(&config).unwrap();
        assert_eq!(engine.name(), "cluster");
        assert_eq!(engine.default_parallelism(), 2);
    }

    #[test]
    fn test_remote_cluster_rejected() {
        let config = StrataConfig::from_json_str(
            r#"{"execution": {"engine": "cluster"}, "cluster": {"address": "cluster://head:7000"}}"#,
        )
        .unwrap();
        assert!(matches!(
            engine_from_config(&config),
            Err(StrataError::NotImplemented(_))
        ));
    }
}
