//! Core error types for Strata.

use std::fmt;

use thiserror::Error;

/// Result type alias using `StrataError`.
pub type StrataResult<T> = std::result::Result<T, StrataError>;

/// Generic boxed error for external error sources.
pub type GenericError = Box<dyn std::error::Error + Send + Sync>;

/// A failure reported by an execution engine while doing physical work.
///
/// Only the engine's name and a rendered message cross the abstraction
/// boundary; backend-native error objects never do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineFault {
    /// Name of the engine that raised the fault.
    pub engine: String,
    /// Whether retrying the same work may succeed.
    pub transient: bool,
    /// Human readable description.
    pub message: String,
    /// Optional backend detail (stack fragment, worker id, ...).
    pub detail: Option<String>,
}

impl EngineFault {
    /// Create a permanent fault.
    pub fn permanent(engine: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            transient: false,
            message: message.into(),
            detail: None,
        }
    }

    /// Create a transient fault.
    pub fn transient(engine: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            transient: true,
            ..Self::permanent(engine, message)
        }
    }

    /// Attach backend detail.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl fmt::Display for EngineFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.transient { "transient" } else { "permanent" };
        write!(f, "[{}] {kind}: {}", self.engine, self.message)
    }
}

/// Core error type for Strata operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StrataError {
    /// Malformed schema, unknown column, duplicate field.
    #[error("SchemaError: {0}")]
    SchemaError(String),

    /// A consumer's declared input schema does not accept its producer's output.
    #[error("SchemaContractError: {0}")]
    SchemaContractError(String),

    /// Invalid partition specification.
    #[error("PartitionError: {0}")]
    PartitionError(String),

    /// A frame was handed to an engine that did not produce it.
    #[error("EngineMismatchError: {0}")]
    EngineMismatchError(String),

    /// Tabular input could not be converted to a frame (or back).
    #[error("ConversionError: {0}")]
    ConversionError(String),

    /// Memory or size limit exceeded.
    #[error("ResourceError: {0}")]
    ResourceError(String),

    /// Failure inside the engine's physical execution.
    #[error("EngineExecutionError: {0}")]
    EngineExecutionError(EngineFault),

    /// A task references a task that is not yet (or never) defined before it.
    #[error("CyclicDependencyError: {0}")]
    CyclicDependencyError(String),

    /// A task references an id that does not exist in the graph.
    #[error("UnknownTaskError: {0}")]
    UnknownTaskError(String),

    /// Workflow graph structure error.
    #[error("GraphError: {0}")]
    GraphError(String),

    /// Invalid parameter provided.
    #[error("InvalidParameter: {0}")]
    InvalidParameter(String),

    /// Feature not yet implemented.
    #[error("NotImplemented: {0}")]
    NotImplemented(String),

    /// Internal error (bug in Strata).
    #[error("InternalError: {0}")]
    InternalError(String),

    /// IO error.
    #[error("IoError: {0}")]
    IoError(#[from] std::io::Error),

    /// Arrow error.
    #[error("ArrowError: {0}")]
    ArrowError(#[from] arrow_schema::ArrowError),

    /// JSON serialization error.
    #[error("SerdeJsonError: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// External error raised by user code.
    #[error("ExternalError: {0}")]
    ExternalError(GenericError),
}

/// Stable classification of failures, reported in run results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorCategory {
    Schema,
    SchemaContract,
    Partition,
    EngineMismatch,
    Conversion,
    Resource,
    EngineExecution,
    CyclicDependency,
    UnknownTask,
    Graph,
    InvalidParameter,
    /// The task never ran because one of its inputs failed.
    UpstreamFailed,
    Internal,
    External,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Schema => "SchemaError",
            Self::SchemaContract => "SchemaContractError",
            Self::Partition => "PartitionError",
            Self::EngineMismatch => "EngineMismatchError",
            Self::Conversion => "ConversionError",
            Self::Resource => "ResourceError",
            Self::EngineExecution => "EngineExecutionError",
            Self::CyclicDependency => "CyclicDependencyError",
            Self::UnknownTask => "UnknownTaskError",
            Self::Graph => "GraphError",
            Self::InvalidParameter => "InvalidParameter",
            Self::UpstreamFailed => "UpstreamFailed",
            Self::Internal => "InternalError",
            Self::External => "ExternalError",
        };
        f.write_str(name)
    }
}

impl StrataError {
    /// Create a new `SchemaError`.
    pub fn schema_error<S: Into<String>>(msg: S) -> Self {
        Self::SchemaError(msg.into())
    }

    /// Create a new `SchemaContractError`.
    pub fn contract<S: Into<String>>(msg: S) -> Self {
        Self::SchemaContractError(msg.into())
    }

    /// Create a new `PartitionError`.
    pub fn partition<S: Into<String>>(msg: S) -> Self {
        Self::PartitionError(msg.into())
    }

    /// Create a new `EngineMismatchError`.
    pub fn engine_mismatch<S: Into<String>>(msg: S) -> Self {
        Self::EngineMismatchError(msg.into())
    }

    /// Create a new `ConversionError`.
    pub fn conversion<S: Into<String>>(msg: S) -> Self {
        Self::ConversionError(msg.into())
    }

    /// Create a new `ResourceError`.
    pub fn resource<S: Into<String>>(msg: S) -> Self {
        Self::ResourceError(msg.into())
    }

    /// Create a permanent `EngineExecutionError`.
    pub fn execution(engine: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::EngineExecutionError(EngineFault::permanent(engine, msg))
    }

    /// Create a transient `EngineExecutionError`.
    pub fn transient(engine: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::EngineExecutionError(EngineFault::transient(engine, msg))
    }

    /// Create a new `CyclicDependencyError`.
    pub fn cyclic<S: Into<String>>(msg: S) -> Self {
        Self::CyclicDependencyError(msg.into())
    }

    /// Create a new `UnknownTaskError`.
    pub fn unknown_task<S: Into<String>>(msg: S) -> Self {
        Self::UnknownTaskError(msg.into())
    }

    /// Create a new `GraphError`.
    pub fn graph<S: Into<String>>(msg: S) -> Self {
        Self::GraphError(msg.into())
    }

    /// Create a new `InvalidParameter` error.
    pub fn invalid_parameter<S: Into<String>>(msg: S) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Create a new `NotImplemented` error.
    pub fn not_implemented<S: Into<String>>(msg: S) -> Self {
        Self::NotImplemented(msg.into())
    }

    /// Create a new `InternalError`.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::InternalError(msg.into())
    }

    /// Wrap an arbitrary error raised by user code.
    pub fn external<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ExternalError(Box::new(err))
    }

    /// Re-tag an Arrow or IO failure raised during physical work as a
    /// permanent engine fault. Other errors pass through unchanged.
    pub fn into_engine_fault(self, engine: &str) -> Self {
        match self {
            Self::ArrowError(e) => Self::execution(engine, e.to_string()),
            Self::IoError(e) => Self::execution(engine, e.to_string()),
            other => other,
        }
    }

    /// The stable category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::SchemaError(_) => ErrorCategory::Schema,
            Self::SchemaContractError(_) => ErrorCategory::SchemaContract,
            Self::PartitionError(_) => ErrorCategory::Partition,
            Self::EngineMismatchError(_) => ErrorCategory::EngineMismatch,
            Self::ConversionError(_) => ErrorCategory::Conversion,
            Self::ResourceError(_) => ErrorCategory::Resource,
            Self::EngineExecutionError(_) | Self::IoError(_) | Self::ArrowError(_) => {
                ErrorCategory::EngineExecution
            }
            Self::CyclicDependencyError(_) => ErrorCategory::CyclicDependency,
            Self::UnknownTaskError(_) => ErrorCategory::UnknownTask,
            Self::GraphError(_) => ErrorCategory::Graph,
            Self::InvalidParameter(_) | Self::SerdeJsonError(_) => ErrorCategory::InvalidParameter,
            Self::NotImplemented(_) | Self::InternalError(_) => ErrorCategory::Internal,
            Self::ExternalError(_) => ErrorCategory::External,
        }
    }

    /// Whether this is an engine fault that may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::EngineExecutionError(fault) if fault.transient)
    }

    /// Backend detail carried by engine faults, if any.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::EngineExecutionError(fault) => fault.detail.as_deref(),
            _ => None,
        }
    }
}

/// Ensure a condition holds, returning an `InternalError` if not.
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $msg:expr) => {
        if !$cond {
            return Err($crate::StrataError::InternalError($msg.to_string()));
        }
    };
    ($cond:expr, $variant:ident: $($msg:tt)*) => {
        if !$cond {
            return Err($crate::StrataError::$variant(format!($($msg)*)));
        }
    };
}

/// Return early with a `SchemaError`.
#[macro_export]
macro_rules! schema_err {
    ($($arg:tt)*) => {
        return Err($crate::StrataError::SchemaError(format!($($arg)*)))
    };
}

/// Return early with a `PartitionError`.
#[macro_export]
macro_rules! partition_err {
    ($($arg:tt)*) => {
        return Err($crate::StrataError::PartitionError(format!($($arg)*)))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StrataError::schema_error("column 'x' not found");
        assert_eq!(err.to_string(), "SchemaError: column 'x' not found");

        let err = StrataError::transient("local", "worker lost");
        assert_eq!(
            err.to_string(),
            "EngineExecutionError: [local] transient: worker lost"
        );
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(
            StrataError::contract("a").category(),
            ErrorCategory::SchemaContract
        );
        assert_eq!(
            StrataError::partition("a").category(),
            ErrorCategory::Partition
        );
        assert_eq!(
            StrataError::unknown_task("a").category(),
            ErrorCategory::UnknownTask
        );
        assert_eq!(
            StrataError::cyclic("a").category(),
            ErrorCategory::CyclicDependency
        );
        let io = std::io::Error::other("disk gone");
        assert_eq!(
            StrataError::from(io).category(),
            ErrorCategory::EngineExecution
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(StrataError::transient("e", "x").is_transient());
        assert!(!StrataError::execution("e", "x").is_transient());
        assert!(!StrataError::resource("x").is_transient());
    }

    #[test]
    fn test_fault_detail() {
        let err = StrataError::EngineExecutionError(
            EngineFault::permanent("cluster", "task died").with_detail("worker-3"),
        );
        assert_eq!(err.detail(), Some("worker-3"));
        assert_eq!(StrataError::internal("x").detail(), None);
    }

    #[test]
    fn test_into_engine_fault() {
        let err = StrataError::from(std::io::Error::other("boom")).into_engine_fault("local");
        match err {
            StrataError::EngineExecutionError(fault) => {
                assert_eq!(fault.engine, "local");
                assert!(!fault.transient);
            }
            other => panic!("unexpected {other:?}"),
        }
        let err = StrataError::schema_error("x").into_engine_fault("local");
        assert!(matches!(err, StrataError::SchemaError(_)));
    }

    fn check(flag: bool) -> StrataResult<()> {
        crate::ensure!(flag, PartitionError: "flag was {}", flag);
        Ok(())
    }

    #[test]
    fn test_ensure_macro() {
        assert!(check(true).is_ok());
        assert!(matches!(check(false), Err(StrataError::PartitionError(_))));
    }
}
