//! Crate-wide error taxonomy.
//!
//! Every fallible operation in this crate returns [`EngineResult`]. Variants
//! are chosen so a caller can match on *kind* without re-deriving it from a
//! string: dimensions, capacities and offending quant schemes travel with
//! the error instead of being baked into a message.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("dimension mismatch: {context} expected {expected}, got {actual}")]
    DimensionMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    #[error("invalid shape: {0}")]
    InvalidShape(String),

    #[error("unsupported quantization scheme(s): {0:?}")]
    UnsupportedQuantScheme(Vec<String>),

    #[error("container corrupt: {0}")]
    ContainerCorrupt(String),

    #[error("capacity exceeded: max {max}, requested {requested}")]
    CapacityExceeded { max: usize, requested: usize },

    #[error("resource exhausted: {resource} at capacity {max} (current {current})")]
    ResourceExhausted {
        resource: String,
        max: usize,
        current: usize,
    },

    #[error("cancelled by caller")]
    CancelledByCaller,

    #[error("cancelled by timeout after {0:?}")]
    CancelledByTimeout(std::time::Duration),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// The terminal reason a generation request stopped. Exactly one is produced
/// per request (never more, never fewer).
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    Completed,
    MaxTokens,
    CancelledByCaller,
    CancelledByTimeout,
    Error { kind: String, message: String },
}

impl From<&EngineError> for StopReason {
    fn from(err: &EngineError) -> Self {
        match err {
            EngineError::CancelledByCaller => StopReason::CancelledByCaller,
            EngineError::CancelledByTimeout(_) => StopReason::CancelledByTimeout,
            other => StopReason::Error {
                kind: other.kind_name().to_string(),
                message: other.to_string(),
            },
        }
    }
}

impl EngineError {
    /// Stable, matchable name for the variant, independent of its message.
    pub fn kind_name(&self) -> &'static str {
        match self {
            EngineError::InvalidInput(_) => "invalid_input",
            EngineError::DimensionMismatch { .. } => "dimension_mismatch",
            EngineError::InvalidShape(_) => "invalid_shape",
            EngineError::UnsupportedQuantScheme(_) => "unsupported_quant_scheme",
            EngineError::ContainerCorrupt(_) => "container_corrupt",
            EngineError::CapacityExceeded { .. } => "capacity_exceeded",
            EngineError::ResourceExhausted { .. } => "resource_exhausted",
            EngineError::CancelledByCaller => "cancelled_by_caller",
            EngineError::CancelledByTimeout(_) => "cancelled_by_timeout",
            EngineError::ConstraintViolation(_) => "constraint_violation",
            EngineError::Internal(_) => "internal",
            EngineError::Io(_) => "io",
            EngineError::Json(_) => "json",
        }
    }
}
