//! Error types for hookline.

use crate::service::Verb;

/// Errors produced by an underlying service method.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ServiceError {
    #[error("Method {verb} is not supported by this service")]
    MethodNotSupported { verb: Verb },

    #[error("Method {verb} requires an id")]
    MissingId { verb: Verb },

    #[error("Method {verb} requires data")]
    MissingData { verb: Verb },

    #[error("Entity not found: {id}")]
    NotFound { id: String },

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Method returned no value and its completion handle was dropped unsettled")]
    Unsettled,
}

/// Errors produced by a hook function.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HookError {
    #[error("Hook rejected: {reason}")]
    Rejected { reason: String },

    #[error("Hook execution failed: {reason}")]
    ExecutionFailed { reason: String },
}

impl HookError {
    /// Shorthand for [`HookError::Rejected`].
    pub fn rejected(reason: impl Into<String>) -> Self {
        HookError::Rejected {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`HookError::ExecutionFailed`].
    pub fn failed(reason: impl Into<String>) -> Self {
        HookError::ExecutionFailed {
            reason: reason.into(),
        }
    }
}

/// Top-level error surfaced to the original caller of a wrapped method.
///
/// Hook-origin and method-origin failures both travel through the same error
/// hook chain; callers distinguish them only by inspecting the variant (or
/// the error context's `original` field inside an error hook).
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    #[error("Hook error: {0}")]
    Hook(#[from] HookError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("No service registered at path {0:?}")]
    UnknownService(String),
}

/// Result type alias for pipeline calls.
pub type Result<T> = std::result::Result<T, PipelineError>;
