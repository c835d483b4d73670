//! Error types for the step execution core.
//!
//! The taxonomy follows one rule: contract violations propagate, everything
//! else becomes a structured failure result at the command boundary.
//! [`ContractViolation`] is the only error allowed out of
//! [`execute_step`](crate::steps::execute_step); a [`StepError`] raised by a
//! concrete command is captured into the step's failure mapping instead.

use thiserror::Error;

/// Fatal misuse of the dispatch contract. Raised before any step-specific
/// logic runs and allowed to propagate to the caller.
#[derive(Debug, Error)]
pub enum ContractViolation {
    #[error("node configuration must be a JSON object")]
    InvalidNodeConfig,
}

/// Failure of one step's own logic. Captured by the dispatch layer and
/// converted into a `success=false` result mapping — it never aborts the
/// surrounding dispatch loop.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("configuration error: {message}")]
    Config { message: String },
    #[error("adapter not found: {id}")]
    AdapterNotFound { id: String },
    #[error("adapter is not active: {id}")]
    AdapterInactive { id: String },
    #[error("execution failed: {message}")]
    Execution { message: String },
}

impl StepError {
    /// Stable category string surfaced as `errorKind` in failure mappings.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::AdapterNotFound { .. } => "adapter_not_found",
            Self::AdapterInactive { .. } => "adapter_inactive",
            Self::Execution { .. } => "execution",
        }
    }
}

/// Errors from [`AdapterLookup`](crate::traits::AdapterLookup) backends.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("adapter lookup failed: {message}")]
    Backend { message: String },
}

/// Errors from utility processors. `MissingField` and `Unsupported` are
/// configuration errors raised before any I/O is attempted.
#[derive(Debug, Error)]
pub enum UtilityError {
    #[error("missing required field: {field}")]
    MissingField { field: String },
    #[error("unsupported utility operation: {domain}.{operation}")]
    Unsupported { domain: String, operation: String },
    #[error("invalid utility configuration: {message}")]
    Invalid { message: String },
}

impl From<UtilityError> for StepError {
    fn from(err: UtilityError) -> Self {
        StepError::Config {
            message: err.to_string(),
        }
    }
}
