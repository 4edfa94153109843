//! Common error types shared across Acolhe crates
//!
//! `CommonError` covers the failure patterns of the generic utilities in this
//! crate (configuration validation, task supervision). Domain errors live in
//! `acolhe-domain` and should wrap these rather than duplicate them.

use std::fmt;
use std::time::Duration;

/// Standard result type using CommonError
pub type CommonResult<T> = Result<T, CommonError>;

/// Common error variants that appear across multiple modules
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    /// Configuration-related errors
    Config { message: String, field: Option<String> },

    /// Internal errors that shouldn't normally occur
    Internal { message: String, context: Option<String> },

    /// Task cancellation (async)
    TaskCancelled { task_id: String, reason: Option<String> },

    /// Async operation timeout
    AsyncTimeout { future_name: String, duration: Duration },
}

impl fmt::Display for CommonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { message, field } => {
                if let Some(field) = field {
                    write!(f, "Configuration error in field '{}': {}", field, message)
                } else {
                    write!(f, "Configuration error: {}", message)
                }
            }
            Self::Internal { message, context } => {
                if let Some(ctx) = context {
                    write!(f, "Internal error in '{}': {}", ctx, message)
                } else {
                    write!(f, "Internal error: {}", message)
                }
            }
            Self::TaskCancelled { task_id, reason } => {
                if let Some(reason) = reason {
                    write!(f, "Task '{}' cancelled: {}", task_id, reason)
                } else {
                    write!(f, "Task '{}' cancelled", task_id)
                }
            }
            Self::AsyncTimeout { future_name, duration } => {
                write!(f, "Async operation '{}' timed out after {:?}", future_name, duration)
            }
        }
    }
}

impl std::error::Error for CommonError {}

impl CommonError {
    /// Create a configuration error for a specific field
    pub fn config_field<S: Into<String>, F: Into<String>>(field: F, message: S) -> Self {
        Self::Config { message: message.into(), field: Some(field.into()) }
    }

    /// Create an internal error with context
    pub fn internal_with_context<S: Into<String>, C: Into<String>>(message: S, context: C) -> Self {
        Self::Internal { message: message.into(), context: Some(context.into()) }
    }

    /// Create a task cancelled error
    pub fn task_cancelled<S: Into<String>>(task_id: S) -> Self {
        Self::TaskCancelled { task_id: task_id.into(), reason: None }
    }

    /// Create an async timeout error
    pub fn async_timeout<S: Into<String>>(future_name: S, duration: Duration) -> Self {
        Self::AsyncTimeout { future_name: future_name.into(), duration }
    }

    /// Whether waiting longer could have produced a result.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::AsyncTimeout { .. })
    }
}
