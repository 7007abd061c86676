//! Core error taxonomy.
//!
//! Every public operation in the crate surfaces one of these variants.
//! The enum is `Clone` so that single-flight consumers (cache factories,
//! de-duplicated operations) can all receive the same failure.

use std::time::Duration;

use thiserror::Error;

use crate::state::RuntimeState;

/// Errors produced by the orchestration core.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// Malformed plugin, flow, task or operation definition. Raised before
    /// any state mutation takes place.
    #[error("validation error: {0}")]
    Validation(String),

    /// Illegal state-machine move.
    #[error("invalid transition: {from} -> {to} (legal targets from {from}: {allowed:?})")]
    InvalidTransition {
        from: RuntimeState,
        to: RuntimeState,
        allowed: Vec<RuntimeState>,
    },

    /// Unknown plugin / task / operation / capability name.
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    /// Operation exceeded its allotted time.
    #[error("operation '{name}' timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    /// Unresolved or circular plugin dependency.
    #[error("dependency error: {0}")]
    Dependency(String),

    /// Failure raised by user-supplied code (action, hook handler, node
    /// executor, task body), wrapped with its origin.
    #[error("execution error in '{source_name}': {message}")]
    Execution { source_name: String, message: String },
}

impl CoreError {
    /// Shorthand for a [`CoreError::NotFound`].
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        CoreError::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Shorthand for a [`CoreError::Execution`] wrapping user code failure.
    pub fn execution(source_name: impl Into<String>, message: impl ToString) -> Self {
        CoreError::Execution {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }

    /// Whether this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, CoreError::Timeout { .. })
    }
}
