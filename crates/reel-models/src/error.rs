//! Model-level error types.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised by model invariants.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Illegal {kind} transition: {from} -> {to}")]
    IllegalTransition {
        kind: &'static str,
        from: String,
        to: String,
    },

    #[error("Assembly task {task_id} is not ready for publishing: {reason}")]
    AssemblyNotReady { task_id: String, reason: String },

    #[error("Invalid publish metadata: {0}")]
    InvalidMetadata(String),

    #[error("Unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },
}

impl ModelError {
    pub fn illegal_transition(
        kind: &'static str,
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> Self {
        Self::IllegalTransition {
            kind,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn assembly_not_ready(task_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AssemblyNotReady {
            task_id: task_id.into(),
            reason: reason.into(),
        }
    }

    pub fn unknown_variant(kind: &'static str, value: impl Into<String>) -> Self {
        Self::UnknownVariant {
            kind,
            value: value.into(),
        }
    }
}
