//! Core Error Types
//!
//! Defines the foundational error types used across the Bunyan workspace.
//! These error types are dependency-free (only thiserror + serde_json) to keep
//! the core crate lightweight.
//!
//! The main application crate extends these with storage and transport
//! variants (e.g., Database, Sqlite, Conflict) that require heavier dependencies.

use thiserror::Error;

/// Core error type for the Bunyan workspace.
#[derive(Error, Debug)]
pub enum CoreError {
    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Parse errors (unknown keys, unknown stage names)
    #[error("Parse error: {0}")]
    Parse(String),

    /// A stage move that the session state machine does not allow
    #[error("Invalid stage transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

/// Result type alias for core errors
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a transition error
    pub fn invalid_transition(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::InvalidTransition {
            from: from.into(),
            to: to.into(),
        }
    }
}
