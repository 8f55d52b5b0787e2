//! Error types for the workout_core library.

use std::io;
use std::path::PathBuf;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for workout_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Progression formula could not be evaluated
    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    /// A flush to the backing text did not apply
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Transition not allowed from the current session state
    #[error("State error: {0}")]
    State(String),
}

/// Failure while evaluating a progression formula.
///
/// Callers leave the affected parameter unchanged.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvaluationError {
    #[error("undefined variable '{0}'")]
    UndefinedVariable(char),

    #[error("malformed expression: {0}")]
    Malformed(String),

    #[error("result is not a finite number")]
    NonFinite,
}

/// Failure to commit serialized text back to its block.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PersistenceError {
    #[error("no position context for workout block")]
    MissingContext,

    #[error("block title mismatch: expected '{expected}', found '{found}'")]
    TitleMismatch { expected: String, found: String },

    #[error("block position is stale")]
    StaleContext,

    #[error("file not found: {0}")]
    MissingFile(PathBuf),
}
