//! Error types for the registry core

use thiserror::Error;

/// Core error types
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Task engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Errors raised by the task execute engine.
///
/// `Unsupported` signals a programming error by the caller and must not be
/// swallowed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("Task worker {0} is shut down")]
    Shutdown(String),

    #[error("Failed to stop {} worker(s): {}", .0.len(), .0.join("; "))]
    ShutdownFailed(Vec<String>),

    #[error("Task processor failed for key {key}: {reason}")]
    Processor { key: String, reason: String },
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, Error>;
