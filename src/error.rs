//! Error types for the context engine

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, ContextError>;

/// Context engine errors
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Session '{0}' is inactive")]
    InactiveSession(String),

    #[error("Session '{0}' not found")]
    SessionNotFound(String),

    #[error("Optimization failed: {0}")]
    Optimization(String),

    #[error("Summarization failed: {0}")]
    Summarization(String),

    #[error("Entity extraction failed: {0}")]
    Extraction(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<::config::ConfigError> for ContextError {
    fn from(err: ::config::ConfigError) -> Self {
        ContextError::Configuration(err.to_string())
    }
}
