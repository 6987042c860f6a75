//! Festa error types.

use thiserror::Error;

/// Result alias used throughout Festa.
pub type Result<T> = std::result::Result<T, FestaError>;

/// Unified error type for all Festa crates.
#[derive(Debug, Error)]
pub enum FestaError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}
