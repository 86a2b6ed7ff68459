//! Error types for the Gatewatch middleware.

use thiserror::Error;

/// Main error type for Gatewatch operations.
#[derive(Error, Debug)]
pub enum GatewatchError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Counter store errors (unavailable backend, lost connection)
    #[error("Store error: {0}")]
    Store(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Gatewatch operations.
pub type Result<T> = std::result::Result<T, GatewatchError>;
