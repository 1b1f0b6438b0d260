//! Error types for the Quotagate service.

use thiserror::Error;

/// Main error type for Quotagate operations.
#[derive(Error, Debug)]
pub enum QuotagateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The shared counter store could not be reached
    #[error("Counter store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store answered, but not with a reply the limiter can use
    #[error("Unexpected counter store reply: {0}")]
    StoreReply(String),

    /// A stored counter could not be parsed as an integer
    #[error("Malformed counter value {value:?} at key {key}")]
    MalformedCounterValue { key: String, value: String },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<redis::RedisError> for QuotagateError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_io_error() || e.is_connection_dropped() || e.is_timeout() {
            QuotagateError::StoreUnavailable(e.to_string())
        } else {
            QuotagateError::StoreReply(e.to_string())
        }
    }
}

impl From<config::ConfigError> for QuotagateError {
    fn from(e: config::ConfigError) -> Self {
        QuotagateError::Config(e.to_string())
    }
}

/// Result type alias for Quotagate operations.
pub type Result<T> = std::result::Result<T, QuotagateError>;
