//! Error types for tserve-core

use thiserror::Error;

/// Result type alias for tserve operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for request handling
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid HTTP method
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// Route pattern rejected at registration
    #[error("Invalid route pattern: {0}")]
    InvalidPattern(#[from] tserve_router::RouteError),

    /// Invalid header
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Reading the request body failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Handler-reported failure
    #[error("Handler error: {0}")]
    Handler(String),
}

impl Error {
    /// Shorthand for handler failures
    pub fn handler(msg: impl Into<String>) -> Self {
        Error::Handler(msg.into())
    }
}
