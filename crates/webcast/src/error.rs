//! Webcast error types.

use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, WebcastError>;

/// Errors that can occur while consuming a webcast event stream.
#[derive(Error, Debug)]
pub enum WebcastError {
    /// Connection-related errors (WebSocket handshake, socket loss, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Malformed frames or payloads from the event source
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl WebcastError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a generic error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}
