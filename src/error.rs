//! Error types for tempo-stream.

use thiserror::Error;

/// Error type for tempo-stream operations.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A non-HTTP transport failed to deliver the request.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server answered with a status code the operation does not handle.
    #[error("Unexpected status {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// Failed to serialize a request body to JSON.
    #[error("Failed to serialize request: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to parse a response body.
    #[error("Failed to parse response: {message}")]
    Parse {
        /// Description of what failed to parse.
        message: String,
    },

    /// A device carries two sensors with the same key.
    #[error("Duplicate sensor '{sensor}' on device '{device}'")]
    DuplicateSensor {
        /// Device key.
        device: String,
        /// Repeated sensor key.
        sensor: String,
    },

    /// A device or sensor key that cannot be used as a path segment.
    #[error("Invalid key '{0}': empty, '.' and '..' cannot address a resource")]
    InvalidKey(String),

    /// Invalid client configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn parse(message: impl Into<String>) -> Self {
        Error::Parse {
            message: message.into(),
        }
    }
}

/// Result type alias for tempo-stream operations.
pub type Result<T> = std::result::Result<T, Error>;
