//! Error types for the protocol crate.

use thiserror::Error;

/// Protocol error type covering all possible failure modes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Failed to serialize data.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Failed to deserialize data.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// The message parsed as JSON but is not a valid JSON-RPC request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A line exceeded the maximum allowed length.
    #[error("line too long: {size} bytes exceeds maximum of {max} bytes")]
    LineTooLong {
        /// Actual line length.
        size: usize,
        /// Maximum allowed length.
        max: usize,
    },

    /// Connection was closed unexpectedly.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Any other I/O failure on the transport.
    #[error("I/O error: {0}")]
    Io(String),
}

impl ProtocolError {
    /// The JSON-RPC error code a peer should see for this failure.
    pub fn rpc_code(&self) -> i64 {
        use crate::messages::error_codes;
        match self {
            ProtocolError::Deserialization(_) | ProtocolError::LineTooLong { .. } => {
                error_codes::PARSE_ERROR
            }
            ProtocolError::InvalidRequest(_) => error_codes::INVALID_REQUEST,
            ProtocolError::Serialization(_)
            | ProtocolError::ConnectionClosed(_)
            | ProtocolError::Io(_) => error_codes::INTERNAL_ERROR,
        }
    }
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_eof() || err.is_syntax() {
            ProtocolError::Deserialization(err.to_string())
        } else {
            ProtocolError::Serialization(err.to_string())
        }
    }
}

impl From<std::io::Error> for ProtocolError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof => ProtocolError::ConnectionClosed(err.to_string()),
            _ => ProtocolError::Io(err.to_string()),
        }
    }
}
