//! Protocol error types and JSON-RPC error codes.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// JSON-RPC error codes as defined by the specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(pub i32);

impl ErrorCode {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: Self = Self(-32700);
    /// The JSON sent is not a valid request object.
    pub const INVALID_REQUEST: Self = Self(-32600);
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: Self = Self(-32601);
    /// Invalid method parameters.
    pub const INVALID_PARAMS: Self = Self(-32602);
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: Self = Self(-32603);
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::PARSE_ERROR => write!(f, "Parse error"),
            Self::INVALID_REQUEST => write!(f, "Invalid request"),
            Self::METHOD_NOT_FOUND => write!(f, "Method not found"),
            Self::INVALID_PARAMS => write!(f, "Invalid params"),
            Self::INTERNAL_ERROR => write!(f, "Internal error"),
            Self(code) => write!(f, "Error {code}"),
        }
    }
}

/// JSON-RPC error object carried in error responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable error message.
    pub message: String,
    /// Additional error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcError {
    /// Create an error with the given code and message.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create a method-not-found error.
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            ErrorCode::METHOD_NOT_FOUND,
            format!("Method not found: {method}"),
        )
    }

    /// Create an invalid-params error.
    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::INVALID_PARAMS, message)
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::INTERNAL_ERROR, message)
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for JsonRpcError {}

/// Transport- and protocol-level failures.
///
/// Per-message decode errors are deliberately not represented here: sources
/// hand those back as skippable items (see
/// [`crate::transport::MessageSource`]), so only stream-fatal conditions
/// surface as `McpError`.
#[derive(Debug, Error)]
pub enum McpError {
    /// Transport failure described by the transport itself.
    #[error("transport error: {0}")]
    Transport(String),

    /// Serialization failure while writing a message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO failure on the underlying stream.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// The remote backend URL could not be parsed.
    #[error("invalid backend url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}
