use thiserror::Error;

/// Errors surfaced by the client layer.
///
/// Auth failures (bad credentials, invalid OTP) arrive as `Request` with the
/// server-supplied message; there is no separate auth error type.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Non-success HTTP status. The message comes from the response body
    /// (`detail` or `message` field) or a generic fallback.
    #[error("{message}")]
    Request { status: u16, message: String },

    /// Connection, timeout, or transport-level failure.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Response body did not match the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Token persistence failed.
    #[error("token storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl ClientError {
    /// Status code for request errors, None otherwise.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Request { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
