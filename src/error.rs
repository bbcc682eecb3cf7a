//! Error taxonomy for the REST transport and the push connection.
//!
//! Reconciler operations surface these as human-readable messages; the
//! optimistic UI change in flight (cleared compose box, buffered note edit)
//! is preserved by the caller, never silently discarded. `Unauthorized` is
//! special everywhere: it forces a global logout and connection teardown.

use thiserror::Error;

/// Errors produced by the request/response transport and connection layer.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The endpoint string could not be turned into a valid URL.
    #[error("Invalid endpoint")]
    InvalidEndpoint,

    /// 401 from the server. The token store has already been cleared by the
    /// time this is returned.
    #[error("Unauthorized access")]
    Unauthorized,

    /// 4xx with a server-provided message, where available.
    #[error("{0}")]
    ClientError(String),

    /// 5xx, or a non-JSON failure body.
    #[error("Server error: {0}")]
    ServerError(String),

    /// The response body did not decode into the expected entity.
    #[error("Failed to decode response: {0}")]
    Decoding(#[from] serde_json::Error),

    /// Transport-level failure (DNS, TLS, connection reset, timeout).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Push-connection failure (handshake, missing token, dropped socket).
    #[error("Connection error: {0}")]
    Connection(String),
}

impl ApiError {
    /// Whether this error must trigger a global sign-out.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}
