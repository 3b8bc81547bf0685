//! Error types for the inference client.

use thiserror::Error;

/// Result type for inference client operations.
pub type Result<T> = std::result::Result<T, InferenceError>;

/// Inference client errors.
#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    /// Configuration error (missing base URL, unknown API style)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network error (connection refused, DNS, TLS)
    #[error("Network error: {0}")]
    Network(String),

    /// The request did not complete in time
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Backend is overloaded or rate limiting (HTTP 429/503)
    #[error("Service busy: {0}")]
    Busy(String),

    /// Any other non-2xx response
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// Envelope could not be decoded or carried no content
    #[error("Parse error: {0}")]
    Parse(String),

    /// The transport itself is gone (relay closed, reply dropped)
    #[error("Transport unavailable: {0}")]
    Unavailable(String),
}

impl InferenceError {
    /// Whether the caller should back off and try again.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy(_))
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            429 | 503 => Self::Busy(format!("HTTP {}: {}", status, body)),
            _ => Self::Api { status, body },
        }
    }
}

impl From<reqwest::Error> for InferenceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_decode() {
            Self::Parse(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}
