//! Typed errors for the detection engine.
//!
//! Uses `thiserror` for library errors (not `anyhow`). Oracle failures never
//! surface here: discovery degrades to "no findings" instead.

use thiserror::Error;

pub use inference_client::InferenceError;

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid environment or builder configuration
    #[error("config error: {var}: {reason}")]
    Config { var: String, reason: String },

    /// Inference backend could not be constructed
    #[error("inference error: {0}")]
    Inference(#[from] InferenceError),

    /// Operation was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// Vault record could not be (de)serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub(crate) fn config(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            var: var.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
