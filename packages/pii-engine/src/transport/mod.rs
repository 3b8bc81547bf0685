//! Pluggable channel to the discovery oracle.
//!
//! Discovery only sees [`InferenceTransport`]; whether a request goes straight
//! to an HTTP endpoint or through an intermediary is decided at construction.

mod http;
mod relay;

use async_trait::async_trait;
use inference_client::{ChatRequest, ChatResponse, InferenceError};

pub use http::HttpTransport;
pub use relay::{RelayReceiver, RelayRequest, RelayTransport};

/// Request/response channel to a language model.
#[async_trait]
pub trait InferenceTransport: Send + Sync {
    /// Send one chat request and wait for the reply.
    async fn send(&self, request: ChatRequest) -> Result<ChatResponse, InferenceError>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}
