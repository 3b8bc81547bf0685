use async_trait::async_trait;
use inference_client::{ChatRequest, ChatResponse, InferenceClient, InferenceError};

use super::InferenceTransport;

/// Direct network call to an inference endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: InferenceClient,
}

impl HttpTransport {
    pub fn new(client: InferenceClient) -> Self {
        Self { client }
    }

    /// Client configured from `INFERENCE_*` variables.
    pub fn from_env() -> Result<Self, InferenceError> {
        Ok(Self::new(InferenceClient::from_env()?))
    }

    pub fn client(&self) -> &InferenceClient {
        &self.client
    }
}

#[async_trait]
impl InferenceTransport for HttpTransport {
    async fn send(&self, request: ChatRequest) -> Result<ChatResponse, InferenceError> {
        self.client.chat(&request).await
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
