//! Chat-completion client for local and remote inference endpoints.
//!
//! Speaks the OpenAI `/chat/completions` dialect and the Ollama `/api/chat`
//! dialect. No domain logic lives here; callers build a [`ChatRequest`] and
//! get the free-text reply back.
//!
//! # Example
//!
//! ```rust,ignore
//! use inference_client::{ApiStyle, ChatRequest, InferenceClient, Message};
//!
//! let client = InferenceClient::new("http://localhost:11434")
//!     .with_api_style(ApiStyle::Ollama);
//!
//! let response = client
//!     .chat(&ChatRequest::new("llama3.2:3b").message(Message::user("Hello!")))
//!     .await?;
//! ```

pub mod credentials;
pub mod error;
pub mod types;

pub use credentials::ApiKey;
pub use error::{InferenceError, Result};
pub use types::*;

use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);

/// Error bodies are cut to this size before logging.
const MAX_ERROR_BODY_BYTES: usize = 1_024;

/// HTTP inference client.
#[derive(Debug, Clone)]
pub struct InferenceClient {
    http_client: Client,
    base_url: String,
    api_key: Option<ApiKey>,
    api_style: ApiStyle,
    timeout: Duration,
}

impl InferenceClient {
    /// Create a client for the given base URL (e.g. `https://api.openai.com/v1`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            api_style: ApiStyle::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Create from `INFERENCE_BASE_URL`, `INFERENCE_API_KEY` and `INFERENCE_API_STYLE`.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("INFERENCE_BASE_URL")
            .map_err(|_| InferenceError::Config("INFERENCE_BASE_URL not set".into()))?;

        let mut client = Self::new(base_url);
        if let Ok(key) = std::env::var("INFERENCE_API_KEY") {
            if !key.trim().is_empty() {
                client = client.with_api_key(key);
            }
        }
        if let Ok(style) = std::env::var("INFERENCE_API_STYLE") {
            client = client.with_api_style(style.parse()?);
        }
        Ok(client)
    }

    /// Send a bearer key with every request.
    pub fn with_api_key(mut self, key: impl Into<ApiKey>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_api_style(mut self, style: ApiStyle) -> Self {
        self.api_style = style;
        self
    }

    /// Per-request timeout applied by the HTTP layer.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_style(&self) -> ApiStyle {
        self.api_style
    }

    /// Full URL chat requests are posted to.
    pub fn chat_url(&self) -> String {
        format!("{}{}", self.base_url, self.api_style.chat_path())
    }

    /// Chat completion.
    ///
    /// 429/503 come back as [`InferenceError::Busy`]; other non-2xx statuses
    /// as [`InferenceError::Api`].
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let start = std::time::Instant::now();

        let mut builder = self
            .http_client
            .post(self.chat_url())
            .timeout(self.timeout)
            .header("Content-Type", "application/json")
            .json(&request.payload(self.api_style));
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", key.bearer());
        }

        let response = builder.send().await.map_err(|e| {
            warn!(error = %e, url = %self.chat_url(), "Inference request failed");
            InferenceError::from(e)
        })?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let body = truncate_to_char_boundary(&body, MAX_ERROR_BODY_BYTES).to_string();
            warn!(status = %status, error = %body, "Inference API error");
            return Err(InferenceError::from_status(status.as_u16(), body));
        }

        let chat_response = parse_envelope(&body)?;

        debug!(
            model = %request.model,
            duration_ms = start.elapsed().as_millis(),
            content_len = chat_response.content.len(),
            "Inference chat completion"
        );

        Ok(chat_response)
    }
}
