//! Chat request/response types and wire payloads.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{InferenceError, Result};

// =============================================================================
// API style
// =============================================================================

/// Wire dialect spoken by the inference endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApiStyle {
    /// `POST {base}/chat/completions` (OpenAI, OpenRouter, vLLM, LM Studio)
    #[default]
    OpenAi,
    /// `POST {base}/api/chat` (Ollama)
    Ollama,
}

impl ApiStyle {
    /// Path appended to the base URL for chat requests.
    pub fn chat_path(&self) -> &'static str {
        match self {
            Self::OpenAi => "/chat/completions",
            Self::Ollama => "/api/chat",
        }
    }
}

impl FromStr for ApiStyle {
    type Err = InferenceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "openai-compatible" | "openai_compatible" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(InferenceError::Config(format!("unknown API style: {}", other))),
        }
    }
}

// =============================================================================
// Chat request
// =============================================================================

/// Decoding options sent with every request.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DecodingOptions {
    /// Sampling temperature (0.0 to 2.0)
    pub temperature: Option<f32>,

    /// Cap on generated tokens
    pub max_output_tokens: Option<u32>,
}

/// Chat completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    /// Model to use (e.g., "gpt-4o-mini", "llama3.2:3b")
    pub model: String,

    /// Conversation messages, in order
    pub messages: Vec<Message>,

    /// Decoding options
    pub options: DecodingOptions,
}

impl ChatRequest {
    /// Create a new chat request with the given model.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            options: DecodingOptions::default(),
        }
    }

    /// Add a message to the conversation.
    pub fn message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Set temperature.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.options.temperature = Some(temperature);
        self
    }

    /// Cap the number of generated tokens.
    pub fn max_output_tokens(mut self, max: u32) -> Self {
        self.options.max_output_tokens = Some(max);
        self
    }

    /// Check if a model requires max_completion_tokens instead of max_tokens.
    pub fn uses_max_completion_tokens(model: &str) -> bool {
        model.starts_with("o1")
            || model.starts_with("o3")
            || model.starts_with("gpt-5")
            || model.contains("-o1")
            || model.contains("-o3")
    }

    /// Build the wire payload for the given dialect.
    pub fn payload(&self, style: ApiStyle) -> Payload<'_> {
        match style {
            ApiStyle::OpenAi => {
                let newer = Self::uses_max_completion_tokens(&self.model);
                Payload::OpenAi(OpenAiPayload {
                    model: &self.model,
                    messages: &self.messages,
                    temperature: self.options.temperature,
                    max_tokens: if newer { None } else { self.options.max_output_tokens },
                    max_completion_tokens: if newer {
                        self.options.max_output_tokens
                    } else {
                        None
                    },
                })
            }
            ApiStyle::Ollama => Payload::Ollama(OllamaPayload {
                model: &self.model,
                messages: &self.messages,
                stream: false,
                options: OllamaOptions {
                    temperature: self.options.temperature,
                    num_predict: self.options.max_output_tokens,
                },
            }),
        }
    }
}

/// Chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role: "system", "user", "assistant"
    pub role: String,

    /// Message content
    pub content: String,
}

impl Message {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Serialized request body.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Payload<'a> {
    OpenAi(OpenAiPayload<'a>),
    Ollama(OllamaPayload<'a>),
}

#[derive(Debug, Serialize)]
pub struct OpenAiPayload<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct OllamaPayload<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

// =============================================================================
// Chat response
// =============================================================================

/// Chat completion response.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    /// Free-text content produced by the model
    pub content: String,

    /// Token usage statistics, when the backend reports them
    pub usage: Option<Usage>,
}

impl ChatResponse {
    /// Response with content only.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: None,
        }
    }
}

/// Token usage statistics.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens in the prompt
    #[serde(default)]
    pub prompt_tokens: u32,

    /// Tokens in the completion
    #[serde(default)]
    pub completion_tokens: u32,

    /// Total tokens used
    #[serde(default)]
    pub total_tokens: u32,
}

/// Raw envelope; covers OpenAI, Ollama and bare `{content}` relays.
#[derive(Debug, Deserialize)]
struct ChatEnvelope {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    message: Option<ChatMessageResponse>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

/// Decode a response body into a [`ChatResponse`].
pub fn parse_envelope(body: &str) -> Result<ChatResponse> {
    let envelope: ChatEnvelope = serde_json::from_str(body)
        .map_err(|e| InferenceError::Parse(format!("invalid response envelope: {}", e)))?;

    let usage = envelope.usage.or_else(|| match (envelope.prompt_eval_count, envelope.eval_count) {
        (None, None) => None,
        (prompt, completion) => {
            let prompt_tokens = prompt.unwrap_or(0);
            let completion_tokens = completion.unwrap_or(0);
            Some(Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            })
        }
    });

    let content = envelope
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .or_else(|| envelope.message.and_then(|m| m.content))
        .or(envelope.content)
        .ok_or_else(|| InferenceError::Parse("response carried no content".into()))?;

    Ok(ChatResponse { content, usage })
}

// =============================================================================
// Utilities
// =============================================================================

/// Truncate a string to at most `max_bytes` bytes at a character boundary.
pub fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> ChatRequest {
        ChatRequest::new("llama3.2:3b")
            .message(Message::system("classify"))
            .message(Message::user("Mario Rossi"))
            .temperature(0.1)
            .max_output_tokens(512)
    }

    #[test]
    fn test_message_constructors() {
        assert_eq!(Message::system("s").role, "system");
        assert_eq!(Message::user("u").role, "user");
        assert_eq!(Message::assistant("a").role, "assistant");
    }

    #[test]
    fn test_openai_payload_shape() {
        let value = serde_json::to_value(request().payload(ApiStyle::OpenAi)).unwrap();
        assert_eq!(value["model"], "llama3.2:3b");
        assert_eq!(value["messages"][1]["content"], "Mario Rossi");
        assert_eq!(value["max_tokens"], 512);
        assert!(value.get("max_completion_tokens").is_none());
        assert!(value.get("stream").is_none());
    }

    #[test]
    fn test_openai_payload_for_reasoning_models() {
        let req = ChatRequest::new("o3-mini").max_output_tokens(100);
        let value = serde_json::to_value(req.payload(ApiStyle::OpenAi)).unwrap();
        assert_eq!(value["max_completion_tokens"], 100);
        assert!(value.get("max_tokens").is_none());
    }

    #[test]
    fn test_ollama_payload_shape() {
        let value = serde_json::to_value(request().payload(ApiStyle::Ollama)).unwrap();
        assert_eq!(value["stream"], false);
        assert_eq!(value["options"]["num_predict"], 512);
        assert!((value["options"]["temperature"].as_f64().unwrap() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_parse_openai_envelope() {
        let body = json!({
            "choices": [{"message": {"role": "assistant", "content": "[]"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 2, "total_tokens": 12}
        })
        .to_string();
        let response = parse_envelope(&body).unwrap();
        assert_eq!(response.content, "[]");
        assert_eq!(response.usage.unwrap().total_tokens, 12);
    }

    #[test]
    fn test_parse_ollama_envelope() {
        let body = json!({
            "model": "llama3.2:3b",
            "message": {"role": "assistant", "content": "{\"value\": \"x\"}"},
            "done": true,
            "prompt_eval_count": 30,
            "eval_count": 5
        })
        .to_string();
        let response = parse_envelope(&body).unwrap();
        assert_eq!(response.content, "{\"value\": \"x\"}");
        assert_eq!(response.usage.unwrap().total_tokens, 35);
    }

    #[test]
    fn test_parse_bare_content_envelope() {
        let response = parse_envelope(r#"{"content": "hello"}"#).unwrap();
        assert_eq!(response.content, "hello");
        assert!(response.usage.is_none());
    }

    #[test]
    fn test_parse_envelope_without_content() {
        assert!(matches!(
            parse_envelope(r#"{"choices": []}"#),
            Err(InferenceError::Parse(_))
        ));
        assert!(matches!(parse_envelope("not json"), Err(InferenceError::Parse(_))));
    }

    #[test]
    fn test_api_style_from_str() {
        assert_eq!("Ollama".parse::<ApiStyle>().unwrap(), ApiStyle::Ollama);
        assert_eq!("openai".parse::<ApiStyle>().unwrap(), ApiStyle::OpenAi);
        assert!("grpc".parse::<ApiStyle>().is_err());
    }

    #[test]
    fn test_truncate_to_char_boundary() {
        let text = "Hello 世界";
        let truncated = truncate_to_char_boundary(text, 8);
        assert!(truncated.len() <= 8);
        assert!(text.starts_with(truncated));
    }
}
