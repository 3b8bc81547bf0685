//! Testing utilities including a mock inference transport.
//!
//! Useful for testing detectors and discovery without a running model.

use async_trait::async_trait;
use inference_client::{ChatRequest, ChatResponse, InferenceError};
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::transport::InferenceTransport;

type Handler = Box<dyn Fn(&ChatRequest) -> String + Send + Sync>;

/// A mock transport with scripted replies.
///
/// Each call takes the next scripted reply; once the script is exhausted the
/// handler, default error or default response answers, in that order. With
/// nothing configured the mock answers `[]`.
#[derive(Default)]
pub struct MockTransport {
    /// Replies consumed one per call
    script: Arc<RwLock<VecDeque<Result<ChatResponse, InferenceError>>>>,

    /// Computes a reply from the request
    handler: Option<Handler>,

    default_error: Option<InferenceError>,

    default_response: Option<String>,

    /// Simulated latency before every reply
    delay: Option<Duration>,

    /// Call tracking for assertions
    requests: Arc<RwLock<Vec<ChatRequest>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply.
    pub fn with_response(self, content: impl Into<String>) -> Self {
        self.script
            .write()
            .unwrap()
            .push_back(Ok(ChatResponse::text(content)));
        self
    }

    /// Queue a failed reply.
    pub fn with_error(self, error: InferenceError) -> Self {
        self.script.write().unwrap().push_back(Err(error));
        self
    }

    pub fn with_default_response(mut self, content: impl Into<String>) -> Self {
        self.default_response = Some(content.into());
        self
    }

    pub fn with_default_error(mut self, error: InferenceError) -> Self {
        self.default_error = Some(error);
        self
    }

    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ChatRequest) -> String + Send + Sync + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Requests received so far, in call order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.read().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.read().unwrap().len()
    }

    /// Clear call history.
    pub fn clear_requests(&self) {
        self.requests.write().unwrap().clear();
    }

    fn next_reply(&self, request: &ChatRequest) -> Result<ChatResponse, InferenceError> {
        if let Some(scripted) = self.script.write().unwrap().pop_front() {
            return scripted;
        }
        if let Some(handler) = &self.handler {
            return Ok(ChatResponse::text(handler(request)));
        }
        if let Some(error) = &self.default_error {
            return Err(error.clone());
        }
        Ok(ChatResponse::text(
            self.default_response.clone().unwrap_or_else(|| "[]".to_string()),
        ))
    }
}

#[async_trait]
impl InferenceTransport for MockTransport {
    async fn send(&self, request: ChatRequest) -> Result<ChatResponse, InferenceError> {
        self.requests.write().unwrap().push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.next_reply(&request)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inference_client::Message;

    fn request(text: &str) -> ChatRequest {
        ChatRequest::new("mock-model").message(Message::user(text))
    }

    #[tokio::test]
    async fn test_script_then_defaults() {
        let mock = MockTransport::new()
            .with_response("first")
            .with_error(InferenceError::Busy("429".into()))
            .with_default_response("fallback");

        assert_eq!(mock.send(request("a")).await.unwrap().content, "first");
        assert!(mock.send(request("b")).await.unwrap_err().is_busy());
        assert_eq!(mock.send(request("c")).await.unwrap().content, "fallback");
        assert_eq!(mock.call_count(), 3);
        assert_eq!(mock.requests()[2].messages[0].content, "c");
    }

    #[tokio::test]
    async fn test_handler_sees_request() {
        let mock = MockTransport::new().with_handler(|request| request.model.to_uppercase());
        assert_eq!(mock.send(request("x")).await.unwrap().content, "MOCK-MODEL");
    }

    #[tokio::test]
    async fn test_empty_mock_answers_empty_array() {
        let mock = MockTransport::new();
        assert_eq!(mock.send(request("x")).await.unwrap().content, "[]");
        mock.clear_requests();
        assert_eq!(mock.call_count(), 0);
    }
}
