use async_trait::async_trait;
use inference_client::{ChatRequest, ChatResponse, InferenceClient, InferenceError};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::InferenceTransport;

type Reply = Result<ChatResponse, InferenceError>;

/// A request waiting for the intermediary to answer it.
#[derive(Debug)]
pub struct RelayRequest {
    pub request: ChatRequest,
    reply: oneshot::Sender<Reply>,
}

impl RelayRequest {
    /// Answer the request. Returns false when the caller stopped waiting.
    pub fn respond(self, result: Reply) -> bool {
        self.reply.send(result).is_ok()
    }
}

/// Transport whose calls are relayed by another task over a bounded channel.
#[derive(Debug, Clone)]
pub struct RelayTransport {
    sender: mpsc::Sender<RelayRequest>,
}

/// Intermediary side of a [`RelayTransport`].
#[derive(Debug)]
pub struct RelayReceiver {
    receiver: mpsc::Receiver<RelayRequest>,
}

impl RelayTransport {
    /// Create a connected transport/receiver pair.
    pub fn channel(capacity: usize) -> (Self, RelayReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, RelayReceiver { receiver })
    }
}

#[async_trait]
impl InferenceTransport for RelayTransport {
    async fn send(&self, request: ChatRequest) -> Result<ChatResponse, InferenceError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(RelayRequest { request, reply })
            .await
            .map_err(|_| InferenceError::Unavailable("relay closed".into()))?;

        response
            .await
            .map_err(|_| InferenceError::Unavailable("relay dropped the request".into()))?
    }

    fn name(&self) -> &'static str {
        "relay"
    }
}

impl RelayReceiver {
    /// Next pending request; `None` once every transport handle is dropped.
    pub async fn recv(&mut self) -> Option<RelayRequest> {
        self.receiver.recv().await
    }

    /// Answer every request with `handler`, each on its own task.
    ///
    /// Returns when all transport handles are dropped.
    pub async fn serve<F, Fut>(mut self, handler: F)
    where
        F: Fn(ChatRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Reply> + Send + 'static,
    {
        let handler = Arc::new(handler);
        while let Some(pending) = self.receiver.recv().await {
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                let RelayRequest { request, reply } = pending;
                let model = request.model.clone();
                let result = handler(request).await;
                if reply.send(result).is_err() {
                    debug!(model = %model, "Relay caller went away before the reply");
                }
            });
        }
        debug!("Relay closed");
    }

    /// Serve by forwarding every request to an HTTP client.
    pub async fn forward_to(self, client: InferenceClient) {
        self.serve(move |request| {
            let client = client.clone();
            async move {
                let result = client.chat(&request).await;
                if let Err(e) = &result {
                    warn!(error = %e, "Relayed inference request failed");
                }
                result
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inference_client::Message;

    fn request() -> ChatRequest {
        ChatRequest::new("relay-model").message(Message::user("ping"))
    }

    #[tokio::test]
    async fn test_relay_round_trip() {
        let (transport, receiver) = RelayTransport::channel(4);
        tokio::spawn(receiver.serve(|request: ChatRequest| async move {
            Ok(ChatResponse::text(format!("echo {}", request.messages[0].content)))
        }));

        let response = transport.send(request()).await.unwrap();
        assert_eq!(response.content, "echo ping");
        assert_eq!(transport.name(), "relay");
    }

    #[tokio::test]
    async fn test_relay_propagates_errors() {
        let (transport, receiver) = RelayTransport::channel(1);
        tokio::spawn(receiver.serve(|_request: ChatRequest| async move {
            Err(InferenceError::Busy("queue full".into()))
        }));

        let err = transport.send(request()).await.unwrap_err();
        assert!(err.is_busy());
    }

    #[tokio::test]
    async fn test_closed_relay_is_unavailable() {
        let (transport, receiver) = RelayTransport::channel(1);
        drop(receiver);

        let err = transport.send(request()).await.unwrap_err();
        assert!(matches!(err, InferenceError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_dropped_request_is_unavailable() {
        let (transport, mut receiver) = RelayTransport::channel(1);
        tokio::spawn(async move {
            if let Some(pending) = receiver.recv().await {
                drop(pending);
            }
        });

        let err = transport.send(request()).await.unwrap_err();
        assert!(matches!(err, InferenceError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_manual_respond() {
        let (transport, mut receiver) = RelayTransport::channel(1);
        tokio::spawn(async move {
            while let Some(pending) = receiver.recv().await {
                let reply = ChatResponse::text(pending.request.model.clone());
                pending.respond(Ok(reply));
            }
        });

        let response = transport.send(request()).await.unwrap();
        assert_eq!(response.content, "relay-model");
    }
}
