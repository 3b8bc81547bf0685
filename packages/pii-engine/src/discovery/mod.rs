//! Discovery client: asks a language model for sensitive values the pattern
//! scanner cannot see (names without titles, addresses, free-form ids).
//!
//! The client never fails. Busy backends are retried with backoff, other
//! failures once; a chunk that still fails contributes no findings.

pub mod chunk;
pub mod parse;
pub mod prompts;

use futures::stream::{self, StreamExt};
use indexmap::IndexSet;
use inference_client::{ChatRequest, InferenceError};
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::DiscoveryConfig;
use crate::noise;
use crate::transport::InferenceTransport;
use crate::types::{finding_key, Candidate, Category, Finding};

pub use chunk::{chunk_text, Chunk};
pub use parse::{parse_response, RawFinding};

// =============================================================================
// Backend tier
// =============================================================================

/// Capacity class of the model behind the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendTier {
    /// Small local models: short chunks, no surface-form pass
    Light,
    /// Large or hosted models
    Heavy,
}

const LIGHT_SIZE_WORDS: &[&str] = &["mini", "small", "tiny", "nano", "lite"];

const HEAVY_FAMILIES: &[&str] = &[
    "gpt-4", "gpt-5", "o1", "o3", "o4", "claude", "gemini", "mistral-large", "command-r",
    "deepseek", "grok",
];

lazy_static! {
    // llama3.1:8b, qwen2.5-72b-instruct
    static ref PARAMETER_COUNT: Regex = Regex::new(r"[:\-_](\d+(?:\.\d+)?)b\b").unwrap();
}

impl BackendTier {
    /// Resolve the tier from a model id; `default` when the id gives no hint.
    pub fn for_model(model: &str, default: BackendTier) -> Self {
        let id = model.trim().to_lowercase();
        let name = id.rsplit('/').next().unwrap_or(&id);

        if let Some(billions) = PARAMETER_COUNT
            .captures(name)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<f32>().ok())
        {
            return if billions <= 14.0 { Self::Light } else { Self::Heavy };
        }

        if name
            .split(|c: char| matches!(c, '-' | ':' | '_' | '.'))
            .any(|part| LIGHT_SIZE_WORDS.contains(&part))
        {
            return Self::Light;
        }

        // Ollama tags without a size (llama3:latest)
        if name.contains(':') {
            return Self::Light;
        }

        if HEAVY_FAMILIES.iter().any(|family| name.starts_with(family)) {
            return Self::Heavy;
        }

        default
    }
}

// =============================================================================
// Client
// =============================================================================

/// Chunked, concurrent oracle queries seeded with scanner candidates.
#[derive(Clone)]
pub struct DiscoveryClient {
    transport: Arc<dyn InferenceTransport>,
    config: DiscoveryConfig,
}

impl DiscoveryClient {
    pub fn new(transport: Arc<dyn InferenceTransport>, config: DiscoveryConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<dyn InferenceTransport> {
        &self.transport
    }

    pub fn tier_for(&self, model: &str) -> BackendTier {
        BackendTier::for_model(model, self.config.default_tier)
    }

    /// Find sensitive values in `text`. Never fails.
    pub async fn discover(&self, text: &str, candidates: &[Candidate], model: &str) -> Vec<Finding> {
        self.discover_with_cancel(text, candidates, model, CancellationToken::new())
            .await
    }

    /// [`DiscoveryClient::discover`] with cancellation; cancelled chunks contribute nothing.
    pub async fn discover_with_cancel(
        &self,
        text: &str,
        candidates: &[Candidate],
        model: &str,
        cancel: CancellationToken,
    ) -> Vec<Finding> {
        if text.trim().is_empty() || cancel.is_cancelled() {
            return Vec::new();
        }

        let start = Instant::now();
        let tier = self.tier_for(model);
        let chunks = chunk_text(text, self.config.chunk_chars(tier), self.config.chunk_overlap);

        info!(
            model = %model,
            tier = ?tier,
            chunks = chunks.len(),
            transport = self.transport.name(),
            "Starting discovery"
        );

        let calls: Vec<_> = chunks
            .iter()
            .map(|chunk| self.discover_chunk(chunk, candidates, model, &cancel))
            .collect();
        let per_chunk: Vec<Vec<Finding>> = stream::iter(calls)
            .buffered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        // Overlapping chunks report the same value twice.
        let mut seen = IndexSet::new();
        let findings: Vec<Finding> = per_chunk
            .into_iter()
            .flatten()
            .filter(|f| seen.insert((finding_key(&f.value), f.category)))
            .collect();

        info!(
            model = %model,
            count = findings.len(),
            duration_ms = start.elapsed().as_millis(),
            "Discovery complete"
        );

        findings
    }

    async fn discover_chunk(
        &self,
        chunk: &Chunk,
        candidates: &[Candidate],
        model: &str,
        cancel: &CancellationToken,
    ) -> Vec<Finding> {
        let hints = prompts::select_hints(&chunk.text, candidates, self.config.max_hints);
        let request = prompts::build_request(model, chunk, &hints, &self.config);

        let Some(content) = self.call_with_retry(request, chunk.index, cancel).await else {
            return Vec::new();
        };

        let raw = parse_response(&content);
        if raw.is_empty() {
            debug!(chunk = chunk.index, "No findings parsed from oracle response");
            return Vec::new();
        }

        let findings = noise::retain_meaningful(raw.into_iter().map(RawFinding::into_finding).collect());
        let findings = if self.config.require_grounding {
            ground(findings, &chunk.text)
        } else {
            findings
        };

        debug!(chunk = chunk.index, count = findings.len(), "Chunk discovery complete");
        findings
    }

    /// Send with timeout, busy backoff and a single retry on other failures.
    async fn call_with_retry(
        &self,
        request: ChatRequest,
        chunk: usize,
        cancel: &CancellationToken,
    ) -> Option<String> {
        let mut busy_attempts: u32 = 0;
        let mut failures: u32 = 0;

        loop {
            let attempt = busy_attempts + failures + 1;
            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(chunk, "Discovery cancelled");
                    return None;
                }
                result = tokio::time::timeout(self.config.request_timeout, self.transport.send(request.clone())) => result,
            };

            let error = match outcome {
                Ok(Ok(response)) if !response.content.trim().is_empty() => {
                    return Some(response.content);
                }
                Ok(Ok(_)) => InferenceError::Parse("empty response content".into()),
                Ok(Err(e)) => e,
                Err(_) => InferenceError::Timeout(format!(
                    "no response within {:?}",
                    self.config.request_timeout
                )),
            };

            if error.is_busy() {
                if busy_attempts >= self.config.busy_retries {
                    warn!(chunk, attempt, error = %error, "Backend still busy, abandoning chunk");
                    return None;
                }
                let delay = self.config.backoff_base * 2u32.saturating_pow(busy_attempts);
                busy_attempts += 1;
                debug!(chunk, attempt, delay_ms = delay.as_millis(), "Backend busy, backing off");

                tokio::select! {
                    _ = cancel.cancelled() => return None,
                    _ = tokio::time::sleep(delay) => {}
                }
                continue;
            }

            failures += 1;
            if failures > 1 {
                warn!(chunk, attempt, error = %error, "Discovery request failed, abandoning chunk");
                return None;
            }
            debug!(chunk, attempt, error = %error, "Discovery request failed, retrying once");
        }
    }
}

/// Keep findings whose value occurs in the chunk (case-insensitive,
/// whitespace-collapsed, or with all whitespace removed).
fn ground(findings: Vec<Finding>, chunk: &str) -> Vec<Finding> {
    let collapsed = finding_key(chunk);
    let compact: String = collapsed.chars().filter(|c| !c.is_whitespace()).collect();

    findings
        .into_iter()
        .filter(|finding| {
            let key = finding.key();
            let grounded = collapsed.contains(&key) || {
                let key_compact: String = key.chars().filter(|c| !c.is_whitespace()).collect();
                compact.contains(&key_compact)
            };
            if !grounded {
                trace!(value = %finding.value, "Dropping ungrounded finding");
            }
            grounded
        })
        .collect()
}

/// Whether a category's findings are worth a second oracle pass.
pub(crate) fn has_surface_variants(category: Category) -> bool {
    matches!(
        category,
        Category::FullName | Category::Organization | Category::Address | Category::Birthplace
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use crate::types::{ConfidenceTier, Span};
    use std::time::Duration;

    fn fast_config() -> DiscoveryConfig {
        DiscoveryConfig::default()
            .with_busy_retries(3, Duration::from_millis(1))
            .with_request_timeout(Duration::from_millis(200))
    }

    fn client(mock: &Arc<MockTransport>, config: DiscoveryConfig) -> DiscoveryClient {
        DiscoveryClient::new(mock.clone(), config)
    }

    #[test]
    fn test_backend_tier_for_model() {
        let heavy = BackendTier::Heavy;
        let light = BackendTier::Light;
        assert_eq!(BackendTier::for_model("llama3.1:8b", heavy), light);
        assert_eq!(BackendTier::for_model("qwen2.5:72b", light), heavy);
        assert_eq!(BackendTier::for_model("llama3:latest", heavy), light);
        assert_eq!(BackendTier::for_model("gpt-4o-mini", heavy), light);
        assert_eq!(BackendTier::for_model("gpt-4o", light), heavy);
        assert_eq!(BackendTier::for_model("openai/gpt-4.1", light), heavy);
        assert_eq!(BackendTier::for_model("gemini-1.5-pro", light), heavy);
        assert_eq!(BackendTier::for_model("mystery-model", light), light);
        assert_eq!(BackendTier::for_model("mystery-model", heavy), heavy);
    }

    #[tokio::test]
    async fn test_discover_parses_and_grounds() {
        let mock = Arc::new(MockTransport::new().with_default_response(
            r#"[{"value": "Mario Rossi", "category": "FULL_NAME"}, {"value": "Luigi Verdi", "category": "FULL_NAME"}, {"value": "N/A", "category": "OTHER"}]"#,
        ));
        let discovery = client(&mock, fast_config());

        let findings = discovery.discover("Il sig. Mario Rossi abita qui.", &[], "gpt-4o").await;

        assert_eq!(findings, vec![Finding::new("Mario Rossi", Category::FullName)]);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_grounding_can_be_disabled() {
        let mock = Arc::new(MockTransport::new().with_default_response(r#"["Luigi Verdi"]"#));
        let discovery = client(&mock, fast_config().with_grounding(false));

        let findings = discovery.discover("testo qualsiasi", &[], "gpt-4o").await;
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].value, "Luigi Verdi");
    }

    #[tokio::test]
    async fn test_hints_reach_the_prompt() {
        let mock = Arc::new(MockTransport::new().with_default_response("[]"));
        let discovery = client(&mock, fast_config());
        let candidates = vec![Candidate {
            value: "mario@example.com".into(),
            category: Category::Email,
            confidence: ConfidenceTier::High,
            span: Span { offset: 6, length: 17 },
            context: String::new(),
        }];

        discovery.discover("email mario@example.com", &candidates, "gpt-4o").await;

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].messages[1].content.contains("mario@example.com (EMAIL)"));
    }

    #[tokio::test]
    async fn test_busy_backend_is_retried_with_backoff() {
        let mock = Arc::new(
            MockTransport::new()
                .with_error(InferenceError::Busy("429".into()))
                .with_error(InferenceError::Busy("429".into()))
                .with_response(r#"["Mario Rossi"]"#),
        );
        let discovery = client(&mock, fast_config());

        let findings = discovery.discover("Mario Rossi", &[], "gpt-4o").await;
        assert_eq!(findings.len(), 1);
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_busy_retries_are_bounded() {
        let mock = Arc::new(MockTransport::new().with_default_error(InferenceError::Busy("503".into())));
        let discovery = client(&mock, fast_config());

        let findings = discovery.discover("Mario Rossi", &[], "gpt-4o").await;
        assert!(findings.is_empty());
        // First attempt plus three busy retries
        assert_eq!(mock.call_count(), 4);
    }

    #[tokio::test]
    async fn test_outright_failure_retried_once() {
        let mock = Arc::new(
            MockTransport::new().with_default_error(InferenceError::Network("connection refused".into())),
        );
        let discovery = client(&mock, fast_config());

        let findings = discovery.discover("Mario Rossi", &[], "gpt-4o").await;
        assert!(findings.is_empty());
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_content_retried_once() {
        let mock = Arc::new(
            MockTransport::new()
                .with_response("   ")
                .with_response(r#"["Mario Rossi"]"#),
        );
        let discovery = client(&mock, fast_config());

        let findings = discovery.discover("Mario Rossi", &[], "gpt-4o").await;
        assert_eq!(findings.len(), 1);
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_timeout_degrades_to_no_findings() {
        let mock = Arc::new(
            MockTransport::new()
                .with_default_response(r#"["Mario Rossi"]"#)
                .with_delay(Duration::from_millis(500)),
        );
        let discovery = client(&mock, fast_config().with_request_timeout(Duration::from_millis(20)));

        let findings = discovery.discover("Mario Rossi", &[], "gpt-4o").await;
        assert!(findings.is_empty());
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_chunks_joined_in_order() {
        let mock = Arc::new(MockTransport::new().with_handler(|request| {
            let prompt = &request.messages[1].content;
            if prompt.contains("Alfa Uno") {
                r#"["Alfa Uno"]"#.to_string()
            } else {
                r#"["Beta Due"]"#.to_string()
            }
        }));
        let config = fast_config()
            .with_chunk_chars(30, 30)
            .with_chunk_overlap(0)
            .with_max_concurrency(2);
        let discovery = client(&mock, config);

        let text = format!("Alfa Uno {} Beta Due", "riempitivo ".repeat(3));
        let findings = discovery.discover(&text, &[], "gpt-4o").await;

        let values: Vec<_> = findings.iter().map(|f| f.value.as_str()).collect();
        assert_eq!(values, vec!["Alfa Uno", "Beta Due"]);
        assert!(mock.call_count() >= 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let mock = Arc::new(MockTransport::new().with_default_response(r#"["Mario Rossi"]"#));
        let discovery = client(&mock, fast_config());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let findings = discovery
            .discover_with_cancel("Mario Rossi", &[], "gpt-4o", cancel)
            .await;
        assert!(findings.is_empty());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_in_flight() {
        let mock = Arc::new(
            MockTransport::new()
                .with_default_response(r#"["Mario Rossi"]"#)
                .with_delay(Duration::from_millis(500)),
        );
        let discovery = client(&mock, fast_config().with_request_timeout(Duration::from_secs(5)));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let findings = discovery
            .discover_with_cancel("Mario Rossi", &[], "gpt-4o", cancel)
            .await;
        assert!(findings.is_empty());
    }

    #[test]
    fn test_ground_is_whitespace_and_case_insensitive() {
        let findings = vec![
            Finding::new("mario   ROSSI", Category::FullName),
            Finding::new("IT60X0542811101000000123456", Category::Iban),
            Finding::new("Luigi Verdi", Category::FullName),
        ];
        let grounded = ground(findings, "Il sig. Mario\nRossi, IBAN IT60 X054 2811 1010 0000 0123 456");
        let values: Vec<_> = grounded.iter().map(|f| f.value.as_str()).collect();
        assert_eq!(values, vec!["mario   ROSSI", "IT60X0542811101000000123456"]);
    }
}
