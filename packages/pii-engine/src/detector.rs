// Sensitive-data detector implementations

use async_trait::async_trait;
use inference_client::InferenceClient;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, TransportKind};
use crate::discovery::{BackendTier, DiscoveryClient};
use crate::error::{EngineError, Result};
use crate::scanner::scan;
use crate::transport::{HttpTransport, InferenceTransport, RelayTransport};
use crate::types::{Candidate, Finding};
use crate::unify::{unify_surface_forms, unify_with_policy, AutoAcceptPolicy, SurfaceVariant};
use crate::vault::{anonymize, SharedVault, Vault};

/// What a detection call found.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionReport {
    /// Canonical findings, one per value
    pub findings: Vec<Finding>,
    /// Scanner output the findings were seeded from
    pub candidates: Vec<Candidate>,
    /// Surface forms folded into a canonical finding
    pub variants: Vec<SurfaceVariant>,
}

impl DetectionReport {
    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Anonymized text with the vault that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct AnonymizeOutcome {
    pub anonymized: String,
    pub new_vault: Vault,
    pub findings: Vec<Finding>,
}

impl AnonymizeOutcome {
    fn from_report(text: &str, vault: &Vault, report: DetectionReport) -> Self {
        let mut new_vault = vault.clone();
        new_vault.absorb(&report.findings, &report.variants);

        Self {
            anonymized: anonymize(text, &new_vault),
            new_vault,
            findings: report.findings,
        }
    }
}

/// Detects sensitive values and tokenizes them into a vault.
#[async_trait]
pub trait SensitiveDataDetector: Send + Sync {
    /// Find sensitive values. `model` overrides the configured default.
    async fn detect(&self, text: &str, model: Option<&str>) -> Result<DetectionReport>;

    /// Detect, tokenize into a copy of `vault`, and anonymize `text`.
    async fn anonymize(&self, text: &str, vault: &Vault, model: Option<&str>) -> Result<AnonymizeOutcome> {
        let report = self.detect(text, model).await?;
        Ok(AnonymizeOutcome::from_report(text, vault, report))
    }
}

/// Detect without holding the lock, then tokenize and anonymize under it.
pub async fn anonymize_shared(
    detector: &dyn SensitiveDataDetector,
    text: &str,
    vault: &SharedVault,
    model: Option<&str>,
) -> Result<AnonymizeOutcome> {
    let report = detector.detect(text, model).await?;
    let (anonymized, new_vault) = vault
        .absorb_and_anonymize(text, &report.findings, &report.variants)
        .await;

    Ok(AnonymizeOutcome {
        anonymized,
        new_vault,
        findings: report.findings,
    })
}

// =============================================================================
// Pattern-only Detector (Fast, No LLM)
// =============================================================================

/// Scanner plus unifier; no oracle calls.
pub struct PatternDetector {
    policy: AutoAcceptPolicy,
}

impl PatternDetector {
    pub fn new(policy: AutoAcceptPolicy) -> Self {
        Self { policy }
    }
}

impl Default for PatternDetector {
    fn default() -> Self {
        Self::new(AutoAcceptPolicy::default())
    }
}

#[async_trait]
impl SensitiveDataDetector for PatternDetector {
    async fn detect(&self, text: &str, _model: Option<&str>) -> Result<DetectionReport> {
        let candidates = scan(text);
        let findings = unify_with_policy(&candidates, Vec::new(), self.policy);

        debug!(candidates = candidates.len(), count = findings.len(), "Pattern detection complete");
        Ok(DetectionReport {
            findings,
            candidates,
            variants: Vec::new(),
        })
    }
}

// =============================================================================
// Hybrid Detector (Patterns + LLM)
// =============================================================================

/// Scanner, oracle discovery, unifier and, on heavy backends, the
/// surface-form pass.
pub struct HybridDetector {
    discovery: DiscoveryClient,
    default_model: String,
    policy: AutoAcceptPolicy,
}

impl HybridDetector {
    pub fn new(transport: Arc<dyn InferenceTransport>, config: &EngineConfig) -> Self {
        Self {
            discovery: DiscoveryClient::new(transport, config.discovery.clone()),
            default_model: config.default_model.clone(),
            policy: config.auto_accept,
        }
    }

    /// [`SensitiveDataDetector::detect`] with cancellation.
    ///
    /// Fails with [`EngineError::Cancelled`] when the token fires; partial
    /// oracle results are discarded.
    pub async fn detect_with_cancel(
        &self,
        text: &str,
        model: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<DetectionReport> {
        let model = model.unwrap_or(self.default_model.as_str());
        let candidates = scan(text);

        let discovered = self
            .discovery
            .discover_with_cancel(text, &candidates, model, cancel.clone())
            .await;
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let findings = unify_with_policy(&candidates, discovered, self.policy);

        let tier = self.discovery.tier_for(model);
        let (findings, variants) = if tier == BackendTier::Heavy {
            let forms = unify_surface_forms(
                &findings,
                self.discovery.transport().as_ref(),
                model,
                tier,
                self.discovery.config().request_timeout,
            )
            .await;
            forms.apply(findings)
        } else {
            (findings, Vec::new())
        };

        info!(
            model = %model,
            candidates = candidates.len(),
            count = findings.len(),
            variants = variants.len(),
            "Hybrid detection complete"
        );

        Ok(DetectionReport {
            findings,
            candidates,
            variants,
        })
    }
}

#[async_trait]
impl SensitiveDataDetector for HybridDetector {
    async fn detect(&self, text: &str, model: Option<&str>) -> Result<DetectionReport> {
        self.detect_with_cancel(text, model, CancellationToken::new())
            .await
    }
}

// =============================================================================
// No-op Detector (for testing or when detection is disabled)
// =============================================================================

/// Detector that never finds anything; used when detection is disabled.
pub struct NoopDetector;

#[async_trait]
impl SensitiveDataDetector for NoopDetector {
    async fn detect(&self, _text: &str, _model: Option<&str>) -> Result<DetectionReport> {
        Ok(DetectionReport::default())
    }

    async fn anonymize(&self, text: &str, vault: &Vault, _model: Option<&str>) -> Result<AnonymizeOutcome> {
        Ok(AnonymizeOutcome {
            anonymized: text.to_string(),
            new_vault: vault.clone(),
            findings: Vec::new(),
        })
    }
}

// =============================================================================
// Factory functions
// =============================================================================

/// Create a detector based on configuration.
pub fn create_detector(
    config: &EngineConfig,
    transport: Option<Arc<dyn InferenceTransport>>,
) -> Arc<dyn SensitiveDataDetector> {
    if !config.enabled {
        info!("Sensitive-data detection disabled");
        return Arc::new(NoopDetector);
    }

    if config.use_llm {
        match transport {
            Some(transport) => {
                info!(
                    transport = transport.name(),
                    model = %config.default_model,
                    "Detection enabled with hybrid discovery (patterns + LLM)"
                );
                Arc::new(HybridDetector::new(transport, config))
            }
            None => {
                warn!("PII_USE_LLM=true but no inference transport provided, falling back to patterns only");
                Arc::new(PatternDetector::new(config.auto_accept))
            }
        }
    } else {
        info!("Detection enabled with pattern-only scanning");
        Arc::new(PatternDetector::new(config.auto_accept))
    }
}

/// Build the transport named by the configuration from `INFERENCE_*` variables.
///
/// A relay transport spawns its forwarding task, so it needs a running tokio
/// runtime.
pub fn transport_from_config(config: &EngineConfig) -> Result<Arc<dyn InferenceTransport>> {
    let client = InferenceClient::from_env()?.with_timeout(config.discovery.request_timeout);

    match config.transport {
        TransportKind::Direct => Ok(Arc::new(HttpTransport::new(client))),
        TransportKind::Relay => {
            let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
                EngineError::config("PII_TRANSPORT", "relay transport needs a running tokio runtime")
            })?;
            let (transport, receiver) = RelayTransport::channel(config.discovery.max_concurrency * 2);
            runtime.spawn(receiver.forward_to(client));
            Ok(Arc::new(transport))
        }
    }
}
