//! Finding unifier: merges scanner candidates with oracle findings into one
//! canonical set, plus an optional oracle pass that folds surface-form
//! variants (same address, different punctuation) into one value.

use indexmap::IndexMap;
use inference_client::{ChatRequest, Message};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::discovery::parse::first_json_object;
use crate::discovery::{has_surface_variants, BackendTier};
use crate::error::{EngineError, Result};
use crate::noise;
use crate::transport::InferenceTransport;
use crate::types::{finding_key, Candidate, Category, ConfidenceTier, Finding};

// =============================================================================
// Auto-accept policy
// =============================================================================

/// Which scanner candidates become findings without oracle confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoAcceptPolicy {
    /// HIGH structural candidates only
    StructuralOnly,
    /// HIGH structural candidates plus HIGH dictionary names
    #[default]
    StructuralAndDictionaryNames,
    /// Every candidate at MEDIUM or above
    IncludeMedium,
}

impl AutoAcceptPolicy {
    pub fn accepts(&self, candidate: &Candidate) -> bool {
        match self {
            Self::StructuralOnly => {
                candidate.confidence == ConfidenceTier::High && candidate.category.is_structural()
            }
            Self::StructuralAndDictionaryNames => {
                candidate.confidence == ConfidenceTier::High
                    && (candidate.category.is_structural() || candidate.category == Category::FullName)
            }
            Self::IncludeMedium => candidate.confidence >= ConfidenceTier::Medium,
        }
    }
}

impl FromStr for AutoAcceptPolicy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "structural" | "structural_only" => Ok(Self::StructuralOnly),
            "dictionary" | "structural_and_dictionary_names" => Ok(Self::StructuralAndDictionaryNames),
            "medium" | "include_medium" => Ok(Self::IncludeMedium),
            other => Err(EngineError::config(
                "PII_AUTO_ACCEPT",
                format!("unknown policy: {}", other),
            )),
        }
    }
}

// =============================================================================
// Unify
// =============================================================================

/// Labels that say nothing beyond "this is sensitive".
const GENERIC_LABELS: &[&str] = &[
    "other", "altro", "altri", "pii", "sensitive", "sensitive data", "personal data",
    "dato", "dati", "dato personale", "dati personali", "dato sensibile", "entity",
    "unknown", "value",
];

/// 0 = generic, 1 = the category's own code or default label, 2 = custom.
fn label_specificity(finding: &Finding) -> u8 {
    let label = finding.label.trim().to_lowercase();
    if label.is_empty() || GENERIC_LABELS.contains(&label.as_str()) {
        0
    } else if label == finding.category.code().to_lowercase()
        || label == finding.category.default_label().to_lowercase()
    {
        1
    } else {
        2
    }
}

/// Merge candidates and oracle findings with the default policy.
pub fn unify(candidates: &[Candidate], llm_findings: Vec<Finding>) -> Vec<Finding> {
    unify_with_policy(candidates, llm_findings, AutoAcceptPolicy::default())
}

/// Merge candidates and oracle findings.
///
/// Accepted candidates seed the set; oracle findings fold in by
/// [`finding_key`]. On a collision the stored finding keeps its value and is
/// upgraded when the incoming one carries a concrete category over `OTHER`,
/// or a more specific label for the same category.
pub fn unify_with_policy(
    candidates: &[Candidate],
    llm_findings: Vec<Finding>,
    policy: AutoAcceptPolicy,
) -> Vec<Finding> {
    let mut merged: IndexMap<String, Finding> = IndexMap::new();

    for candidate in candidates.iter().filter(|c| policy.accepts(c)) {
        merged
            .entry(finding_key(&candidate.value))
            .or_insert_with(|| Finding::from(candidate));
    }

    for incoming in llm_findings {
        let key = incoming.key();
        if key.is_empty() {
            continue;
        }

        match merged.get_mut(&key) {
            None => {
                merged.insert(key, incoming);
            }
            Some(stored) => {
                let upgrade = if stored.category == Category::Other {
                    incoming.category != Category::Other
                        || label_specificity(&incoming) > label_specificity(stored)
                } else {
                    incoming.category == stored.category
                        && label_specificity(&incoming) > label_specificity(stored)
                };

                if upgrade {
                    trace!(value = %stored.value, label = %incoming.label, "Upgrading finding label");
                    stored.category = incoming.category;
                    stored.label = incoming.label;
                }
            }
        }
    }

    noise::retain_meaningful(merged.into_values().collect())
}

// =============================================================================
// Surface forms
// =============================================================================

/// Variant → canonical value mapping produced by the surface-form pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SurfaceForms {
    // finding_key(variant) -> canonical value
    canonical: IndexMap<String, String>,
}

/// A variant folded into its canonical finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceVariant {
    pub variant: String,
    pub canonical: String,
}

impl SurfaceForms {
    /// The mapping that folds nothing.
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn is_identity(&self) -> bool {
        self.canonical.is_empty()
    }

    pub fn len(&self) -> usize {
        self.canonical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.canonical.is_empty()
    }

    /// Record `variant` as another spelling of `canonical`. Self-mappings are ignored.
    pub fn insert(&mut self, variant: &str, canonical: &str) {
        let key = finding_key(variant);
        if key.is_empty() || key == finding_key(canonical) {
            return;
        }
        self.canonical.insert(key, canonical.trim().to_string());
    }

    pub fn canonical_of(&self, value: &str) -> Option<&str> {
        self.canonical.get(&finding_key(value)).map(String::as_str)
    }

    /// Drop variant findings whose canonical finding is present.
    ///
    /// Returns the remaining findings, in order, and the folded variants.
    pub fn apply(&self, findings: Vec<Finding>) -> (Vec<Finding>, Vec<SurfaceVariant>) {
        if self.is_identity() {
            return (findings, Vec::new());
        }

        let present: IndexMap<String, String> = findings
            .iter()
            .map(|f| (f.key(), f.value.clone()))
            .collect();

        let mut kept = Vec::with_capacity(findings.len());
        let mut variants = Vec::new();

        for finding in findings {
            let canonical = self
                .canonical_of(&finding.value)
                .and_then(|c| present.get(&finding_key(c)));

            match canonical {
                Some(canonical) => variants.push(SurfaceVariant {
                    variant: finding.value,
                    canonical: canonical.clone(),
                }),
                None => kept.push(finding),
            }
        }

        (kept, variants)
    }
}

const SURFACE_SYSTEM_PROMPT: &str = r#"You receive a list of sensitive values found in one document. Some of them may be different spellings of the same real-world value (the same person, organization or address written with different punctuation, abbreviations or word order).

Rules:
- Only group values that certainly refer to the same entity.
- Pick the most complete spelling as the canonical one.
- Copy every value exactly as listed.
- Answer with ONLY a JSON object mapping each variant to its canonical value: {"variant": "canonical"}
- If there are no variants, answer {}"#;

fn surface_request(model: &str, findings: &[&Finding]) -> ChatRequest {
    let mut listing = String::from("Values:\n");
    for finding in findings {
        listing.push_str(&format!("- {} ({})\n", finding.value, finding.category.code()));
    }

    ChatRequest::new(model)
        .message(Message::system(SURFACE_SYSTEM_PROMPT))
        .message(Message::user(listing))
        .temperature(0.0)
        .max_output_tokens(1_024)
}

/// Ask the oracle which findings are variants of one another.
///
/// Light backends, fewer than two eligible findings and any failure all
/// yield [`SurfaceForms::identity`]. Pairs are kept only when both values are
/// among the findings and share a category.
pub async fn unify_surface_forms(
    findings: &[Finding],
    transport: &dyn InferenceTransport,
    model: &str,
    tier: BackendTier,
    timeout: Duration,
) -> SurfaceForms {
    if tier == BackendTier::Light {
        return SurfaceForms::identity();
    }

    let eligible: Vec<&Finding> = findings
        .iter()
        .filter(|f| has_surface_variants(f.category))
        .collect();
    if eligible.len() < 2 {
        return SurfaceForms::identity();
    }

    let request = surface_request(model, &eligible);
    let content = match tokio::time::timeout(timeout, transport.send(request)).await {
        Ok(Ok(response)) => response.content,
        Ok(Err(e)) => {
            warn!(model = %model, error = %e, "Surface-form pass failed");
            return SurfaceForms::identity();
        }
        Err(_) => {
            warn!(model = %model, timeout_ms = timeout.as_millis(), "Surface-form pass timed out");
            return SurfaceForms::identity();
        }
    };

    let Some(map) = first_json_object(&content) else {
        debug!(model = %model, "Surface-form response had no JSON object");
        return SurfaceForms::identity();
    };

    let by_key: IndexMap<String, &Finding> = eligible.iter().map(|f| (f.key(), *f)).collect();
    let mut forms = SurfaceForms::identity();

    for (variant, canonical) in &map {
        let Some(canonical) = canonical.as_str() else {
            continue;
        };
        let (Some(v), Some(c)) = (by_key.get(&finding_key(variant)), by_key.get(&finding_key(canonical)))
        else {
            trace!(variant = %variant, "Ignoring surface pair outside the finding set");
            continue;
        };
        if v.category == c.category {
            forms.insert(&v.value, &c.value);
        }
    }

    info!(model = %model, count = forms.len(), "Surface-form pass complete");
    forms
}
