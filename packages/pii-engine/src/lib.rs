//! Hybrid Sensitive-Data Detection and Reversible Tokenization
//!
//! Finds personal data in free text (Italian and English), replaces each
//! value with a stable `[CATEGORY_n]` token recorded in a caller-owned vault,
//! and restores the original values later.
//!
//! # Pipeline
//!
//! ```text
//! text ─▶ scanner ─▶ candidates ─┬────────────────────▶ unify ─▶ findings ─▶ vault
//!                                └─▶ discovery (LLM) ──┘
//! ```
//!
//! - Deterministic patterns and checksums catch structured values (IBAN,
//!   fiscal codes, cards, emails) with high confidence.
//! - A language model, seeded with the candidates as hints, finds what
//!   patterns cannot: names without titles, addresses, free-form ids.
//! - Oracle failures never fail a call; detection degrades to patterns.
//!
//! # Usage
//!
//! ```rust,ignore
//! use pii_engine::{create_detector, restore, transport_from_config, EngineConfig, Vault};
//!
//! let config = EngineConfig::from_env()?;
//! let transport = transport_from_config(&config).ok();
//! let detector = create_detector(&config, transport);
//!
//! let outcome = detector.anonymize(text, &Vault::new(), None).await?;
//! let original = restore(&outcome.anonymized, &outcome.new_vault);
//! ```
//!
//! # Modules
//!
//! - [`validators`] - Checksums for fiscal codes, cards, VAT numbers and IBANs
//! - [`scanner`] - Pattern scanner producing scored candidates
//! - [`discovery`] - Chunked LLM discovery with retry and rescue parsing
//! - [`unify`] - Candidate/finding merge and surface-form folding
//! - [`vault`] - Token minting, anonymization and restoration
//! - [`transport`] - Pluggable channel to the inference backend
//! - [`detector`] - Detector implementations and factory
//! - [`testing`] - Mock transport for tests

pub mod config;
pub mod detector;
pub mod discovery;
pub mod error;
pub mod noise;
pub mod scanner;
pub mod testing;
pub mod transport;
pub mod types;
pub mod unify;
pub mod validators;
pub mod vault;

// Re-export core types at crate root
pub use config::{DiscoveryConfig, EngineConfig, TransportKind};
pub use detector::{
    anonymize_shared, create_detector, transport_from_config, AnonymizeOutcome, DetectionReport,
    HybridDetector, NoopDetector, PatternDetector, SensitiveDataDetector,
};
pub use discovery::{BackendTier, DiscoveryClient};
pub use error::{EngineError, InferenceError, Result};
pub use scanner::scan;
pub use transport::{HttpTransport, InferenceTransport, RelayReceiver, RelayTransport};
pub use types::{Candidate, Category, ConfidenceTier, Finding, Span};
pub use unify::{unify, unify_surface_forms, unify_with_policy, AutoAcceptPolicy, SurfaceForms, SurfaceVariant};
pub use vault::{anonymize, restore, SharedVault, Vault};
