//! Engine configuration.
//!
//! Every field has a default; [`EngineConfig::from_env`] overlays `PII_*`
//! variables (and a `.env` file when present).

use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::discovery::BackendTier;
use crate::error::{EngineError, Result};
use crate::unify::AutoAcceptPolicy;

/// How the discovery oracle is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    /// Direct HTTP call to the inference endpoint
    #[default]
    Direct,
    /// Relayed through an intermediary task
    Relay,
}

impl FromStr for TransportKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" | "http" => Ok(Self::Direct),
            "relay" | "proxy" => Ok(Self::Relay),
            other => Err(EngineError::config("PII_TRANSPORT", format!("unknown transport: {}", other))),
        }
    }
}

/// Knobs for the discovery client.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryConfig {
    /// Chunk budget for small local models
    pub light_chunk_chars: usize,
    /// Chunk budget for large or hosted models
    pub heavy_chunk_chars: usize,
    /// Characters shared by neighbouring chunks
    pub chunk_overlap: usize,
    pub max_concurrency: usize,
    pub request_timeout: Duration,
    /// Extra attempts after a busy response
    pub busy_retries: u32,
    /// First backoff delay; doubles on every busy retry
    pub backoff_base: Duration,
    /// Drop oracle values that do not occur in the chunk
    pub require_grounding: bool,
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Candidate hints included in each prompt
    pub max_hints: usize,
    /// Tier for model ids that give no size hint
    pub default_tier: BackendTier,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            light_chunk_chars: 2_500,
            heavy_chunk_chars: 12_000,
            chunk_overlap: 200,
            max_concurrency: 4,
            request_timeout: Duration::from_secs(90),
            busy_retries: 3,
            backoff_base: Duration::from_millis(500),
            require_grounding: true,
            temperature: 0.1,
            max_output_tokens: 1_024,
            max_hints: 40,
            default_tier: BackendTier::Heavy,
        }
    }
}

impl DiscoveryConfig {
    pub fn with_chunk_chars(mut self, light: usize, heavy: usize) -> Self {
        self.light_chunk_chars = light;
        self.heavy_chunk_chars = heavy;
        self
    }

    pub fn with_chunk_overlap(mut self, overlap: usize) -> Self {
        self.chunk_overlap = overlap;
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_busy_retries(mut self, retries: u32, backoff_base: Duration) -> Self {
        self.busy_retries = retries;
        self.backoff_base = backoff_base;
        self
    }

    pub fn with_grounding(mut self, require: bool) -> Self {
        self.require_grounding = require;
        self
    }

    pub fn with_max_hints(mut self, max: usize) -> Self {
        self.max_hints = max;
        self
    }

    pub fn with_default_tier(mut self, tier: BackendTier) -> Self {
        self.default_tier = tier;
        self
    }

    /// Chunk budget for a tier.
    pub fn chunk_chars(&self, tier: BackendTier) -> usize {
        match tier {
            BackendTier::Light => self.light_chunk_chars,
            BackendTier::Heavy => self.heavy_chunk_chars,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// When false every detector is a no-op
    pub enabled: bool,
    /// When false only the pattern scanner runs
    pub use_llm: bool,
    /// Model used when the caller passes none
    pub default_model: String,
    pub transport: TransportKind,
    pub auto_accept: AutoAcceptPolicy,
    pub discovery: DiscoveryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            use_llm: true,
            default_model: "llama3.1:8b".to_string(),
            transport: TransportKind::Direct,
            auto_accept: AutoAcceptPolicy::default(),
            discovery: DiscoveryConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Build configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);
        let defaults = Self::default();
        let d = &defaults.discovery;

        let discovery = DiscoveryConfig {
            light_chunk_chars: vars.parse_or("PII_LIGHT_CHUNK_CHARS", d.light_chunk_chars)?,
            heavy_chunk_chars: vars.parse_or("PII_HEAVY_CHUNK_CHARS", d.heavy_chunk_chars)?,
            chunk_overlap: vars.parse_or("PII_CHUNK_OVERLAP", d.chunk_overlap)?,
            max_concurrency: vars.parse_or("PII_MAX_CONCURRENCY", d.max_concurrency)?,
            request_timeout: Duration::from_secs(
                vars.parse_or("PII_REQUEST_TIMEOUT_SECS", d.request_timeout.as_secs())?,
            ),
            busy_retries: vars.parse_or("PII_BUSY_RETRIES", d.busy_retries)?,
            backoff_base: Duration::from_millis(
                vars.parse_or("PII_BACKOFF_MS", d.backoff_base.as_millis() as u64)?,
            ),
            require_grounding: vars.flag_or("PII_REQUIRE_GROUNDING", d.require_grounding)?,
            ..d.clone()
        };

        Ok(Self {
            enabled: vars.flag_or("PII_DETECTION_ENABLED", defaults.enabled)?,
            use_llm: vars.flag_or("PII_USE_LLM", defaults.use_llm)?,
            default_model: vars
                .get("PII_DEFAULT_MODEL")
                .unwrap_or_else(|| defaults.default_model.clone()),
            transport: match vars.get("PII_TRANSPORT") {
                Some(value) => value.parse()?,
                None => defaults.transport,
            },
            auto_accept: match vars.get("PII_AUTO_ACCEPT") {
                Some(value) => value.parse()?,
                None => defaults.auto_accept,
            },
            discovery,
        })
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_llm(mut self, use_llm: bool) -> Self {
        self.use_llm = use_llm;
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_auto_accept(mut self, policy: AutoAcceptPolicy) -> Self {
        self.auto_accept = policy;
        self
    }

    pub fn with_discovery(mut self, discovery: DiscoveryConfig) -> Self {
        self.discovery = discovery;
        self
    }
}

struct Vars<F>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    /// Non-blank value of a variable.
    fn get(&self, var: &str) -> Option<String> {
        (self.0)(var).filter(|v| !v.trim().is_empty())
    }

    fn parse_or<T: FromStr>(&self, var: &str, default: T) -> Result<T>
    where
        T::Err: std::fmt::Display,
    {
        match self.get(var) {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|e: T::Err| EngineError::config(var, format!("must be a valid number: {}", e))),
            None => Ok(default),
        }
    }

    fn flag_or(&self, var: &str, default: bool) -> Result<bool> {
        match self.get(var) {
            Some(value) => {
                parse_flag(&value).ok_or_else(|| EngineError::config(var, "must be true or false"))
            }
            None => Ok(default),
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
