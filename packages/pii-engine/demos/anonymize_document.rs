//! Anonymize a text file and print the result.
//!
//! ```text
//! cargo run -p pii-engine --example anonymize_document -- input.txt [vault.json]
//! ```
//!
//! The vault is loaded from `vault.json` when it exists and written back
//! afterwards, so tokens stay stable across documents. Without
//! `INFERENCE_BASE_URL` the detector runs on patterns only.

use anyhow::{Context, Result};
use pii_engine::{create_detector, restore, transport_from_config, EngineConfig, Vault};
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,pii_engine=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let input = args.next().context("usage: anonymize_document <input> [vault.json]")?;
    let vault_path = args.next();

    let config = EngineConfig::from_env().context("invalid PII_* configuration")?;
    let transport = match transport_from_config(&config) {
        Ok(transport) => Some(transport),
        Err(e) => {
            tracing::warn!(error = %e, "No inference backend configured");
            None
        }
    };
    let detector = create_detector(&config, transport);

    let text = std::fs::read_to_string(&input).with_context(|| format!("reading {}", input))?;
    let vault = match &vault_path {
        Some(path) if Path::new(path).exists() => {
            let json = std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
            Vault::from_json(&json)?
        }
        _ => Vault::new(),
    };

    let outcome = detector.anonymize(&text, &vault, None).await?;
    tracing::info!(
        findings = outcome.findings.len(),
        tokens = outcome.new_vault.len(),
        "Document anonymized"
    );

    // Differs when surface variants were folded into a canonical value
    if restore(&outcome.anonymized, &outcome.new_vault) != text {
        tracing::debug!("Restored text differs from the input");
    }

    println!("{}", outcome.anonymized);

    if let Some(path) = vault_path {
        std::fs::write(&path, outcome.new_vault.to_json()?).with_context(|| format!("writing {}", path))?;
        tracing::info!(path = %path, "Vault saved");
    }

    Ok(())
}
