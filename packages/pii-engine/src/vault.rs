//! Tokenization vault: stable pseudonym tokens for findings, anonymization of
//! text against the vault and restoration of the original values.
//!
//! Tokens have the form `[CATEGORY_n]`. The vault is caller-owned and
//! append-only; the same value (case-insensitive, whitespace-collapsed)
//! always maps to the same token.

use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::{Captures, NoExpand, Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::error::Result;
use crate::types::{finding_key, Finding};
use crate::unify::SurfaceVariant;

lazy_static! {
    static ref TOKEN_PARTS: Regex = Regex::new(r"^\[([A-Z][A-Z_]*)_(\d+)\]$").unwrap();

    // Tokens already present in a text; never rewritten by anonymize.
    static ref TOKEN_SPAN: Regex = Regex::new(r"(?i)\[\s*[A-Z][A-Z_]*_\d+\s*\]").unwrap();

    static ref RESTORABLE_TOKEN: Regex = Regex::new(r"\[\s*([A-Za-z][A-Za-z_]*_\d+)\s*\]").unwrap();
}

/// Separator characters a surface form may add, drop or change.
const SEPARATOR_CLASS: &str = r"[\s/.\-]*";

// =============================================================================
// Vault
// =============================================================================

/// Ordered token → value mapping plus surface-form aliases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    entries: IndexMap<String, String>,
    /// variant → token
    #[serde(default)]
    aliases: IndexMap<String, String>,
}

impl Vault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a vault from a plain token → value map.
    pub fn from_record<I>(record: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self {
            entries: record.into_iter().collect(),
            aliases: IndexMap::new(),
        }
    }

    /// Plain token → value map, without aliases.
    pub fn to_record(&self) -> IndexMap<String, String> {
        self.entries.clone()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(token, value)` pairs in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(t, v)| (t.as_str(), v.as_str()))
    }

    /// `(variant, token)` pairs in insertion order.
    pub fn aliases(&self) -> impl Iterator<Item = (&str, &str)> {
        self.aliases.iter().map(|(v, t)| (v.as_str(), t.as_str()))
    }

    /// Token for a value or alias already in the vault.
    pub fn token_for(&self, value: &str) -> Option<&str> {
        let key = finding_key(value);
        if key.is_empty() {
            return None;
        }

        self.entries
            .iter()
            .find(|(_, v)| finding_key(v) == key)
            .map(|(t, _)| t.as_str())
            .or_else(|| {
                self.aliases
                    .iter()
                    .find(|(variant, _)| finding_key(variant) == key)
                    .map(|(_, t)| t.as_str())
            })
    }

    /// Original value behind a token; spacing and case inside the brackets are ignored.
    pub fn value_of(&self, token: &str) -> Option<&str> {
        let inner = token.trim().trim_start_matches('[').trim_end_matches(']').trim();
        let normalized = format!("[{}]", inner.to_uppercase());
        self.entries.get(&normalized).map(String::as_str)
    }

    /// Token for the finding's value, minting `[CATEGORY_n]` when the value is new.
    pub fn tokenize(&mut self, finding: &Finding) -> String {
        if let Some(token) = self.token_for(&finding.value) {
            return token.to_string();
        }

        let code = finding.category.code();
        let token = format!("[{}_{}]", code, self.next_suffix(code));
        self.entries
            .insert(token.clone(), finding.value.trim().to_string());
        token
    }

    /// One past the highest suffix for `code`, or the smallest unused one when that overflows.
    fn next_suffix(&self, code: &str) -> u64 {
        let used: HashSet<u64> = self
            .entries
            .keys()
            .filter_map(|token| TOKEN_PARTS.captures(token))
            .filter(|caps| &caps[1] == code)
            .filter_map(|caps| caps[2].parse::<u64>().ok())
            .collect();

        let highest = used.iter().copied().max().unwrap_or(0);
        highest
            .checked_add(1)
            .or_else(|| (1..u64::MAX).find(|n| !used.contains(n)))
            .unwrap_or(u64::MAX)
    }

    /// Record `variant` as another surface form of `token`.
    ///
    /// Returns false when the token is unknown or the variant is already a
    /// value or alias in the vault.
    pub fn add_alias(&mut self, variant: &str, token: &str) -> bool {
        let variant = variant.trim();
        if !self.entries.contains_key(token) || self.token_for(variant).is_some() {
            return false;
        }
        self.aliases.insert(variant.to_string(), token.to_string());
        true
    }

    /// Tokenize every finding and alias every folded variant.
    pub fn absorb(&mut self, findings: &[Finding], variants: &[SurfaceVariant]) {
        for finding in findings {
            self.tokenize(finding);
        }
        for variant in variants {
            if let Some(token) = self.token_for(&variant.canonical).map(str::to_string) {
                self.add_alias(&variant.variant, &token);
            }
        }
    }
}

// =============================================================================
// Anonymize / restore
// =============================================================================

fn is_separator(c: char) -> bool {
    c.is_whitespace() || matches!(c, '/' | '.' | '-')
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Separator-tolerant pattern for a value; `None` when nothing but separators remain.
///
/// Separators before the first or after the last kept character (`S.r.l.`)
/// are matched optionally so they go into the token rather than stay behind.
fn matcher_pattern(value: &str) -> Option<String> {
    let value = value.trim();
    let kept: Vec<char> = value.chars().filter(|c| !is_separator(*c)).collect();
    let (first, last) = (*kept.first()?, *kept.last()?);

    let body = kept
        .iter()
        .map(|c| regex::escape(c.encode_utf8(&mut [0; 4])))
        .collect::<Vec<_>>()
        .join(SEPARATOR_CLASS);

    let leading: String = value.chars().take_while(|c| is_separator(*c)).collect();
    let trailing: String = value
        .chars()
        .rev()
        .take_while(|c| is_separator(*c))
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    let optional = |s: &str| {
        if s.is_empty() {
            String::new()
        } else {
            format!("(?:{})?", regex::escape(s))
        }
    };

    let start = if is_word_char(first) { r"\b" } else { "" };
    let end = if is_word_char(last) { r"\b" } else { "" };
    Some(format!("{}{}{}{}{}", optional(&leading), start, body, end, optional(&trailing)))
}

/// Replace matches in the text between existing tokens.
fn replace_outside_tokens(text: &str, matcher: &Regex, token: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for existing in TOKEN_SPAN.find_iter(text) {
        out.push_str(&matcher.replace_all(&text[last..existing.start()], NoExpand(token)));
        out.push_str(existing.as_str());
        last = existing.end();
    }
    out.push_str(&matcher.replace_all(&text[last..], NoExpand(token)));
    out
}

/// Replace every vault value and alias in `text` with its token.
///
/// Longest values go first so a name inside an address is not split.
/// A value whose matcher cannot be compiled is skipped.
pub fn anonymize(text: &str, vault: &Vault) -> String {
    let mut surfaces: Vec<(&str, &str)> = vault
        .entries
        .iter()
        .map(|(token, value)| (value.as_str(), token.as_str()))
        .chain(vault.aliases.iter().map(|(variant, token)| (variant.as_str(), token.as_str())))
        .collect();
    surfaces.sort_by_key(|(value, _)| std::cmp::Reverse(value.chars().count()));

    let mut result = text.to_string();
    for (value, token) in surfaces {
        let Some(pattern) = matcher_pattern(value) else {
            continue;
        };
        let matcher = match RegexBuilder::new(&pattern).case_insensitive(true).build() {
            Ok(matcher) => matcher,
            Err(e) => {
                warn!(token = %token, error = %e, "Skipping vault entry with unbuildable matcher");
                continue;
            }
        };
        result = replace_outside_tokens(&result, &matcher, token);
    }

    result
}

/// Replace known tokens with their original values; unknown tokens stay as they are.
pub fn restore(text: &str, vault: &Vault) -> String {
    RESTORABLE_TOKEN
        .replace_all(text, |caps: &Captures| match vault.value_of(&caps[1]) {
            Some(value) => value.to_string(),
            None => {
                debug!(token = %&caps[0], "Unknown token left in place");
                caps[0].to_string()
            }
        })
        .into_owned()
}

// =============================================================================
// Shared vault
// =============================================================================

/// A vault shared by concurrent callers; token minting is serialized.
#[derive(Debug, Clone, Default)]
pub struct SharedVault {
    inner: Arc<Mutex<Vault>>,
}

impl SharedVault {
    pub fn new(vault: Vault) -> Self {
        Self {
            inner: Arc::new(Mutex::new(vault)),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, Vault> {
        self.inner.lock().await
    }

    pub async fn snapshot(&self) -> Vault {
        self.inner.lock().await.clone()
    }

    /// Absorb findings and anonymize under one lock.
    ///
    /// Returns the anonymized text and a snapshot of the updated vault.
    pub async fn absorb_and_anonymize(
        &self,
        text: &str,
        findings: &[Finding],
        variants: &[SurfaceVariant],
    ) -> (String, Vault) {
        let mut vault = self.inner.lock().await;
        vault.absorb(findings, variants);
        (anonymize(text, &vault), vault.clone())
    }

    pub async fn restore(&self, text: &str) -> String {
        restore(text, &*self.inner.lock().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Category;
    use proptest::prelude::*;

    fn vault_with(findings: &[Finding]) -> Vault {
        let mut vault = Vault::new();
        for finding in findings {
            vault.tokenize(finding);
        }
        vault
    }

    #[test]
    fn test_tokenize_mints_and_reuses() {
        let mut vault = Vault::new();
        let a = vault.tokenize(&Finding::new("Mario Rossi", Category::FullName));
        let b = vault.tokenize(&Finding::new("Luigi Verdi", Category::FullName));
        let c = vault.tokenize(&Finding::new("  MARIO   rossi ", Category::FullName));
        let d = vault.tokenize(&Finding::new("a@b.it", Category::Email));

        assert_eq!(a, "[FULL_NAME_1]");
        assert_eq!(b, "[FULL_NAME_2]");
        assert_eq!(c, a);
        assert_eq!(d, "[EMAIL_1]");
        assert_eq!(vault.len(), 3);
    }

    #[test]
    fn test_suffix_follows_highest_existing() {
        let mut vault = Vault::from_record(vec![
            ("[EMAIL_1]".to_string(), "a@b.it".to_string()),
            ("[EMAIL_7]".to_string(), "c@d.it".to_string()),
        ]);
        let token = vault.tokenize(&Finding::new("e@f.it", Category::Email));
        assert_eq!(token, "[EMAIL_8]");
    }

    #[test]
    fn test_suffix_overflow_falls_back_to_unused() {
        let mut vault = Vault::from_record(vec![
            ("[EMAIL_18446744073709551615]".to_string(), "a@b.it".to_string()),
            ("[EMAIL_1]".to_string(), "c@d.it".to_string()),
        ]);
        let token = vault.tokenize(&Finding::new("e@f.it", Category::Email));
        assert_eq!(token, "[EMAIL_2]");
        assert_eq!(vault.len(), 3);
        assert_eq!(vault.value_of("[EMAIL_18446744073709551615]"), Some("a@b.it"));
    }

    #[test]
    fn test_value_of_tolerates_spacing_and_case() {
        let vault = vault_with(&[Finding::new("a@b.it", Category::Email)]);
        assert_eq!(vault.value_of("[EMAIL_1]"), Some("a@b.it"));
        assert_eq!(vault.value_of("[ email_1 ]"), Some("a@b.it"));
        assert_eq!(vault.value_of("EMAIL_1"), Some("a@b.it"));
        assert_eq!(vault.value_of("[EMAIL_2]"), None);
    }

    #[test]
    fn test_anonymize_tolerates_separators() {
        let vault = vault_with(&[
            Finding::new("Via Roma 1/A", Category::Address),
            Finding::new("IT60X0542811101000000123456", Category::Iban),
        ]);
        let text = "Sede in via roma 1 a. IBAN IT60 X054 2811 1010 0000 0123 456.";
        assert_eq!(anonymize(text, &vault), "Sede in [ADDRESS_1]. IBAN [IBAN_1].");
    }

    #[test]
    fn test_anonymize_respects_word_boundaries() {
        let vault = vault_with(&[Finding::new("Anna Neri", Category::FullName)]);
        assert_eq!(anonymize("Giovanna Neri e Anna Neri", &vault), "Giovanna Neri e [FULL_NAME_1]");
    }

    #[test]
    fn test_anonymize_longest_first() {
        let vault = vault_with(&[
            Finding::new("Rossi", Category::FullName),
            Finding::new("Rossi S.r.l.", Category::Organization),
        ]);
        assert_eq!(
            anonymize("Rossi lavora per Rossi S.r.l.", &vault),
            "[FULL_NAME_1] lavora per [ORGANIZATION_1]"
        );
    }

    #[test]
    fn test_trailing_separator_goes_into_token() {
        let vault = vault_with(&[Finding::new("Alfa Beta S.r.l.", Category::Organization)]);
        let text = "Alfa Beta S.r.l. ha sede a Torino, come ALFA BETA SRL";
        let anonymized = anonymize(text, &vault);
        assert_eq!(anonymized, "[ORGANIZATION_1] ha sede a Torino, come [ORGANIZATION_1]");
        assert_eq!(anonymize(&restore(&anonymized, &vault), &vault), anonymized);
    }

    #[test]
    fn test_anonymize_never_rewrites_tokens() {
        let vault = vault_with(&[Finding::new("EMAIL", Category::Other)]);
        assert_eq!(anonymize("[EMAIL_1] e EMAIL", &vault), "[EMAIL_1] e [OTHER_1]");
    }

    #[test]
    fn test_replacement_is_literal() {
        let mut vault = Vault::from_record(vec![("[OTHER_1]".to_string(), "codice $1".to_string())]);
        vault.tokenize(&Finding::new("codice $1", Category::Other));
        assert_eq!(anonymize("il codice $1 scade", &vault), "il [OTHER_1] scade");
    }

    #[test]
    fn test_aliases_anonymize_and_restore_to_canonical() {
        let mut vault = vault_with(&[Finding::new("Via Roma, 1 - Milano", Category::Address)]);
        assert!(vault.add_alias("Via Roma n. 1 Milano", "[ADDRESS_1]"));
        assert!(!vault.add_alias("via roma, 1 - milano", "[ADDRESS_1]"));
        assert!(!vault.add_alias("Corso Italia", "[ADDRESS_9]"));

        let anonymized = anonymize("Abita in Via Roma n. 1 Milano.", &vault);
        assert_eq!(anonymized, "Abita in [ADDRESS_1].");
        assert_eq!(restore(&anonymized, &vault), "Abita in Via Roma, 1 - Milano.");
        assert_eq!(vault.token_for("VIA ROMA N. 1 MILANO"), Some("[ADDRESS_1]"));
    }

    #[test]
    fn test_restore_leaves_unknown_tokens() {
        let vault = vault_with(&[Finding::new("Mario Rossi", Category::FullName)]);
        assert_eq!(
            restore("[ full_name_1 ] e [FULL_NAME_2]", &vault),
            "Mario Rossi e [FULL_NAME_2]"
        );
    }

    #[test]
    fn test_restore_is_single_pass() {
        let vault = Vault::from_record(vec![
            ("[OTHER_1]".to_string(), "[OTHER_2]".to_string()),
            ("[OTHER_2]".to_string(), "segreto".to_string()),
        ]);
        assert_eq!(restore("[OTHER_1]", &vault), "[OTHER_2]");
    }

    #[test]
    fn test_json_shape() {
        let mut vault = vault_with(&[Finding::new("Mario Rossi", Category::FullName)]);
        vault.add_alias("M. Rossi", "[FULL_NAME_1]");

        let json = vault.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["entries"]["[FULL_NAME_1]"], "Mario Rossi");
        assert_eq!(value["aliases"]["M. Rossi"], "[FULL_NAME_1]");

        assert_eq!(Vault::from_json(&json).unwrap(), vault);
        let bare = Vault::from_json(r#"{"entries": {"[EMAIL_1]": "a@b.it"}}"#).unwrap();
        assert_eq!(bare.to_record().get("[EMAIL_1]").map(String::as_str), Some("a@b.it"));
    }

    #[tokio::test]
    async fn test_shared_vault_serializes_minting() {
        let shared = SharedVault::default();
        let mut handles = Vec::new();
        for i in 0..8 {
            let shared = shared.clone();
            handles.push(tokio::spawn(async move {
                let finding = Finding::new(format!("utente{}@example.com", i), Category::Email);
                shared
                    .absorb_and_anonymize("testo", std::slice::from_ref(&finding), &[])
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let vault = shared.snapshot().await;
        let mut tokens: Vec<&str> = vault.entries().map(|(t, _)| t).collect();
        tokens.sort();
        tokens.dedup();
        assert_eq!(tokens.len(), 8);
        assert!(shared.restore("[EMAIL_8]").await.ends_with("@example.com"));
    }

    const NAMES: &[&str] = &["Mario Rossi", "Giulia Bianchi", "Luca Verdi", "Anna Neri"];
    const FILLER: &[&str] = &["il", "sig.", "abita", "con", "e", "presso", "in", "via"];

    proptest! {
        #[test]
        fn prop_same_value_same_token(idx in 0..NAMES.len(), upper in any::<bool>()) {
            let mut vault = vault_with(&[Finding::new(NAMES[idx], Category::FullName)]);
            let value = if upper { NAMES[idx].to_uppercase() } else { NAMES[idx].to_string() };
            let token = vault.tokenize(&Finding::new(value, Category::FullName));
            prop_assert_eq!(token, "[FULL_NAME_1]");
            prop_assert_eq!(vault.len(), 1);
        }

        #[test]
        fn prop_suffixes_strictly_increase(count in 1usize..20) {
            let mut vault = Vault::new();
            let suffixes: Vec<u64> = (0..count)
                .map(|i| {
                    let token = vault.tokenize(&Finding::new(format!("persona{}@example.com", i), Category::Email));
                    token.trim_start_matches("[EMAIL_").trim_end_matches(']').parse().unwrap()
                })
                .collect();
            prop_assert!(suffixes.windows(2).all(|w| w[0] < w[1]));
        }

        #[test]
        fn prop_round_trip(words in prop::collection::vec(
            prop_oneof![
                prop::sample::select(NAMES).prop_map(str::to_string),
                prop::sample::select(FILLER).prop_map(str::to_string),
            ],
            1..20,
        )) {
            let text = words.join(" ");
            let vault = vault_with(&NAMES.iter().map(|n| Finding::new(*n, Category::FullName)).collect::<Vec<_>>());

            let anonymized = anonymize(&text, &vault);
            let restored = restore(&anonymized, &vault);
            prop_assert_eq!(anonymize(&restored, &vault), anonymized.clone());

            let lower = anonymized.to_lowercase();
            for name in NAMES {
                prop_assert!(!lower.contains(&name.to_lowercase()));
            }
        }
    }
}
