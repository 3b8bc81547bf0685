//! Deterministic pattern scanner.
//!
//! Three passes write into one ordered candidate set:
//! - structural patterns (email, IBAN, fiscal code, ...) gated by checksums
//! - heuristic indicators (titles, legal roles, locatives, legal-form suffixes)
//! - dictionary cross-reference of capitalized word pairs
//!
//! The scanner is pure: same text in, same candidates out.

mod dictionary;
mod indicators;
mod patterns;

use indexmap::IndexMap;
use tracing::debug;

use crate::types::{Candidate, Category, ConfidenceTier, Span};

pub use dictionary::{is_known_first_name, is_known_surname};

/// Bytes of text kept on each side of a candidate's first occurrence.
const CONTEXT_RADIUS: usize = 40;

/// Scan text for candidate sensitive values.
pub fn scan(text: &str) -> Vec<Candidate> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut set = CandidateSet::new(text);
    patterns::scan_structural(text, &mut set);
    indicators::scan_indicators(text, &mut set);
    dictionary::scan_dictionary(text, &mut set);

    let candidates = set.into_candidates();
    debug!(count = candidates.len(), text_len = text.len(), "Pattern scan complete");
    candidates
}

/// Ordered, deduplicated candidates keyed on `(category, uppercased value)`.
pub(crate) struct CandidateSet<'t> {
    text: &'t str,
    entries: IndexMap<(Category, String), Candidate>,
}

impl<'t> CandidateSet<'t> {
    pub(crate) fn new(text: &'t str) -> Self {
        Self {
            text,
            entries: IndexMap::new(),
        }
    }

    /// Record a match at `offset`. A repeat only ever raises the confidence.
    pub(crate) fn offer(
        &mut self,
        value: &str,
        category: Category,
        confidence: ConfidenceTier,
        offset: usize,
    ) {
        let value = value.trim();
        if value.is_empty() {
            return;
        }

        let key = (category, value.to_uppercase());
        if let Some(existing) = self.entries.get_mut(&key) {
            if confidence > existing.confidence {
                existing.confidence = confidence;
            }
            return;
        }

        let span = Span {
            offset,
            length: value.len(),
        };
        let context = context_window(self.text, span).to_string();
        self.entries.insert(
            key,
            Candidate {
                value: value.to_string(),
                category,
                confidence,
                span,
                context,
            },
        );
    }

    pub(crate) fn into_candidates(self) -> Vec<Candidate> {
        self.entries.into_values().collect()
    }
}

/// Slice around `span`, widened to char boundaries.
fn context_window(text: &str, span: Span) -> &str {
    let mut start = span.offset.saturating_sub(CONTEXT_RADIUS);
    while start > 0 && !text.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (span.end() + CONTEXT_RADIUS).min(text.len());
    while end < text.len() && !text.is_char_boundary(end) {
        end += 1;
    }
    &text[start..end]
}

/// Words that start sentences or clauses and are never part of a name.
pub(crate) const SENTENCE_STARTERS: &[&str] = &[
    "il", "lo", "la", "i", "gli", "le", "un", "uno", "una", "per", "con", "che", "del", "della",
    "dei", "delle", "dal", "dalla", "nel", "nella", "in", "non", "si", "se", "ha", "hanno", "è",
    "e", "ed", "o", "ma", "come", "questo", "questa", "quando", "dove", "oggi", "ieri", "sono",
    "the", "this", "that", "these", "those", "a", "an", "and", "or", "but", "for", "with", "has",
    "have", "is", "was", "were", "are", "it", "in", "on", "at", "by", "from", "to", "of", "as",
    "if", "when", "where", "dear", "caro", "cara", "gentile", "egregio", "spettabile", "via",
    "piazza", "corso", "viale", "street", "avenue", "road",
];

pub(crate) fn is_stoplisted(word: &str) -> bool {
    let lower = word.to_lowercase();
    let lower = lower.trim_end_matches(['.', ',', ':', ';']);
    SENTENCE_STARTERS.contains(&lower)
}

/// Starts with an uppercase letter and contains only letters, apostrophes or hyphens.
pub(crate) fn is_capitalized(word: &str) -> bool {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) if first.is_uppercase() => {
            chars.all(|c| c.is_alphabetic() || matches!(c, '\'' | '’' | '-'))
        }
        _ => false,
    }
}
