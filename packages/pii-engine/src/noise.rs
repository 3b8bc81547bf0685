//! Noise filter for oracle output and unified findings.

use lazy_static::lazy_static;
use regex::Regex;

use crate::types::Finding;

/// Longer values are prose, not a sensitive value.
pub const MAX_WORDS: usize = 12;

/// Placeholders and technical tokens models echo back.
const GENERIC_VALUES: &[&str] = &[
    "n/a",
    "na",
    "n.a.",
    "null",
    "none",
    "nil",
    "nan",
    "undefined",
    "unknown",
    "placeholder",
    "redacted",
    "example",
    "sample",
    "test",
    "tbd",
    "xxx",
    "lorem ipsum",
    "true",
    "false",
    "string",
    "value",
    "valore",
    "category",
    "categoria",
    "json",
    "nessuno",
    "nessuna",
    "sconosciuto",
    "non disponibile",
    "non specificato",
    "not available",
    "not specified",
];

lazy_static! {
    // 9:05, 18.30, 10:15:00, 7 pm; a dotted triple is a date (12.03.85)
    static ref TIME_OF_DAY: Regex = Regex::new(
        r"(?i)^(?:[01]?\d|2[0-3])(?:[:.][0-5]\d|:[0-5]\d:[0-5]\d)\s*(?:[ap]\.?m\.?)?$|^\d{1,2}\s*[ap]\.?m\.?$"
    ).unwrap();

    static ref VAULT_TOKEN: Regex = Regex::new(
        r"(?i)^\[\s*[A-Z][A-Z_]*_\d+\s*\]$"
    ).unwrap();

    // <NAME>, {email}, [REDACTED], [[person]]
    static ref TEMPLATE_PLACEHOLDER: Regex = Regex::new(
        r"^[\[<{]+\s*[A-Za-z_ \-]+\s*[\]>}]+$"
    ).unwrap();

    static ref SHORT_NUMBER: Regex = Regex::new(r"^\d{1,4}$").unwrap();
}

/// Whether a value should never be treated as sensitive data.
pub fn is_noise(value: &str) -> bool {
    let value = value.trim();

    if value.chars().count() < 2 {
        return true;
    }
    if value.split_whitespace().count() > MAX_WORDS {
        return true;
    }
    if !value.chars().any(char::is_alphanumeric) {
        return true;
    }

    let lower = value.to_lowercase();
    if GENERIC_VALUES.contains(&lower.as_str()) {
        return true;
    }

    TIME_OF_DAY.is_match(value)
        || VAULT_TOKEN.is_match(value)
        || TEMPLATE_PLACEHOLDER.is_match(value)
        || SHORT_NUMBER.is_match(value)
}

/// Drop noisy findings, keeping order.
pub fn retain_meaningful(findings: Vec<Finding>) -> Vec<Finding> {
    findings
        .into_iter()
        .filter(|finding| {
            let noisy = is_noise(&finding.value);
            if noisy {
                tracing::trace!(value = %finding.value, "Dropping noise value");
            }
            !noisy
        })
        .collect()
}
