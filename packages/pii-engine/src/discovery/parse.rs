//! Rescue parser for free-text oracle output.
//!
//! Models wrap JSON in prose, fences or markdown, or skip JSON entirely. Each
//! tier returns `None` when it finds nothing and the next tier gets a turn:
//! strict JSON, fenced blocks, balanced-bracket substrings, `KEY: VALUE` lines.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use crate::types::{Category, Finding};

const VALUE_FIELDS: &[&str] = &["value", "text", "valore", "entity", "match"];
const CATEGORY_FIELDS: &[&str] = &["category", "type", "label", "categoria", "entity_type", "kind"];
const WRAPPER_FIELDS: &[&str] = &["findings", "entities", "items", "results", "pii", "data"];

lazy_static! {
    static ref FENCED_BLOCK: Regex = Regex::new(r"(?s)```[A-Za-z]*[ \t]*\r?\n?(.*?)```").unwrap();
    static ref LIST_MARKER: Regex = Regex::new(r"^(?:[-*+>#]+|\d+[.)])\s*").unwrap();
}

/// A value as reported by the oracle, before category resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFinding {
    pub value: String,
    pub label: Option<String>,
}

impl RawFinding {
    fn new(value: impl Into<String>, label: Option<String>) -> Self {
        Self {
            value: value.into(),
            label,
        }
    }

    /// Resolve the label to a category; a custom label is kept.
    pub fn into_finding(self) -> Finding {
        let value = self.value.trim().to_string();
        match self.label.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()) {
            Some(label) => {
                let category = Category::from_label(&label);
                if Category::from_code(&label).is_some() {
                    Finding::new(value, category)
                } else {
                    Finding::new(value, category).with_label(label)
                }
            }
            None => Finding::new(value, Category::Other),
        }
    }
}

/// Run the tier cascade; empty when every tier comes up empty.
pub fn parse_response(response: &str) -> Vec<RawFinding> {
    parse_strict(response)
        .or_else(|| parse_fenced(response))
        .or_else(|| parse_balanced(response))
        .or_else(|| parse_lines(response))
        .unwrap_or_default()
}

fn non_empty(findings: Vec<RawFinding>) -> Option<Vec<RawFinding>> {
    if findings.is_empty() {
        None
    } else {
        Some(findings)
    }
}

/// Tier 1: the whole response is JSON.
pub fn parse_strict(response: &str) -> Option<Vec<RawFinding>> {
    let value: Value = serde_json::from_str(response.trim()).ok()?;
    non_empty(findings_from_value(&value))
}

/// Tier 2: every fenced code block.
pub fn parse_fenced(response: &str) -> Option<Vec<RawFinding>> {
    non_empty(fenced_values(response).iter().flat_map(findings_from_value).collect())
}

/// Tier 3: every well-formed `{...}` or `[...]` substring.
pub fn parse_balanced(response: &str) -> Option<Vec<RawFinding>> {
    non_empty(balanced_values(response).iter().flat_map(findings_from_value).collect())
}

/// First JSON object the strict, fenced or balanced tiers can find.
pub(crate) fn first_json_object(response: &str) -> Option<serde_json::Map<String, Value>> {
    let strict = serde_json::from_str::<Value>(response.trim()).ok();
    strict
        .into_iter()
        .chain(fenced_values(response))
        .chain(balanced_values(response))
        .find_map(|value| match value {
            Value::Object(map) => Some(map),
            _ => None,
        })
}

fn fenced_values(response: &str) -> Vec<Value> {
    FENCED_BLOCK
        .captures_iter(response)
        .filter_map(|caps| caps.get(1))
        .filter_map(|body| serde_json::from_str::<Value>(body.as_str().trim()).ok())
        .collect()
}

fn balanced_values(response: &str) -> Vec<Value> {
    let bytes = response.as_bytes();
    let mut values = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'{' || bytes[i] == b'[' {
            if let Some(end) = matching_close(bytes, i) {
                if let Ok(value) = serde_json::from_str::<Value>(&response[i..=end]) {
                    values.push(value);
                    i = end + 1;
                    continue;
                }
            }
        }
        i += 1;
    }

    values
}

/// Index of the bracket closing the one at `open`, skipping string literals.
fn matching_close(bytes: &[u8], open: usize) -> Option<usize> {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[open..].iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => stack.push(b'}'),
            b'[' => stack.push(b']'),
            b'}' | b']' => {
                if stack.pop() != Some(b) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }

    None
}

/// Tier 4: `KEY: VALUE` lines whose key names a category.
pub fn parse_lines(response: &str) -> Option<Vec<RawFinding>> {
    let mut findings = Vec::new();

    for line in response.lines() {
        let cleaned = line.replace("**", "").replace("__", "").replace('`', "");
        let cleaned = LIST_MARKER.replace(cleaned.trim(), "");

        let Some((key, value)) = cleaned.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() || Category::match_label(key).is_none() {
            continue;
        }

        for part in value.split(';').flat_map(|p| p.split(" | ")) {
            let part = part.trim().trim_matches(|c| c == '"' || c == '\'').trim();
            if !part.is_empty() {
                findings.push(RawFinding::new(part, Some(key.to_string())));
            }
        }
    }

    non_empty(findings)
}

/// Accepted JSON shapes: arrays of objects or strings, wrapper objects,
/// single items and `{CATEGORY: value | [values]}` maps.
fn findings_from_value(value: &Value) -> Vec<RawFinding> {
    match value {
        Value::Array(items) => items
            .iter()
            .flat_map(|item| match item {
                Value::String(s) => vec![RawFinding::new(s.clone(), None)],
                other => findings_from_value(other),
            })
            .collect(),
        Value::Object(map) => {
            for field in WRAPPER_FIELDS {
                if let Some(inner @ (Value::Array(_) | Value::Object(_))) = map.get(*field) {
                    return findings_from_value(inner);
                }
            }

            if let Some(item) = item_from_object(map) {
                return vec![item];
            }

            map.iter()
                .filter(|(key, _)| Category::match_label(key).is_some())
                .flat_map(|(key, v)| {
                    scalar_strings(v)
                        .into_iter()
                        .map(|s| RawFinding::new(s, Some(key.clone())))
                        .collect::<Vec<_>>()
                })
                .collect()
        }
        _ => Vec::new(),
    }
}

fn item_from_object(map: &serde_json::Map<String, Value>) -> Option<RawFinding> {
    let value = VALUE_FIELDS
        .iter()
        .find_map(|f| map.get(*f).and_then(scalar_string))?;
    let label = CATEGORY_FIELDS
        .iter()
        .find_map(|f| map.get(*f).and_then(scalar_string));
    Some(RawFinding::new(value, label))
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn scalar_strings(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(scalar_string).collect(),
        other => scalar_string(other).into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn values(findings: &[RawFinding]) -> Vec<&str> {
        findings.iter().map(|f| f.value.as_str()).collect()
    }

    #[test]
    fn test_strict_array_of_objects() {
        let parsed = parse_response(
            r#"[{"value": "Mario Rossi", "category": "FULL_NAME"}, {"text": "Napoli", "type": "birthplace"}]"#,
        );
        assert_eq!(values(&parsed), vec!["Mario Rossi", "Napoli"]);
        assert_eq!(parsed[1].label.as_deref(), Some("birthplace"));
    }

    #[test]
    fn test_array_of_strings() {
        let parsed = parse_response(r#"["Mario Rossi", "Via Roma 1"]"#);
        assert_eq!(values(&parsed), vec!["Mario Rossi", "Via Roma 1"]);
        assert!(parsed.iter().all(|f| f.label.is_none()));
    }

    #[test]
    fn test_wrapper_object() {
        let parsed = parse_response(r#"{"entities": [{"entity": "ACME", "entity_type": "company"}]}"#);
        assert_eq!(values(&parsed), vec!["ACME"]);
        assert_eq!(parsed[0].label.as_deref(), Some("company"));
    }

    #[test]
    fn test_single_item_object() {
        let parsed = parse_response(r#"{"valore": "RSSMRA85T10A562S", "categoria": "codice fiscale"}"#);
        assert_eq!(values(&parsed), vec!["RSSMRA85T10A562S"]);
    }

    #[test]
    fn test_category_map() {
        let parsed = parse_response(
            r#"{"FULL_NAME": ["Mario Rossi", "Anna Neri"], "EMAIL": "a@b.it", "reasoning": "skip me"}"#,
        );
        let mut got = values(&parsed);
        got.sort();
        assert_eq!(got, vec!["Anna Neri", "Mario Rossi", "a@b.it"]);
    }

    #[test]
    fn test_fenced_blocks() {
        let response = "Here you go:\n```json\n[{\"value\": \"Mario Rossi\", \"category\": \"FULL_NAME\"}]\n```\nand\n```\n[\"Napoli\"]\n```";
        let parsed = parse_response(response);
        assert_eq!(values(&parsed), vec!["Mario Rossi", "Napoli"]);
    }

    #[test]
    fn test_balanced_scan_in_prose() {
        let response = r#"I found {"value": "Mario [Rossi]", "category": "FULL_NAME"} and also {broken and then {"value": "Napoli"}."#;
        let parsed = parse_response(response);
        assert_eq!(values(&parsed), vec!["Mario [Rossi]", "Napoli"]);
    }

    #[test]
    fn test_line_fallback() {
        let response = "Ecco i dati:\n- **Nome:** Mario Rossi\n* Codice fiscale: `RSSMRA85T10A562S`\n1. Email: a@b.it; c@d.it\nNota: niente altro\n# Telefono: 333 1234567 | 06 1234567";
        let parsed = parse_response(response);
        assert_eq!(
            values(&parsed),
            vec!["Mario Rossi", "RSSMRA85T10A562S", "a@b.it", "c@d.it", "333 1234567", "06 1234567"]
        );
        assert_eq!(parsed[1].label.as_deref(), Some("Codice fiscale"));
    }

    #[test]
    fn test_nothing_found() {
        assert!(parse_response("I could not find anything.").is_empty());
        assert!(parse_response("[]").is_empty());
        assert!(parse_response("").is_empty());
    }

    #[test]
    fn test_first_json_object() {
        let map = first_json_object("Sure! {\"a\": \"b\"} done").unwrap();
        assert_eq!(map.get("a").and_then(Value::as_str), Some("b"));
        assert!(first_json_object("[1, 2]").is_none());
    }

    #[test]
    fn test_into_finding_resolves_labels() {
        let code = RawFinding::new(" Mario Rossi ", Some("FULL_NAME".into())).into_finding();
        assert_eq!(code.category, Category::FullName);
        assert_eq!(code.label, Category::FullName.default_label());
        assert_eq!(code.value, "Mario Rossi");

        let custom = RawFinding::new("Napoli", Some("Luogo di nascita".into())).into_finding();
        assert_eq!(custom.category, Category::Birthplace);
        assert_eq!(custom.label, "Luogo di nascita");

        let bare = RawFinding::new("x y", None).into_finding();
        assert_eq!(bare.category, Category::Other);
    }

    proptest! {
        #[test]
        fn parser_never_panics(input in ".{0,400}") {
            let _ = parse_response(&input);
        }

        #[test]
        fn wrapped_json_survives_prose(prefix in "[a-zA-Z ,.]{0,40}", suffix in "[a-zA-Z ,.]{0,40}") {
            let response = format!("{}[{{\"value\": \"Mario Rossi\", \"category\": \"FULL_NAME\"}}]{}", prefix, suffix);
            let parsed = parse_response(&response);
            prop_assert_eq!(values(&parsed), vec!["Mario Rossi"]);
        }
    }
}
