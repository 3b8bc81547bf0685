use lazy_static::lazy_static;
use regex::Regex;
use tracing::trace;

use super::CandidateSet;
use crate::types::{Category, ConfidenceTier, Span};
use crate::validators::{is_valid_fiscal_code, is_valid_iban, is_valid_luhn, is_valid_vat_number};

/// Characters before a dotted quad searched for a version marker.
const VERSION_MARKER_WINDOW: usize = 24;

const MONTHS: &str = "gennaio|febbraio|marzo|aprile|maggio|giugno|luglio|agosto|settembre|ottobre|novembre|dicembre|january|february|march|april|may|june|july|august|september|october|november|december|gen|feb|mar|apr|mag|giu|lug|ago|set|ott|nov|dic|jan|jun|jul|aug|sept|sep|oct|dec";

lazy_static! {
    // Email pattern - RFC 5322 simplified
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"(?i)\b[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}\b"
    ).unwrap();

    static ref URL_REGEX: Regex = Regex::new(
        r#"(?i)\b(?:https?://|www\.)[^\s<>"'()\[\]]+"#
    ).unwrap();

    // Country code, check digits, 11 to 30 alphanumerics optionally grouped by 4
    static ref IBAN_REGEX: Regex = Regex::new(
        r"(?i)\b[A-Z]{2}\d{2}(?: ?[A-Z0-9]{4}){2,7}(?: ?[A-Z0-9]{1,4})?\b"
    ).unwrap();

    static ref FISCAL_CODE_REGEX: Regex = Regex::new(
        r"(?i)\b[A-Z]{6}[0-9LMNPQRSTUV]{2}[ABCDEHLMPRST][0-9LMNPQRSTUV]{2}[A-Z][0-9LMNPQRSTUV]{3}[A-Z]\b"
    ).unwrap();

    // Credit card numbers - grouped 4-4-4-4, Amex 4-6-5, or 13 to 19 bare digits
    static ref CARD_REGEX: Regex = Regex::new(
        r"\b(?:\d{4}[-\s]?){3}\d{4}\b|\b\d{4}[-\s]?\d{6}[-\s]?\d{5}\b|\b\d{13,19}\b"
    ).unwrap();

    static ref VAT_REGEX: Regex = Regex::new(
        r"(?i)\b(?:IT\s?)?\d{11}\b"
    ).unwrap();

    // CIE (CA12345AB) and passport (YA1234567)
    static ref ID_DOCUMENT_REGEX: Regex = Regex::new(
        r"\b(?:[A-Z]{2}\d{5}[A-Z]{2}|[A-Z]{2}\d{7})\b"
    ).unwrap();

    // IPv4 addresses
    static ref IPV4_REGEX: Regex = Regex::new(
        r"\b(?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\b"
    ).unwrap();

    // IPv6 addresses (simplified)
    static ref IPV6_REGEX: Regex = Regex::new(
        r"\b(?:[0-9a-fA-F]{1,4}:){7}[0-9a-fA-F]{1,4}\b"
    ).unwrap();

    // dd/mm/yyyy, dd.mm.yyyy, dd-mm-yyyy (separator must repeat)
    static ref NUMERIC_DATE_REGEX: Regex = Regex::new(
        r"\b(?:0?[1-9]|[12]\d|3[01])(?:/(?:0?[1-9]|1[0-2])/|\.(?:0?[1-9]|1[0-2])\.|-(?:0?[1-9]|1[0-2])-)(?:\d{4}|\d{2})\b"
    ).unwrap();

    static ref ISO_DATE_REGEX: Regex = Regex::new(
        r"\b(?:19|20)\d{2}-(?:0[1-9]|1[0-2])-(?:0[1-9]|[12]\d|3[01])\b"
    ).unwrap();

    // 12 marzo 1985, 1° gennaio 2020
    static ref DAY_FIRST_DATE_REGEX: Regex = Regex::new(&format!(
        r"(?i)\b(?:0?[1-9]|[12]\d|3[01])(?:°|º)?\s+(?:{})\.?\s+\d{{4}}\b",
        MONTHS
    )).unwrap();

    // March 12, 1985
    static ref MONTH_FIRST_DATE_REGEX: Regex = Regex::new(&format!(
        r"(?i)\b(?:{})\.?\s+(?:0?[1-9]|[12]\d|3[01])(?:st|nd|rd|th)?,?\s+\d{{4}}\b",
        MONTHS
    )).unwrap();

    // "v", "ver.", "version", "versione", "release", "build" right before a dotted quad
    static ref VERSION_MARKER: Regex = Regex::new(
        r"(?i)\b(?:v|ver\.?|version[ei]?|release|build)\s*:?\s*$"
    ).unwrap();

    // +39 333 1234567, 0039 02 1234567, (555) 123-4567, 06 12345678
    static ref PHONE_REGEX: Regex = Regex::new(
        r"(?:(?:\+|\b00)\d{1,3}[\s.\-]?)?(?:\(\d{2,4}\)|\b\d{2,4})[\s.\-]?\d{3,4}[\s.\-]?\d{3,4}\b"
    ).unwrap();
}

/// One structural rule: matches are accepted only if `accept` holds.
struct Rule {
    category: Category,
    regex: &'static Regex,
    /// Called with the matched value and the text before it.
    accept: fn(&str, &str) -> bool,
}

fn always(_: &str, _: &str) -> bool {
    true
}

/// Rules in priority order.
fn rules() -> [Rule; 14] {
    [
        Rule { category: Category::Email, regex: &EMAIL_REGEX, accept: always },
        Rule { category: Category::Url, regex: &URL_REGEX, accept: always },
        Rule { category: Category::Iban, regex: &IBAN_REGEX, accept: |v, _| is_valid_iban(v) },
        Rule { category: Category::FiscalCode, regex: &FISCAL_CODE_REGEX, accept: |v, _| is_valid_fiscal_code(v) },
        Rule { category: Category::CardNumber, regex: &CARD_REGEX, accept: |v, _| is_valid_luhn(v) },
        Rule { category: Category::VatNumber, regex: &VAT_REGEX, accept: |v, _| is_valid_vat_number(v) },
        Rule { category: Category::IdDocument, regex: &ID_DOCUMENT_REGEX, accept: always },
        Rule { category: Category::IpAddress, regex: &IPV4_REGEX, accept: is_plausible_ipv4 },
        Rule { category: Category::IpAddress, regex: &IPV6_REGEX, accept: always },
        Rule { category: Category::Date, regex: &NUMERIC_DATE_REGEX, accept: always },
        Rule { category: Category::Date, regex: &ISO_DATE_REGEX, accept: always },
        Rule { category: Category::Date, regex: &DAY_FIRST_DATE_REGEX, accept: always },
        Rule { category: Category::Date, regex: &MONTH_FIRST_DATE_REGEX, accept: always },
        Rule { category: Category::Phone, regex: &PHONE_REGEX, accept: |v, _| is_plausible_phone(v) },
    ]
}

/// Apply every structural rule; a match overlapping a claimed one is skipped.
///
/// Accepted matches claim their span, and so do rejected grouped card numbers
/// and VAT numbers, whose digits are never re-read as a phone.
pub(super) fn scan_structural(text: &str, set: &mut CandidateSet<'_>) {
    let mut claimed: Vec<Span> = Vec::new();

    for rule in rules() {
        for mat in rule.regex.find_iter(text) {
            let value = match rule.category {
                Category::Url => mat.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?']),
                Category::Iban => longest_valid_iban(mat.as_str()),
                _ => mat.as_str(),
            };
            let span = Span {
                offset: mat.start(),
                length: value.len(),
            };

            if claimed.iter().any(|c| c.overlaps(&span)) {
                continue;
            }
            if !(rule.accept)(value, &text[..mat.start()]) {
                trace!(category = %rule.category, "Structural match rejected by validator");
                if claims_when_rejected(rule.category, value) {
                    claimed.push(span);
                }
                continue;
            }

            claimed.push(span);
            set.offer(value, rule.category, structural_confidence(rule.category), span.offset);
        }
    }
}

fn structural_confidence(category: Category) -> ConfidenceTier {
    match category {
        Category::Phone | Category::Date => ConfidenceTier::Medium,
        _ => ConfidenceTier::High,
    }
}

/// IBAN groups can run into the following word; drop trailing groups until the checksum holds.
fn longest_valid_iban(matched: &str) -> &str {
    let mut value = matched;
    while !is_valid_iban(value) {
        match value.rsplit_once(' ') {
            Some((head, _)) => value = head.trim_end(),
            None => return matched,
        }
    }
    value
}

fn claims_when_rejected(category: Category, value: &str) -> bool {
    match category {
        Category::VatNumber => true,
        Category::CardNumber => value.chars().any(|c| !c.is_ascii_digit()),
        _ => false,
    }
}

/// A dotted quad right after a version marker is a version, not an address.
fn is_plausible_ipv4(_: &str, before: &str) -> bool {
    let tail = before
        .char_indices()
        .rev()
        .nth(VERSION_MARKER_WINDOW)
        .map_or(before, |(i, _)| &before[i..]);
    !VERSION_MARKER.is_match(tail)
}

fn is_plausible_phone(phone: &str) -> bool {
    let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
    (8..=15).contains(&digits)
}
