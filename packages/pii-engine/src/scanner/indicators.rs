use lazy_static::lazy_static;
use regex::Regex;

use super::{is_capitalized, is_stoplisted, CandidateSet};
use crate::types::{Category, ConfidenceTier};

/// Up to four capitalized words separated by spaces or tabs.
const NAME_RUN: &str = r"\p{Lu}[\p{L}'’\-]*(?:[ \t]+\p{Lu}[\p{L}'’\-]*){0,3}";

const PERSON_INTRODUCERS: &str = r"sig\.ra|sig\.na|sigg\.|sig\.|signora|signor|sig|dott\.ssa|dott\.|dott|dr\.|dr|avv\.|avv|ing\.|prof\.ssa|prof\.|prof|geom\.|rag\.|mr\.|mrs\.|mrs|mr|ms\.|ms|miss|ricorrente|resistente|convenut[oa]|attore|attrice|sottoscritt[oa]|intestatari[oa]|legale\s+rappresentante|amministratore|titolare|dichiarante|richiedente|delegat[oa]|ered[ei]|plaintiff|defendant|tenant|landlord|claimant|applicant|undersigned|account\s+holder";

const ORG_INTRODUCERS: &str = r"società|soc\.|ditta|azienda|impresa|banca|istituto|studio|associazione|fondazione|cooperativa|consorzio|company|firm|bank|corporation";

const BIRTHPLACE_INTRODUCERS: &str = r"nat[oa]\s+a|nat[oa]\s+in|born\s+in|born\s+at|luogo\s+di\s+nascita\s*:?|place\s+of\s+birth\s*:?";

lazy_static! {
    static ref PERSON_REGEX: Regex = Regex::new(&format!(
        r"\b(?i:{})\s+({})",
        PERSON_INTRODUCERS, NAME_RUN
    )).unwrap();

    static ref ORG_REGEX: Regex = Regex::new(&format!(
        r"\b(?i:{})\s+({})",
        ORG_INTRODUCERS, NAME_RUN
    )).unwrap();

    static ref BIRTHPLACE_REGEX: Regex = Regex::new(&format!(
        r"\b(?i:{})\s+({})",
        BIRTHPLACE_INTRODUCERS, NAME_RUN
    )).unwrap();

    // Acme Italia S.r.l., Globex Inc., Initech LLC
    static ref ORG_SUFFIX_REGEX: Regex = Regex::new(
        r"(\p{Lu}[\p{L}\p{N}&'’\-]*(?:[ \t]+\p{Lu}[\p{L}\p{N}&'’\-]*){0,3})[ \t]*,?[ \t]+(?:(?i:s\.p\.a\.?|s\.r\.l\.?|s\.n\.c\.?|s\.a\.s\.?|inc\.|ltd\.)|\b(?:SpA|SPA|Srl|SRL|Snc|Sas|Inc|Ltd|LLC|GmbH)\b)"
    ).unwrap();

    static ref WORD: Regex = Regex::new(r"\S+").unwrap();
}

struct IndicatorRule {
    category: Category,
    regex: &'static Regex,
    min_words: usize,
}

fn rules() -> [IndicatorRule; 3] {
    [
        IndicatorRule { category: Category::FullName, regex: &PERSON_REGEX, min_words: 2 },
        IndicatorRule { category: Category::Organization, regex: &ORG_REGEX, min_words: 1 },
        IndicatorRule { category: Category::Birthplace, regex: &BIRTHPLACE_REGEX, min_words: 1 },
    ]
}

pub(super) fn scan_indicators(text: &str, set: &mut CandidateSet<'_>) {
    for rule in rules() {
        for caps in rule.regex.captures_iter(text) {
            let Some(run) = caps.get(1) else { continue };
            if let Some(value) = capitalized_prefix(run.as_str(), rule.min_words) {
                set.offer(value, rule.category, ConfidenceTier::Medium, run.start());
            }
        }
    }

    scan_legal_suffixes(text, set);
}

/// Longest accepted prefix of a capitalized run.
///
/// The run stops at the first stoplisted word; a stoplisted first word or a
/// word failing the capitalization test rejects the whole run.
fn capitalized_prefix(run: &str, min_words: usize) -> Option<&str> {
    let mut end = None;
    let mut count = 0;

    for (idx, word) in WORD.find_iter(run).enumerate() {
        if is_stoplisted(word.as_str()) {
            if idx == 0 {
                return None;
            }
            break;
        }
        if !is_capitalized(word.as_str()) {
            return None;
        }
        end = Some(word.end());
        count += 1;
    }

    if count < min_words {
        return None;
    }
    end.map(|e| &run[..e])
}

/// Organizations named by a trailing legal-form suffix.
fn scan_legal_suffixes(text: &str, set: &mut CandidateSet<'_>) {
    for caps in ORG_SUFFIX_REGEX.captures_iter(text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };

        // "La Acme S.r.l." names "Acme S.r.l."
        let mut start = name.start();
        for word in WORD.find_iter(name.as_str()) {
            if is_stoplisted(word.as_str()) {
                start = name.start() + word.end();
            } else {
                break;
            }
        }
        if start >= name.end() {
            continue;
        }

        let slice = &text[start..whole.end()];
        let value = slice.trim_start();
        let offset = start + (slice.len() - value.len());
        set.offer(value, Category::Organization, ConfidenceTier::Medium, offset);
    }
}
