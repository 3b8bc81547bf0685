//! Core data model: categories, confidence tiers, candidates and findings.

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Category
// =============================================================================

/// Kind of sensitive data. The code (`FULL_NAME`, `IBAN`, ...) appears in tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    FullName,
    Organization,
    Birthplace,
    Address,
    Email,
    Phone,
    FiscalCode,
    VatNumber,
    Iban,
    CardNumber,
    IdDocument,
    Date,
    Url,
    IpAddress,
    Other,
}

/// Label keywords, most specific first. Keywords of four chars or fewer must
/// match a whole word.
const LABEL_KEYWORDS: &[(&str, Category)] = &[
    ("luogo di nascita", Category::Birthplace),
    ("place of birth", Category::Birthplace),
    ("birthplace", Category::Birthplace),
    ("birth place", Category::Birthplace),
    ("nato a", Category::Birthplace),
    ("nata a", Category::Birthplace),
    ("data di nascita", Category::Date),
    ("date of birth", Category::Date),
    ("birth date", Category::Date),
    ("birthdate", Category::Date),
    ("codice fiscale", Category::FiscalCode),
    ("fiscal code", Category::FiscalCode),
    ("tax code", Category::FiscalCode),
    ("tax id", Category::FiscalCode),
    ("cf", Category::FiscalCode),
    ("partita iva", Category::VatNumber),
    ("p iva", Category::VatNumber),
    ("piva", Category::VatNumber),
    ("vat", Category::VatNumber),
    ("iban", Category::Iban),
    ("bank account", Category::Iban),
    ("conto corrente", Category::Iban),
    ("carta d'identità", Category::IdDocument),
    ("carta di identità", Category::IdDocument),
    ("identity card", Category::IdDocument),
    ("id card", Category::IdDocument),
    ("passaporto", Category::IdDocument),
    ("passport", Category::IdDocument),
    ("patente", Category::IdDocument),
    ("driver", Category::IdDocument),
    ("documento", Category::IdDocument),
    ("document", Category::IdDocument),
    ("carta di credito", Category::CardNumber),
    ("credit card", Category::CardNumber),
    ("card", Category::CardNumber),
    ("carta", Category::CardNumber),
    ("email", Category::Email),
    ("e mail", Category::Email),
    ("posta elettronica", Category::Email),
    ("pec", Category::Email),
    ("ip", Category::IpAddress),
    ("url", Category::Url),
    ("website", Category::Url),
    ("sito", Category::Url),
    ("link", Category::Url),
    ("phone", Category::Phone),
    ("telefono", Category::Phone),
    ("cellulare", Category::Phone),
    ("mobile", Category::Phone),
    ("tel", Category::Phone),
    ("fax", Category::Phone),
    ("indirizzo", Category::Address),
    ("address", Category::Address),
    ("residenza", Category::Address),
    ("street", Category::Address),
    ("via", Category::Address),
    ("organization", Category::Organization),
    ("organisation", Category::Organization),
    ("organizzazione", Category::Organization),
    ("company", Category::Organization),
    ("società", Category::Organization),
    ("azienda", Category::Organization),
    ("ditta", Category::Organization),
    ("ente", Category::Organization),
    ("org", Category::Organization),
    ("full name", Category::FullName),
    ("fullname", Category::FullName),
    ("cognome", Category::FullName),
    ("surname", Category::FullName),
    ("persona", Category::FullName),
    ("person", Category::FullName),
    ("nome", Category::FullName),
    ("name", Category::FullName),
    ("data", Category::Date),
    ("date", Category::Date),
    ("dob", Category::Date),
];

impl Category {
    pub const ALL: [Category; 15] = [
        Category::FullName,
        Category::Organization,
        Category::Birthplace,
        Category::Address,
        Category::Email,
        Category::Phone,
        Category::FiscalCode,
        Category::VatNumber,
        Category::Iban,
        Category::CardNumber,
        Category::IdDocument,
        Category::Date,
        Category::Url,
        Category::IpAddress,
        Category::Other,
    ];

    /// Upper-snake code used inside vault tokens.
    pub fn code(&self) -> &'static str {
        match self {
            Self::FullName => "FULL_NAME",
            Self::Organization => "ORGANIZATION",
            Self::Birthplace => "BIRTHPLACE",
            Self::Address => "ADDRESS",
            Self::Email => "EMAIL",
            Self::Phone => "PHONE",
            Self::FiscalCode => "FISCAL_CODE",
            Self::VatNumber => "VAT_NUMBER",
            Self::Iban => "IBAN",
            Self::CardNumber => "CARD_NUMBER",
            Self::IdDocument => "ID_DOCUMENT",
            Self::Date => "DATE",
            Self::Url => "URL",
            Self::IpAddress => "IP_ADDRESS",
            Self::Other => "OTHER",
        }
    }

    pub fn default_label(&self) -> &'static str {
        match self {
            Self::FullName => "Full name",
            Self::Organization => "Organization",
            Self::Birthplace => "Place of birth",
            Self::Address => "Address",
            Self::Email => "Email",
            Self::Phone => "Phone number",
            Self::FiscalCode => "Fiscal code",
            Self::VatNumber => "VAT number",
            Self::Iban => "IBAN",
            Self::CardNumber => "Card number",
            Self::IdDocument => "Identity document",
            Self::Date => "Date",
            Self::Url => "URL",
            Self::IpAddress => "IP address",
            Self::Other => "Other",
        }
    }

    /// One-line definition shown to the discovery oracle.
    pub fn definition(&self) -> &'static str {
        match self {
            Self::FullName => "first and last name of a real person",
            Self::Organization => "company, firm, bank or public body name",
            Self::Birthplace => "city or town where a person was born",
            Self::Address => "street address, with or without house number, postcode and city",
            Self::Email => "email or certified-mail address",
            Self::Phone => "landline, mobile or fax number",
            Self::FiscalCode => "Italian codice fiscale (16 characters)",
            Self::VatNumber => "VAT / partita IVA number",
            Self::Iban => "bank account number in IBAN format",
            Self::CardNumber => "payment card number",
            Self::IdDocument => "identity card, passport or driving licence number",
            Self::Date => "date of birth or any other personal date",
            Self::Url => "web address that identifies a person or account",
            Self::IpAddress => "IPv4 or IPv6 address",
            Self::Other => "any other value that identifies a person",
        }
    }

    /// Names, organizations and birthplaces need context to be recognised.
    pub fn is_contextual(&self) -> bool {
        matches!(self, Self::FullName | Self::Organization | Self::Birthplace)
    }

    /// Everything with a fixed shape (and everything that isn't contextual).
    pub fn is_structural(&self) -> bool {
        !self.is_contextual() && *self != Self::Other
    }

    /// Parse a code exactly (`"FULL_NAME"`, `"iban"`).
    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.code().eq_ignore_ascii_case(code))
    }

    /// Map a free-form label (English or Italian, any casing) to a category.
    pub fn from_label(label: &str) -> Self {
        Self::match_label(label).unwrap_or(Self::Other)
    }

    /// Like [`Category::from_label`] but `None` when no keyword matches.
    pub fn match_label(label: &str) -> Option<Self> {
        if let Some(category) = Self::from_code(label) {
            return Some(category);
        }

        let normalized: String = label
            .to_lowercase()
            .chars()
            .map(|c| if matches!(c, '_' | '-' | '.' | '/') { ' ' } else { c })
            .collect();
        let normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");
        if normalized.is_empty() {
            return None;
        }
        if matches!(normalized.as_str(), "other" | "altro" | "misc") {
            return Some(Self::Other);
        }

        let words: Vec<&str> = normalized
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        LABEL_KEYWORDS
            .iter()
            .find(|(keyword, _)| {
                if keyword.chars().count() <= 4 && !keyword.contains(' ') {
                    words.contains(keyword)
                } else {
                    normalized.contains(keyword)
                }
            })
            .map(|(_, category)| *category)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// =============================================================================
// Confidence
// =============================================================================

/// Ordered confidence tier: `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

// =============================================================================
// Candidate
// =============================================================================

/// Byte offset and length of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub offset: usize,
    pub length: usize,
}

impl Span {
    pub fn end(&self) -> usize {
        self.offset + self.length
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

/// A value proposed by the pattern scanner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub value: String,
    pub category: Category,
    pub confidence: ConfidenceTier,
    /// First occurrence
    pub span: Span,
    /// Text surrounding the first occurrence
    pub context: String,
}

// =============================================================================
// Finding
// =============================================================================

/// A confirmed sensitive value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub value: String,
    pub category: Category,
    pub label: String,
}

impl Finding {
    pub fn new(value: impl Into<String>, category: Category) -> Self {
        Self {
            value: value.into(),
            category,
            label: category.default_label().to_string(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Uniqueness key, see [`finding_key`].
    pub fn key(&self) -> String {
        finding_key(&self.value)
    }
}

impl From<&Candidate> for Finding {
    fn from(candidate: &Candidate) -> Self {
        Finding::new(candidate.value.clone(), candidate.category)
    }
}

/// Trimmed, whitespace-collapsed, lowercase form of a value.
pub fn finding_key(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
