//! Field values produced by the value generation oracle.
//!
//! A value is a string, a boolean, or the "insufficient evidence" sentinel:
//! `N/A_<suffix>` optionally followed by an explanation, e.g.
//! `N/A_ss — no salary evidence provided`. The prefix is case-insensitive;
//! the suffix must be one of the seven evidence categories below.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::documents::models::DocumentCategory;
use crate::form::normalize::normalize_field_name;

pub const SENTINEL_PREFIX: &str = "N/A_";

/// Why a field could not be filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceCategory {
    PersonalInfo,
    Resume,
    RecommendationLetter,
    AwardRecognition,
    Publication,
    SalarySuccess,
    ProfessionalMembership,
}

impl EvidenceCategory {
    pub const ALL: [EvidenceCategory; 7] = [
        EvidenceCategory::PersonalInfo,
        EvidenceCategory::Resume,
        EvidenceCategory::RecommendationLetter,
        EvidenceCategory::AwardRecognition,
        EvidenceCategory::Publication,
        EvidenceCategory::SalarySuccess,
        EvidenceCategory::ProfessionalMembership,
    ];

    /// Sentinel suffix, e.g. `ss` in `N/A_ss`.
    pub fn suffix(&self) -> &'static str {
        match self {
            EvidenceCategory::PersonalInfo => "per",
            EvidenceCategory::Resume => "res",
            EvidenceCategory::RecommendationLetter => "rl",
            EvidenceCategory::AwardRecognition => "ar",
            EvidenceCategory::Publication => "pub",
            EvidenceCategory::SalarySuccess => "ss",
            EvidenceCategory::ProfessionalMembership => "pm",
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|category| category.suffix().eq_ignore_ascii_case(suffix))
    }

    /// The upload that would supply the missing evidence, if any.
    pub fn document_category(&self) -> Option<DocumentCategory> {
        match self {
            EvidenceCategory::PersonalInfo => None,
            EvidenceCategory::Resume => Some(DocumentCategory::Resume),
            EvidenceCategory::RecommendationLetter => Some(DocumentCategory::Recommendation),
            EvidenceCategory::AwardRecognition => Some(DocumentCategory::Awards),
            EvidenceCategory::Publication => Some(DocumentCategory::Publications),
            EvidenceCategory::SalarySuccess => Some(DocumentCategory::Salary),
            EvidenceCategory::ProfessionalMembership => Some(DocumentCategory::Membership),
        }
    }
}

impl fmt::Display for EvidenceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SENTINEL_PREFIX}{}", self.suffix())
    }
}

/// A parsed "insufficient evidence" marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentinel {
    pub category: EvidenceCategory,
    /// The marker exactly as the oracle wrote it.
    pub raw: String,
}

/// Recognizes the sentinel grammar. Returns `None` for anything else,
/// including an `N/A_` prefix with an unknown suffix.
pub fn parse_sentinel(value: &str) -> Option<Sentinel> {
    let trimmed = value.trim();
    let prefix = trimmed.get(..SENTINEL_PREFIX.len())?;
    if !prefix.eq_ignore_ascii_case(SENTINEL_PREFIX) {
        return None;
    }
    let rest = &trimmed[SENTINEL_PREFIX.len()..];
    let suffix_len = rest
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .count();
    if !(2..=3).contains(&suffix_len) {
        return None;
    }
    let category = EvidenceCategory::from_suffix(&rest[..suffix_len])?;
    Some(Sentinel {
        category,
        raw: trimmed.to_string(),
    })
}

/// One value assigned to a field by the oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Flag(bool),
    Insufficient(Sentinel),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        match parse_sentinel(&value) {
            Some(sentinel) => FieldValue::Insufficient(sentinel),
            None => {
                if value
                    .trim()
                    .get(..SENTINEL_PREFIX.len())
                    .is_some_and(|p| p.eq_ignore_ascii_case(SENTINEL_PREFIX))
                {
                    warn!("Value '{value}' looks like a sentinel but has no known evidence suffix; treating as text");
                }
                FieldValue::Text(value)
            }
        }
    }

    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Bool(flag) => FieldValue::Flag(*flag),
            Value::String(text) => FieldValue::text(text.as_str()),
            Value::Number(number) => FieldValue::Text(number.to_string()),
            Value::Null => FieldValue::Text(String::new()),
            other => FieldValue::Text(other.to_string()),
        }
    }
}

/// Field assignments keyed by canonical field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueMap {
    values: HashMap<String, FieldValue>,
}

impl ValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts under the normalized form of `raw_name`. Later keys that
    /// normalize to the same name overwrite earlier ones.
    pub fn insert(&mut self, raw_name: &str, value: FieldValue) {
        let name = normalize_field_name(raw_name);
        if self.values.insert(name.clone(), value).is_some() {
            debug!("Value for '{name}' overwritten by key '{raw_name}'");
        }
    }

    pub fn from_json_map<'a>(entries: impl IntoIterator<Item = (&'a String, &'a Value)>) -> Self {
        let mut map = Self::new();
        for (name, value) in entries {
            map.insert(name, FieldValue::from_json(value));
        }
        map
    }

    pub fn get(&self, canonical_name: &str) -> Option<&FieldValue> {
        self.values.get(canonical_name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl<K: AsRef<str>> FromIterator<(K, FieldValue)> for ValueMap {
    fn from_iter<I: IntoIterator<Item = (K, FieldValue)>>(iter: I) -> Self {
        let mut map = ValueMap::new();
        for (name, value) in iter {
            map.insert(name.as_ref(), value);
        }
        map
    }
}
