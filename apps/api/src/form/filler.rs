//! Form filler — applies a `ValueMap` to a `FormSchema`.
//!
//! The schema drives the walk: surplus keys in the value map are ignored,
//! fields without a value stay at their default and get no outcome. Each
//! field's kind was resolved when the schema was loaded, so application is a
//! plain match over `FieldKind` × `FieldValue`. A field that cannot take its
//! value records a `FieldResolutionError` and the walk moves on.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::form::schema::{FieldKind, FormSchema};
use crate::form::values::{EvidenceCategory, FieldValue, ValueMap};

/// Tokens that check a checkbox (case-insensitive). Anything else unchecks it.
pub const TRUTHY_TOKENS: &[&str] = &["true", "yes", "y", "1"];

#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldResolutionError {
    #[error("option '{option}' is not one of {available:?}")]
    UnknownOption {
        option: String,
        available: Vec<String>,
    },

    #[error("a {value_type} value cannot be applied to a {field_kind} field")]
    TypeMismatch {
        field_kind: String,
        value_type: String,
    },
}

/// What ended up in a field of the filled form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AppliedValue {
    Unfilled,
    Text(String),
    Checked(bool),
    Selected(String),
}

impl AppliedValue {
    fn display(&self) -> String {
        match self {
            AppliedValue::Unfilled => "—".to_string(),
            AppliedValue::Text(text) => text.clone(),
            AppliedValue::Checked(true) => "[x]".to_string(),
            AppliedValue::Checked(false) => "[ ]".to_string(),
            AppliedValue::Selected(option) => format!("({option})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilledField {
    pub name: String,
    pub raw_name: String,
    pub kind: FieldKind,
    pub value: AppliedValue,
}

/// The filled form artifact. Field order follows the schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilledForm {
    pub schema_name: String,
    pub fields: Vec<FilledField>,
}

impl FilledForm {
    fn blank(schema: &FormSchema) -> Self {
        Self {
            schema_name: schema.name().to_string(),
            fields: schema
                .fields()
                .iter()
                .map(|descriptor| FilledField {
                    name: descriptor.name.clone(),
                    raw_name: descriptor.raw_name.clone(),
                    kind: descriptor.kind.clone(),
                    value: AppliedValue::Unfilled,
                })
                .collect(),
        }
    }

    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<&AppliedValue> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| &field.value)
    }

    /// Text written into a text field, if any.
    #[cfg(test)]
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            AppliedValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Plain-text rendering: one `raw name: value` line per filled field.
    pub fn render_preview(&self) -> String {
        let filled = self
            .fields
            .iter()
            .filter(|field| field.value != AppliedValue::Unfilled)
            .count();
        let mut out = format!(
            "{} — {filled}/{} fields filled\n\n",
            self.schema_name,
            self.fields.len()
        );
        for field in self.fields.iter().filter(|f| f.value != AppliedValue::Unfilled) {
            out.push_str(&format!("{}: {}\n", field.raw_name, field.value.display()));
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// A non-empty value was applied.
    Filled,
    /// The assigned value was empty (and not a sentinel).
    Empty,
    /// The value was an insufficient-evidence sentinel.
    Deferred { category: EvidenceCategory },
    /// The value could not be applied.
    Failed { error: FieldResolutionError },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldOutcome {
    pub field: String,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

impl FieldOutcome {
    pub fn is_applied(&self) -> bool {
        !matches!(self.status, OutcomeStatus::Failed { .. })
    }
}

#[derive(Debug, Clone)]
pub struct FillResult {
    pub form: FilledForm,
    pub outcomes: Vec<FieldOutcome>,
}

impl FillResult {
    pub fn failures(&self) -> impl Iterator<Item = &FieldOutcome> {
        self.outcomes.iter().filter(|outcome| !outcome.is_applied())
    }
}

pub fn fill(schema: &FormSchema, values: &ValueMap) -> FillResult {
    let mut form = FilledForm::blank(schema);
    let mut outcomes = Vec::new();

    for field in form.fields.iter_mut() {
        let Some(value) = values.get(&field.name) else {
            continue;
        };

        let status = match apply(&field.kind, value) {
            Ok((applied, status)) => {
                field.value = applied;
                status
            }
            Err(error) => {
                warn!("Field '{}' could not be filled: {error}", field.name);
                OutcomeStatus::Failed { error }
            }
        };
        outcomes.push(FieldOutcome {
            field: field.name.clone(),
            status,
        });
    }

    let ignored = values.keys().filter(|key| schema.get(key).is_none()).count();
    if ignored > 0 {
        debug!("{ignored} value keys matched no field in '{}'", schema.name());
    }

    FillResult { form, outcomes }
}

fn apply(
    kind: &FieldKind,
    value: &FieldValue,
) -> Result<(AppliedValue, OutcomeStatus), FieldResolutionError> {
    let filled_or_empty = |text: &str| {
        if text.trim().is_empty() {
            OutcomeStatus::Empty
        } else {
            OutcomeStatus::Filled
        }
    };

    match (kind, value) {
        // Text fields show the marker; checkboxes and choices keep their default.
        (FieldKind::Text, FieldValue::Insufficient(sentinel)) => Ok((
            AppliedValue::Text(sentinel.raw.clone()),
            OutcomeStatus::Deferred {
                category: sentinel.category,
            },
        )),
        (_, FieldValue::Insufficient(sentinel)) => Ok((
            AppliedValue::Unfilled,
            OutcomeStatus::Deferred {
                category: sentinel.category,
            },
        )),

        (FieldKind::Text, FieldValue::Text(text)) => {
            Ok((AppliedValue::Text(text.clone()), filled_or_empty(text)))
        }
        (FieldKind::Text, FieldValue::Flag(flag)) => {
            Ok((AppliedValue::Text(flag.to_string()), OutcomeStatus::Filled))
        }

        (FieldKind::Boolean, FieldValue::Flag(flag)) => {
            Ok((AppliedValue::Checked(*flag), OutcomeStatus::Filled))
        }
        (FieldKind::Boolean, FieldValue::Text(text)) if text.trim().is_empty() => {
            Ok((AppliedValue::Unfilled, OutcomeStatus::Empty))
        }
        (FieldKind::Boolean, FieldValue::Text(text)) => {
            Ok((AppliedValue::Checked(is_truthy(text)), OutcomeStatus::Filled))
        }

        (FieldKind::Choice { .. }, FieldValue::Text(text)) if text.trim().is_empty() => {
            Ok((AppliedValue::Unfilled, OutcomeStatus::Empty))
        }
        (FieldKind::Choice { options }, FieldValue::Text(text)) => {
            if options.iter().any(|option| option == text) {
                Ok((AppliedValue::Selected(text.clone()), OutcomeStatus::Filled))
            } else {
                Err(FieldResolutionError::UnknownOption {
                    option: text.clone(),
                    available: options.clone(),
                })
            }
        }
        (FieldKind::Choice { .. }, FieldValue::Flag(flag)) => {
            Err(FieldResolutionError::TypeMismatch {
                field_kind: "choice".to_string(),
                value_type: format!("boolean ({flag})"),
            })
        }
    }
}

pub fn is_truthy(token: &str) -> bool {
    let token = token.trim();
    TRUTHY_TOKENS
        .iter()
        .any(|truthy| truthy.eq_ignore_ascii_case(token))
}
