//! Completion statistics — how much of the form could be filled, and why the
//! rest could not.
//!
//! Recomputed from scratch on every fill. Only applied fields count toward
//! `total_fields`; fields that failed to resolve are excluded. Empty values
//! follow the configured `EmptyValuePolicy`.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::documents::models::DocumentCategory;
use crate::form::filler::{FieldOutcome, OutcomeStatus};
use crate::form::values::EvidenceCategory;

/// Thematic buckets, matched by substring against canonical field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    ExtraordinaryAbility,
    Recognition,
    Publications,
    Leadership,
    Contributions,
    Salary,
    Success,
}

impl Topic {
    pub const ALL: [Topic; 7] = [
        Topic::ExtraordinaryAbility,
        Topic::Recognition,
        Topic::Publications,
        Topic::Leadership,
        Topic::Contributions,
        Topic::Salary,
        Topic::Success,
    ];

    pub fn needle(&self) -> &'static str {
        match self {
            Topic::ExtraordinaryAbility => "extraordinary",
            Topic::Recognition => "recognition",
            Topic::Publications => "publication",
            Topic::Leadership => "leadership",
            Topic::Contributions => "contribution",
            Topic::Salary => "salary",
            Topic::Success => "success",
        }
    }
}

/// How a field whose assigned value is empty (and not a sentinel) is counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyValuePolicy {
    /// Counts toward `total_fields` only.
    #[default]
    Neither,
    /// Counts as filled.
    Filled,
    /// Counts as deferred under the given evidence category.
    Defer(EvidenceCategory),
}

#[derive(Debug, Error, PartialEq)]
#[error("invalid empty value policy '{0}' (expected neither, filled, or defer:<suffix>)")]
pub struct InvalidPolicy(String);

impl FromStr for EmptyValuePolicy {
    type Err = InvalidPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "neither" | "none" => Ok(EmptyValuePolicy::Neither),
            "filled" => Ok(EmptyValuePolicy::Filled),
            other => other
                .strip_prefix("defer:")
                .and_then(EvidenceCategory::from_suffix)
                .map(EmptyValuePolicy::Defer)
                .ok_or_else(|| InvalidPolicy(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionStatistics {
    pub total_fields: usize,
    pub filled_count: usize,
    pub percent_filled: f64,
    pub deferred: BTreeMap<EvidenceCategory, usize>,
    pub topics: BTreeMap<Topic, usize>,
}

impl Default for CompletionStatistics {
    fn default() -> Self {
        Self {
            total_fields: 0,
            filled_count: 0,
            percent_filled: 0.0,
            deferred: EvidenceCategory::ALL.into_iter().map(|c| (c, 0)).collect(),
            topics: Topic::ALL.into_iter().map(|t| (t, 0)).collect(),
        }
    }
}

impl CompletionStatistics {
    #[cfg(test)]
    pub fn aggregate(outcomes: &[FieldOutcome]) -> Self {
        Self::aggregate_with_policy(outcomes, EmptyValuePolicy::default())
    }

    pub fn aggregate_with_policy(outcomes: &[FieldOutcome], policy: EmptyValuePolicy) -> Self {
        let mut stats = Self::default();

        for outcome in outcomes {
            match &outcome.status {
                OutcomeStatus::Failed { .. } => continue,
                OutcomeStatus::Filled => stats.count_filled(&outcome.field),
                OutcomeStatus::Deferred { category } => stats.count_deferred(*category),
                OutcomeStatus::Empty => match policy {
                    EmptyValuePolicy::Neither => {}
                    EmptyValuePolicy::Filled => stats.count_filled(&outcome.field),
                    EmptyValuePolicy::Defer(category) => stats.count_deferred(category),
                },
            }
            stats.total_fields += 1;
        }

        stats.percent_filled = if stats.total_fields == 0 {
            0.0
        } else {
            stats.filled_count as f64 / stats.total_fields as f64 * 100.0
        };
        stats
    }

    fn count_filled(&mut self, field: &str) {
        self.filled_count += 1;
        for topic in Topic::ALL {
            if field.contains(topic.needle()) {
                *self.topics.entry(topic).or_default() += 1;
            }
        }
    }

    fn count_deferred(&mut self, category: EvidenceCategory) {
        *self.deferred.entry(category).or_default() += 1;
    }

    pub fn deferred_total(&self) -> usize {
        self.deferred.values().sum()
    }

    pub fn deferred_for(&self, category: EvidenceCategory) -> usize {
        self.deferred.get(&category).copied().unwrap_or(0)
    }

    pub fn topic_count(&self, topic: Topic) -> usize {
        self.topics.get(&topic).copied().unwrap_or(0)
    }

    /// Upload categories that would resolve at least one deferred field.
    pub fn missing_uploads(&self) -> Vec<DocumentCategory> {
        let wanted: Vec<DocumentCategory> = EvidenceCategory::ALL
            .into_iter()
            .filter(|category| self.deferred_for(*category) > 0)
            .filter_map(|category| category.document_category())
            .collect();
        DocumentCategory::ALL
            .into_iter()
            .filter(|category| wanted.contains(category))
            .collect()
    }
}
