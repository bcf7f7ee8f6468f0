use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use crate::documents::models::{AnalysisResult, DocumentCategory, DocumentFieldStats};
use crate::form::stats::CompletionStatistics;

/// Identifies one petition application. At most one fill may be in flight per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationKey {
    pub user_id: Uuid,
    pub application_id: Uuid,
}

impl ApplicationKey {
    pub fn new(user_id: Uuid, application_id: Uuid) -> Self {
        Self {
            user_id,
            application_id,
        }
    }

    /// Storage key of the filled form artifact.
    pub fn artifact_key(&self) -> String {
        format!("filled/{}/{}/form.json", self.user_id, self.application_id)
    }
}

impl fmt::Display for ApplicationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.application_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ApplicationRow {
    pub user_id: Uuid,
    pub application_id: Uuid,
    pub processing_status: String,
    pub progress: i32,
    pub document_summaries: Value,
    pub field_stats: Option<Value>,
    pub completion_score: Option<f64>,
    pub filled_form_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApplicationRow {
    /// Preview cache key for the stored artifact. Every write bumps
    /// `updated_at`, so a preview rendered from an older artifact can never be
    /// served once a newer fill has been recorded.
    pub fn preview_cache_key(&self) -> Option<String> {
        let form_key = self.filled_form_key.as_deref()?;
        Some(format!("{form_key}@{}", self.updated_at.timestamp_micros()))
    }
}

/// Persisted per-document assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub document_id: Uuid,
    pub category: DocumentCategory,
    pub analyzed: bool,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub recommendations: Vec<String>,
    /// Why the document fell back to the fixed assessment, if it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl DocumentSummary {
    pub fn new(analysis: &AnalysisResult, failure: Option<String>) -> Self {
        Self {
            document_id: analysis.document_id,
            category: analysis.category,
            analyzed: analysis.success,
            strengths: analysis.strengths.clone(),
            weaknesses: analysis.weaknesses.clone(),
            recommendations: analysis.recommendations.clone(),
            failure,
        }
    }
}

/// The `field_stats` column: overall completion plus per-category document stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldStats {
    pub overall: CompletionStatistics,
    pub documents: BTreeMap<DocumentCategory, DocumentFieldStats>,
}

impl FieldStats {
    pub fn completion_score(&self) -> f64 {
        self.overall.percent_filled
    }
}
