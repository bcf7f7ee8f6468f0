use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The fixed set of upload categories an applicant can provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentCategory {
    Resume,
    Publications,
    Awards,
    Recommendation,
    Press,
    Salary,
    Judging,
    Membership,
    Contributions,
}

impl DocumentCategory {
    pub const ALL: [DocumentCategory; 9] = [
        DocumentCategory::Resume,
        DocumentCategory::Publications,
        DocumentCategory::Awards,
        DocumentCategory::Recommendation,
        DocumentCategory::Press,
        DocumentCategory::Salary,
        DocumentCategory::Judging,
        DocumentCategory::Membership,
        DocumentCategory::Contributions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentCategory::Resume => "resume",
            DocumentCategory::Publications => "publications",
            DocumentCategory::Awards => "awards",
            DocumentCategory::Recommendation => "recommendation",
            DocumentCategory::Press => "press",
            DocumentCategory::Salary => "salary",
            DocumentCategory::Judging => "judging",
            DocumentCategory::Membership => "membership",
            DocumentCategory::Contributions => "contributions",
        }
    }

    /// Human label used in oracle prompts and previews.
    pub fn label(&self) -> &'static str {
        match self {
            DocumentCategory::Resume => "Resume / CV",
            DocumentCategory::Publications => "Publications",
            DocumentCategory::Awards => "Awards and prizes",
            DocumentCategory::Recommendation => "Recommendation letter",
            DocumentCategory::Press => "Press coverage",
            DocumentCategory::Salary => "Salary evidence",
            DocumentCategory::Judging => "Judging experience",
            DocumentCategory::Membership => "Professional memberships",
            DocumentCategory::Contributions => "Original contributions",
        }
    }
}

impl std::fmt::Display for DocumentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    Pending,
    Extracted,
    Failed,
}

/// Reference to an uploaded document, as supplied by the caller of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRef {
    pub id: Uuid,
    pub category: DocumentCategory,
    pub storage_key: String,
}

impl DocumentRef {
    /// Analyses depend on the category as well as the payload.
    pub fn analysis_cache_key(&self) -> String {
        format!("{}:{}", self.id, self.category.as_str())
    }
}

/// An uploaded document with its payload loaded.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: Uuid,
    pub category: DocumentCategory,
    pub bytes: bytes::Bytes,
    pub extraction_status: ExtractionStatus,
}

impl Document {
    pub fn new(reference: &DocumentRef, bytes: bytes::Bytes) -> Self {
        Self {
            id: reference.id,
            category: reference.category,
            bytes,
            extraction_status: ExtractionStatus::Pending,
        }
    }
}

/// Assessment derived from one document's text. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisResult {
    pub document_id: Uuid,
    pub category: DocumentCategory,
    pub narrative: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub recommendations: Vec<String>,
    pub success: bool,
}

impl AnalysisResult {
    /// Fixed, category-scoped assessment used whenever a document cannot be analyzed.
    pub fn fallback(document_id: Uuid, category: DocumentCategory) -> Self {
        let label = category.label();
        Self {
            document_id,
            category,
            narrative: String::new(),
            strengths: vec![format!(
                "{label} was submitted as supporting evidence"
            )],
            weaknesses: vec![format!(
                "{label} could not be analyzed automatically"
            )],
            recommendations: vec![format!(
                "Re-upload a text-searchable copy of the {} document or review it manually",
                category.as_str()
            )],
            success: false,
        }
    }

    /// One-paragraph summary fed to the value generation oracle.
    pub fn summary(&self) -> String {
        let mut out = format!("[{}]\n", self.category.label());
        for (title, items) in [
            ("Strengths", &self.strengths),
            ("Weaknesses", &self.weaknesses),
            ("Recommendations", &self.recommendations),
        ] {
            if items.is_empty() {
                continue;
            }
            out.push_str(title);
            out.push_str(":\n");
            for item in items {
                out.push_str("- ");
                out.push_str(item);
                out.push('\n');
            }
        }
        out
    }
}

/// Per-document statement counts persisted alongside the completion statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFieldStats {
    pub strengths: usize,
    pub weaknesses: usize,
    pub recommendations: usize,
    pub analyzed: bool,
}

impl DocumentFieldStats {
    pub fn from_analysis(result: &AnalysisResult) -> Self {
        Self {
            strengths: result.strengths.len(),
            weaknesses: result.weaknesses.len(),
            recommendations: result.recommendations.len(),
            analyzed: result.success,
        }
    }

    /// Stats recorded for a document that fell back to the fixed assessment.
    pub fn fallback() -> Self {
        Self {
            strengths: 1,
            weaknesses: 1,
            recommendations: 1,
            analyzed: false,
        }
    }

    pub fn merge(&mut self, other: &DocumentFieldStats) {
        self.strengths += other.strengths;
        self.weaknesses += other.weaknesses;
        self.recommendations += other.recommendations;
        self.analyzed |= other.analyzed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_serde_snake_case() {
        let json = serde_json::to_string(&DocumentCategory::Recommendation).unwrap();
        assert_eq!(json, r#""recommendation""#);
        let parsed: DocumentCategory = serde_json::from_str(r#""publications""#).unwrap();
        assert_eq!(parsed, DocumentCategory::Publications);
    }

    #[test]
    fn test_category_as_str_matches_serde() {
        for category in DocumentCategory::ALL {
            let json = serde_json::to_string(&category).unwrap();
            assert_eq!(json.trim_matches('"'), category.as_str());
        }
    }

    #[test]
    fn test_fallback_is_fixed_and_unsuccessful() {
        let id = Uuid::new_v4();
        let a = AnalysisResult::fallback(id, DocumentCategory::Awards);
        let b = AnalysisResult::fallback(id, DocumentCategory::Awards);
        assert_eq!(a, b);
        assert!(!a.success);
        assert_eq!(DocumentFieldStats::from_analysis(&a).strengths, 1);
        assert_eq!(
            DocumentFieldStats {
                analyzed: false,
                ..DocumentFieldStats::from_analysis(&a)
            },
            DocumentFieldStats::fallback()
        );
    }

    #[test]
    fn test_summary_skips_empty_sections() {
        let result = AnalysisResult {
            document_id: Uuid::new_v4(),
            category: DocumentCategory::Resume,
            narrative: String::new(),
            strengths: vec!["Led a team of 12".to_string()],
            weaknesses: vec![],
            recommendations: vec!["Add citations".to_string()],
            success: true,
        };
        let summary = result.summary();
        assert!(summary.starts_with("[Resume / CV]"));
        assert!(summary.contains("- Led a team of 12"));
        assert!(!summary.contains("Weaknesses"));
    }
}
