//! Analysis oracle — text in, Strengths/Weaknesses/Recommendations narrative out.
//!
//! `AnalysisOracle` is the seam; `LlmClient` is the production backend.
//! `assess` turns a narrative into an `AnalysisResult` via the section parser.

use async_trait::async_trait;
use uuid::Uuid;

use crate::documents::models::{AnalysisResult, DocumentCategory};
use crate::documents::prompts::{ANALYSIS_PROMPT_TEMPLATE, ANALYSIS_SYSTEM};
use crate::documents::sections::parse_sections;
use crate::llm_client::{LlmClient, LlmError};

/// Upper bound on document text sent to the oracle, in characters.
const MAX_DOCUMENT_CHARS: usize = 100_000;

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub system: String,
    pub document_text: String,
    pub category: DocumentCategory,
}

impl AnalysisRequest {
    pub fn new(document_text: &str, category: DocumentCategory) -> Self {
        Self {
            system: ANALYSIS_SYSTEM.to_string(),
            document_text: truncate_chars(document_text, MAX_DOCUMENT_CHARS).to_string(),
            category,
        }
    }

    pub fn prompt(&self) -> String {
        ANALYSIS_PROMPT_TEMPLATE
            .replace("{category_label}", self.category.label())
            .replace("{category}", self.category.as_str())
            .replace("{document_text}", &self.document_text)
    }
}

#[async_trait]
pub trait AnalysisOracle: Send + Sync {
    /// Returns the raw narrative. Empty output is an error.
    async fn analyze(&self, request: &AnalysisRequest) -> Result<String, LlmError>;
}

#[async_trait]
impl AnalysisOracle for LlmClient {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<String, LlmError> {
        let response = self.call(&request.prompt(), &request.system).await?;
        response
            .text()
            .map(|text| text.trim().to_string())
            .ok_or(LlmError::EmptyContent)
    }
}

/// Builds the assessment for one document from the oracle's narrative.
/// A narrative without recognizable headers yields empty lists and `success = false`.
pub fn assess(document_id: Uuid, category: DocumentCategory, narrative: &str) -> AnalysisResult {
    let parsed = parse_sections(narrative);
    AnalysisResult {
        document_id,
        category,
        narrative: narrative.to_string(),
        strengths: parsed.strengths,
        weaknesses: parsed.weaknesses,
        recommendations: parsed.recommendations,
        success: parsed.headers_found,
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_fills_every_placeholder() {
        let request = AnalysisRequest::new("Jane Doe, keynote at RustConf", DocumentCategory::Press);
        let prompt = request.prompt();
        assert!(prompt.contains("Press coverage"));
        assert!(prompt.contains("DOCUMENT CATEGORY: press"));
        assert!(prompt.contains("keynote at RustConf"));
        assert!(!prompt.contains('{'));
    }

    #[test]
    fn test_assess_parses_sections() {
        let id = Uuid::new_v4();
        let result = assess(
            id,
            DocumentCategory::Resume,
            "Strengths:\n- Led 3 product launches\nWeaknesses:\n- No awards listed",
        );
        assert!(result.success);
        assert_eq!(result.document_id, id);
        assert_eq!(result.strengths, vec!["Led 3 product launches"]);
        assert_eq!(result.weaknesses, vec!["No awards listed"]);
        assert!(result.recommendations.is_empty());
    }

    #[test]
    fn test_assess_without_headers_echoes_narrative() {
        let narrative = "I cannot assess this document.";
        let result = assess(Uuid::new_v4(), DocumentCategory::Awards, narrative);
        assert!(!result.success);
        assert_eq!(result.narrative, narrative);
        assert!(result.strengths.is_empty());
        assert!(result.weaknesses.is_empty());
        assert!(result.recommendations.is_empty());
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("żółw", 2), "żó");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
