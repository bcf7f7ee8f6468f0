//! Text extraction — turns an uploaded payload into plain text.
//!
//! PDFs are decoded with `pdf-extract`; form-feed page breaks become a blank
//! line. Plain UTF-8 uploads pass through unchanged. Text shorter than
//! the configured minimum is an extraction failure: the caller records it and
//! falls back to the fixed assessment. No placeholder text is ever substituted.

use thiserror::Error;

/// Default minimum number of non-whitespace characters for usable text.
pub const DEFAULT_MIN_CHARS: usize = 50;

const PDF_MAGIC: &[u8] = b"%PDF";
const PAGE_BREAK: char = '\u{c}';

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to decode PDF: {0}")]
    Decode(String),

    #[error("payload is neither a PDF nor UTF-8 text")]
    UnsupportedPayload,

    #[error("extracted text too short ({chars} chars, minimum {min})")]
    InsufficientText { chars: usize, min: usize },
}

#[derive(Debug, Clone)]
pub struct TextExtractor {
    min_chars: usize,
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_CHARS)
    }
}

impl TextExtractor {
    pub fn new(min_chars: usize) -> Self {
        Self { min_chars }
    }

    /// Extracts text from `bytes`. CPU-bound; async callers run it inside
    /// `tokio::task::spawn_blocking`.
    pub fn extract(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        let text = if bytes.starts_with(PDF_MAGIC) {
            let text = pdf_extract::extract_text_from_mem(bytes)
                .map_err(|e| ExtractionError::Decode(e.to_string()))?;
            join_pages(text.split(PAGE_BREAK))
        } else {
            std::str::from_utf8(bytes)
                .map_err(|_| ExtractionError::UnsupportedPayload)?
                .trim()
                .to_string()
        };

        self.check_length(text)
    }

    fn check_length(&self, text: String) -> Result<String, ExtractionError> {
        let chars = text.chars().filter(|c| !c.is_whitespace()).count();
        if chars < self.min_chars {
            return Err(ExtractionError::InsufficientText {
                chars,
                min: self.min_chars,
            });
        }
        Ok(text)
    }
}

/// Concatenates page texts in order, separated by a blank line.
fn join_pages<'a>(pages: impl Iterator<Item = &'a str>) -> String {
    pages
        .map(str::trim)
        .filter(|page| !page.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESUME_TEXT: &str = "Jane Doe\nPrincipal Research Engineer\n\
        Led development of a distributed inference platform serving 40M users.\n\
        Published 12 peer-reviewed papers on compiler optimization.";

    #[test]
    fn test_join_pages_separates_with_blank_line() {
        let raw = "Page one text\n\u{c}   \u{c}Page two text";
        assert_eq!(
            join_pages(raw.split(PAGE_BREAK)),
            "Page one text\n\nPage two text"
        );
    }

    #[test]
    fn test_plain_text_passes_through() {
        let extractor = TextExtractor::default();
        let text = extractor.extract(RESUME_TEXT.as_bytes()).unwrap();
        assert_eq!(text, RESUME_TEXT);
    }

    #[test]
    fn test_empty_payload_is_insufficient() {
        let extractor = TextExtractor::default();
        let err = extractor.extract(b"").unwrap_err();
        assert!(matches!(
            err,
            ExtractionError::InsufficientText { chars: 0, min: 50 }
        ));
    }

    #[test]
    fn test_short_text_is_insufficient() {
        let extractor = TextExtractor::new(20);
        let err = extractor.extract(b"  tiny   resume  ").unwrap_err();
        assert!(matches!(err, ExtractionError::InsufficientText { chars: 10, .. }));
    }

    #[test]
    fn test_binary_payload_is_unsupported() {
        let extractor = TextExtractor::default();
        let err = extractor.extract(&[0xff, 0xfe, 0x00, 0x81]).unwrap_err();
        assert!(matches!(err, ExtractionError::UnsupportedPayload));
    }
}
