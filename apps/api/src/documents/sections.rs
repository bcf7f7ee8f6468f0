//! Section parser — splits an analysis narrative into Strengths / Weaknesses /
//! Recommendations.
//!
//! The oracle's layout is not guaranteed, so the parser is a line-driven state
//! machine rather than a single pattern:
//! - a header line switches the active section (`### Strengths`, `Weaknesses:`,
//!   `**Recommendations:**`, any case); text after the colon counts as an item
//! - inside a section, list items start with a bullet glyph, `*`, `-` or `N.`
//! - `[SEP]` splits one physical line into several items
//! - everything else (prose, preamble) is ignored
//!
//! No headers at all is a soft failure: empty lists, `headers_found = false`.

use serde::{Deserialize, Serialize};

/// Token the oracle may use to pack several items onto one line.
pub const ITEM_SEPARATOR: &str = "[SEP]";

const BULLET_GLYPHS: &[char] = &['•', '●', '▪', '◦', '‣', '–', '*', '-'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    Preamble,
    Strengths,
    Weaknesses,
    Recommendations,
}

const HEADERS: &[(&str, ParserState)] = &[
    ("strengths", ParserState::Strengths),
    ("weaknesses", ParserState::Weaknesses),
    ("recommendations", ParserState::Recommendations),
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedSections {
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub recommendations: Vec<String>,
    /// False when no recognizable header appeared anywhere in the narrative.
    pub headers_found: bool,
}

impl ParsedSections {
    fn section_mut(&mut self, state: ParserState) -> Option<&mut Vec<String>> {
        match state {
            ParserState::Preamble => None,
            ParserState::Strengths => Some(&mut self.strengths),
            ParserState::Weaknesses => Some(&mut self.weaknesses),
            ParserState::Recommendations => Some(&mut self.recommendations),
        }
    }
}

pub fn parse_sections(narrative: &str) -> ParsedSections {
    let mut parsed = ParsedSections::default();
    let mut state = ParserState::Preamble;

    for line in narrative.lines() {
        if let Some((next, inline)) = match_header(line) {
            state = next;
            parsed.headers_found = true;
            if let Some(section) = parsed.section_mut(state) {
                section.extend(inline_items(inline));
            }
            continue;
        }

        if let Some(section) = parsed.section_mut(state) {
            section.extend(line_items(line));
        }
    }

    parsed
}

/// Recognizes a section header, returning the new state and any text after
/// the colon.
fn match_header(line: &str) -> Option<(ParserState, &str)> {
    let mut candidate = line.trim().trim_start_matches('#').trim();
    let bold = candidate.starts_with("**") || candidate.starts_with("__");
    if bold {
        candidate = candidate.trim_matches(|c: char| c == '*' || c == '_').trim();
    }

    for (name, state) in HEADERS {
        let Some(prefix) = candidate.get(..name.len()) else {
            continue;
        };
        if !prefix.eq_ignore_ascii_case(name) {
            continue;
        }
        // `**Strengths**:` keeps its closing markers before the colon.
        let rest = candidate[name.len()..]
            .trim_start_matches(|c: char| c == '*' || c == '_')
            .trim_start();
        if rest.is_empty() {
            return Some((*state, ""));
        }
        if let Some(inline) = rest.strip_prefix(':') {
            let inline = inline.trim().trim_matches(|c: char| c == '*' || c == '_').trim();
            return Some((*state, inline));
        }
    }
    None
}

/// Items on a list line inside an active section. Prose lines yield nothing.
fn line_items(line: &str) -> Vec<String> {
    let trimmed = line.trim();
    if trimmed.contains(ITEM_SEPARATOR) {
        return split_items(trimmed);
    }
    strip_list_marker(trimmed)
        .and_then(clean_item)
        .into_iter()
        .collect()
}

/// Text following a header's colon is content even without a list marker.
fn inline_items(inline: &str) -> Vec<String> {
    if inline.contains(ITEM_SEPARATOR) {
        return split_items(inline);
    }
    clean_item(strip_list_marker(inline).unwrap_or(inline))
        .into_iter()
        .collect()
}

fn split_items(text: &str) -> Vec<String> {
    text.split(ITEM_SEPARATOR)
        .filter_map(|piece| {
            let piece = piece.trim();
            clean_item(strip_list_marker(piece).unwrap_or(piece))
        })
        .collect()
}

/// Strips a leading bullet glyph or `N.` ordinal. `None` if the line is not a list item.
fn strip_list_marker(text: &str) -> Option<&str> {
    if let Some(rest) = text.strip_prefix(BULLET_GLYPHS) {
        return Some(rest.trim_start());
    }

    let digits = text.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let rest = text[digits..].strip_prefix('.')?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest.trim_start())
    } else {
        None
    }
}

fn clean_item(text: &str) -> Option<String> {
    let mut item = text.trim();
    if let Some(inner) = item.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        item = inner.trim();
    }
    if item.is_empty() {
        None
    } else {
        Some(item.to_string())
    }
}
