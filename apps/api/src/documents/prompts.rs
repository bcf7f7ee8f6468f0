// Document analysis prompt templates.
// All prompts for the documents module are defined here.

pub const ANALYSIS_SYSTEM: &str = "\
You are an experienced immigration paralegal reviewing evidence for an O-1 \
extraordinary ability petition. Assess only what the document actually shows. \
Do NOT invent achievements, numbers, or dates that are not in the text.";

pub const ANALYSIS_PROMPT_TEMPLATE: &str = r#"Review the following {category_label} submitted as petition evidence.

Respond using exactly these three headers, each followed by a bulleted list:

Strengths:
- ...
Weaknesses:
- ...
Recommendations:
- ...

Keep each bullet to one sentence. Do not add any other sections.

DOCUMENT CATEGORY: {category}

DOCUMENT TEXT:
{document_text}
"#;
