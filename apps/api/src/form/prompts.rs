// Value generation prompt templates.

pub const VALUE_GENERATION_SYSTEM: &str = "\
You are an immigration paralegal preparing an O-1 petition form. \
Fill form fields using ONLY facts present in the evidence summaries. \
You MUST respond with valid JSON only. \
Do NOT include any text outside the JSON object. \
Do NOT use markdown code fences.";

/// Replace `{fields}` and `{summaries}` before sending.
pub const VALUE_GENERATION_PROMPT_TEMPLATE: &str = r#"Fill the form fields below from the applicant's evidence.

Return ONE flat JSON object mapping each field name to its value:
- text fields: a string
- checkbox fields: true or false
- choice fields: exactly one of the listed options, spelled as listed

When the evidence does not support a value, use the marker N/A_<code>
followed by a short explanation, where <code> names the missing evidence:
  per = personal information
  res = resume / CV
  rl  = recommendation letter
  ar  = award or recognition
  pub = publication
  ss  = salary or commercial success
  pm  = professional membership
Example: "N/A_ss — no salary evidence provided"

Never invent names, dates, amounts or titles.

FORM FIELDS (name: description):
{fields}

EVIDENCE SUMMARIES:
{summaries}
"#;
