//! Value generation oracle — field descriptions + evidence summaries in,
//! flat field-name → value map out.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::Value;

use crate::form::prompts::{VALUE_GENERATION_PROMPT_TEMPLATE, VALUE_GENERATION_SYSTEM};
use crate::form::schema::FormSchema;
use crate::llm_client::{LlmClient, LlmError, LARGE_MAX_TOKENS};

#[derive(Debug, Clone)]
pub struct ValueRequest {
    /// Canonical field name → description.
    pub descriptions: BTreeMap<String, String>,
    /// One summary per analyzed document, in run order.
    pub summaries: Vec<String>,
}

impl ValueRequest {
    pub fn new(schema: &FormSchema, summaries: Vec<String>) -> Self {
        Self {
            descriptions: schema.descriptions(),
            summaries,
        }
    }

    pub fn prompt(&self) -> String {
        let fields = self
            .descriptions
            .iter()
            .map(|(name, description)| format!("{name}: {description}"))
            .collect::<Vec<_>>()
            .join("\n");
        let summaries = if self.summaries.is_empty() {
            "(no evidence was provided)".to_string()
        } else {
            self.summaries.join("\n")
        };
        VALUE_GENERATION_PROMPT_TEMPLATE
            .replace("{fields}", &fields)
            .replace("{summaries}", &summaries)
    }
}

#[async_trait]
pub trait ValueOracle: Send + Sync {
    /// Returns the raw value map. An empty map is an error.
    async fn generate_values(
        &self,
        request: &ValueRequest,
    ) -> Result<HashMap<String, Value>, LlmError>;
}

#[async_trait]
impl ValueOracle for LlmClient {
    async fn generate_values(
        &self,
        request: &ValueRequest,
    ) -> Result<HashMap<String, Value>, LlmError> {
        let values: HashMap<String, Value> = self
            .call_json(&request.prompt(), VALUE_GENERATION_SYSTEM, LARGE_MAX_TOKENS)
            .await?;
        if values.is_empty() {
            return Err(LlmError::EmptyContent);
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::schema::{FieldDescriptor, FieldKind};

    #[test]
    fn test_prompt_lists_fields_and_summaries() {
        let schema = FormSchema::new(
            "form",
            vec![
                FieldDescriptor::new("Salary Amount", FieldKind::Text, Some("Annual salary".into())),
                FieldDescriptor::new("Married", FieldKind::Boolean, None),
            ],
        )
        .unwrap();
        let request = ValueRequest::new(&schema, vec!["[Resume / CV]\nStrengths:\n- Led team\n".into()]);
        let prompt = request.prompt();

        assert!(prompt.contains("salary_amount: Annual salary (free text)"));
        assert!(prompt.contains("married: checkbox (true/false)"));
        assert!(prompt.contains("- Led team"));
        assert!(!prompt.contains("{fields}"));
        assert!(!prompt.contains("{summaries}"));
    }

    #[test]
    fn test_prompt_without_summaries() {
        let schema =
            FormSchema::new("form", vec![FieldDescriptor::new("a", FieldKind::Text, None)]).unwrap();
        let prompt = ValueRequest::new(&schema, Vec::new()).prompt();
        assert!(prompt.contains("(no evidence was provided)"));
    }
}
