//! In-memory collaborators for pipeline and router tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::cache::{CacheTtls, PipelineCaches};
use crate::documents::analysis::{AnalysisOracle, AnalysisRequest};
use crate::documents::extract::TextExtractor;
use crate::documents::models::{DocumentCategory, DocumentRef};
use crate::form::generation::{ValueOracle, ValueRequest};
use crate::form::stats::EmptyValuePolicy;
use crate::llm_client::LlmError;
use crate::pipeline::lock::InMemoryFillLock;
use crate::pipeline::orchestrator::{Pipeline, PipelineSettings};
use crate::pipeline::progress::StoreProgressSink;
use crate::storage::blob::memory::InMemoryBinaryStorage;
use crate::storage::store::memory::InMemoryApplicationStore;

pub const TEMPLATE_KEY: &str = "templates/o1.json";
pub const TEMPLATE: &str = r#"{
    "name": "O-1 petition",
    "fields": [
        {"name": "Family Name", "kind": "text"},
        {"name": "Salary Amount", "kind": "text"},
        {"name": "Publication Count", "kind": "text"},
        {"name": "Married", "kind": "checkbox"},
        {"name": "Classification", "kind": "choice", "options": ["O1A", "O1B"]}
    ]
}"#;
pub const RESUME_TEXT: &str =
    "Jane Doe. Principal engineer, led the storage team, published twelve papers on databases.";

pub struct FakeAnalysis {
    pub narrative: &'static str,
    pub delay: Duration,
    pub calls: AtomicUsize,
}

impl FakeAnalysis {
    pub fn new(narrative: &'static str) -> Self {
        Self {
            narrative,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn slow(narrative: &'static str, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new(narrative)
        }
    }
}

#[async_trait]
impl AnalysisOracle for FakeAnalysis {
    async fn analyze(&self, _request: &AnalysisRequest) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.narrative.to_string())
    }
}

pub struct FakeValues(pub Option<Value>);

#[async_trait]
impl ValueOracle for FakeValues {
    async fn generate_values(
        &self,
        _request: &ValueRequest,
    ) -> Result<HashMap<String, Value>, LlmError> {
        match &self.0 {
            Some(value) => Ok(serde_json::from_value(value.clone())?),
            None => Err(LlmError::EmptyContent),
        }
    }
}

pub struct Harness {
    pub pipeline: Pipeline,
    pub storage: Arc<InMemoryBinaryStorage>,
    pub store: Arc<InMemoryApplicationStore>,
}

pub fn harness(analysis: FakeAnalysis, values: FakeValues) -> Harness {
    let storage = Arc::new(
        InMemoryBinaryStorage::default()
            .with_object(TEMPLATE_KEY, TEMPLATE)
            .with_object("docs/resume.txt", RESUME_TEXT)
            .with_object("docs/empty.pdf", ""),
    );
    let store = Arc::new(InMemoryApplicationStore::default());
    let pipeline = Pipeline {
        storage: storage.clone(),
        store: store.clone(),
        analysis_oracle: Arc::new(analysis),
        value_oracle: Arc::new(values),
        lock: Arc::new(InMemoryFillLock::new(Duration::from_secs(60))),
        progress: Arc::new(StoreProgressSink::new(store.clone())),
        caches: PipelineCaches::new(&CacheTtls::default()),
        settings: PipelineSettings {
            template_key: TEMPLATE_KEY.to_string(),
            extractor: TextExtractor::default(),
            extraction_timeout: Duration::from_secs(5),
            analysis_timeout: Duration::from_secs(5),
            value_generation_timeout: Duration::from_secs(5),
            empty_value_policy: EmptyValuePolicy::Neither,
        },
    };
    Harness {
        pipeline,
        storage,
        store,
    }
}

pub fn document(category: DocumentCategory, storage_key: &str) -> DocumentRef {
    DocumentRef {
        id: Uuid::new_v4(),
        category,
        storage_key: storage_key.to_string(),
    }
}

pub fn good_values() -> FakeValues {
    FakeValues(Some(json!({
        "Family Name": "Doe",
        "Salary Amount": "N/A_ss — no salary evidence provided",
        "Publication Count": "12",
        "Married": "no",
        "Classification": "O1C",
        "Unknown Field": "ignored"
    })))
}

pub const NARRATIVE: &str =
    "## Strengths\n- Led the storage team\n- Twelve papers\nWeaknesses:\n* No awards\nRecommendations:\n1. Add award letters";
