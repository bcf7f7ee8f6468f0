//! Pipeline orchestrator.
//!
//! One run processes its documents sequentially (extract → analyze → parse),
//! then generates values for the whole form, fills it, aggregates statistics
//! and persists the results. Per-document failures degrade to the fixed
//! fallback assessment; value generation failures degrade to an empty value
//! map. Only storage, persistence and template failures end a run.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cache::{fetch_with_cache, PipelineCaches};
use crate::config::Config;
use crate::documents::analysis::{assess, AnalysisOracle, AnalysisRequest};
use crate::documents::extract::TextExtractor;
use crate::documents::models::{
    AnalysisResult, Document, DocumentCategory, DocumentFieldStats, DocumentRef, ExtractionStatus,
};
use crate::errors::AppError;
use crate::form::filler::{fill, FieldOutcome};
use crate::form::generation::{ValueOracle, ValueRequest};
use crate::form::schema::FormSchema;
use crate::form::stats::{CompletionStatistics, EmptyValuePolicy, Topic};
use crate::form::values::ValueMap;
use crate::models::application::{ApplicationKey, DocumentSummary, FieldStats};
use crate::pipeline::lock::{renewal_period, FillLock, LockToken};
use crate::pipeline::progress::{document_progress, PipelineStage, ProgressSink, ProgressTracker};
use crate::storage::blob::BinaryStorage;
use crate::storage::store::ApplicationStore;

const ARTIFACT_CONTENT_TYPE: &str = "application/json";

/// Why a document fell back to the fixed assessment, or why its analysis is partial.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum StageFailure {
    #[error("text extraction failed: {0}")]
    Extraction(String),

    #[error("text extraction timed out after {0}s")]
    ExtractionTimeout(u64),

    #[error("analysis oracle failed: {0}")]
    Oracle(String),

    #[error("analysis oracle timed out after {0}s")]
    OracleTimeout(u64),

    /// The narrative had no recognizable section headers.
    #[error("analysis narrative had no recognizable sections")]
    Parse,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentOutcome {
    pub document_id: Uuid,
    pub category: DocumentCategory,
    pub extraction_status: ExtractionStatus,
    pub analysis: AnalysisResult,
    pub field_stats: DocumentFieldStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<StageFailure>,
    /// Served from the analysis cache.
    pub cached: bool,
}

impl DocumentOutcome {
    fn analyzed(analysis: AnalysisResult, cached: bool) -> Self {
        let failure = (!analysis.success).then_some(StageFailure::Parse);
        Self {
            document_id: analysis.document_id,
            category: analysis.category,
            extraction_status: ExtractionStatus::Extracted,
            field_stats: DocumentFieldStats::from_analysis(&analysis),
            analysis,
            failure,
            cached,
        }
    }

    fn fallback(document: &Document, failure: StageFailure) -> Self {
        Self {
            document_id: document.id,
            category: document.category,
            extraction_status: document.extraction_status,
            analysis: AnalysisResult::fallback(document.id, document.category),
            field_stats: DocumentFieldStats::fallback(),
            failure: Some(failure),
            cached: false,
        }
    }

    fn summary(&self) -> DocumentSummary {
        DocumentSummary::new(&self.analysis, self.failure.as_ref().map(ToString::to_string))
    }
}

#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub key: ApplicationKey,
    pub documents: Vec<DocumentRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub user_id: Uuid,
    pub application_id: Uuid,
    pub status: PipelineStage,
    pub documents: Vec<DocumentOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_generation_failure: Option<String>,
    pub field_failures: Vec<FieldOutcome>,
    pub statistics: CompletionStatistics,
    pub document_stats: BTreeMap<DocumentCategory, DocumentFieldStats>,
    pub missing_uploads: Vec<DocumentCategory>,
    pub filled_form_key: String,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub template_key: String,
    pub extractor: TextExtractor,
    pub extraction_timeout: Duration,
    pub analysis_timeout: Duration,
    pub value_generation_timeout: Duration,
    pub empty_value_policy: EmptyValuePolicy,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            template_key: config.form_template_key.clone(),
            extractor: TextExtractor::new(config.min_extracted_chars),
            extraction_timeout: config.extraction_timeout,
            analysis_timeout: config.analysis_timeout,
            value_generation_timeout: config.value_generation_timeout,
            empty_value_policy: config.empty_value_policy,
        }
    }
}

/// The document-intelligence and form-fill pipeline with its collaborators.
pub struct Pipeline {
    pub storage: Arc<dyn BinaryStorage>,
    pub store: Arc<dyn ApplicationStore>,
    pub analysis_oracle: Arc<dyn AnalysisOracle>,
    pub value_oracle: Arc<dyn ValueOracle>,
    pub lock: Arc<dyn FillLock>,
    pub progress: Arc<dyn ProgressSink>,
    pub caches: PipelineCaches,
    pub settings: PipelineSettings,
}

impl Pipeline {
    /// Runs the pipeline for one application. Rejects the run with
    /// `AppError::Conflict` if a fill for the same key is already in flight.
    pub async fn run(&self, run: PipelineRun) -> Result<PipelineReport, AppError> {
        let key = run.key;
        let Some(token) = self.lock.try_acquire(&key).await? else {
            warn!("Rejected run for {key}: a fill is already in progress");
            return Err(AppError::Conflict(format!(
                "A fill for application {} is already in progress",
                key.application_id
            )));
        };

        let mut tracker = ProgressTracker::new(self.progress.as_ref(), key);
        let outcome = tokio::select! {
            result = self.run_locked(&run, &mut tracker) => Some(result),
            () = self.hold_lock(&key, token) => None,
        };

        // Another run owns the key now; its status must not be touched.
        let Some(result) = outcome else {
            error!("Fill lock for {key} was lost mid-run; abandoning the run");
            return Err(AppError::Conflict(format!(
                "The fill for application {} lost its lock and was abandoned",
                key.application_id
            )));
        };

        if let Err(e) = &result {
            error!("Run for {key} failed at {}%: {e}", tracker.last());
            tracker.stage(PipelineStage::Failed).await;
        }
        if let Err(e) = self.lock.release(&key, token).await {
            warn!("Failed to release fill lock for {key}: {e}");
        }
        result
    }

    /// Renews the fill lock until it can no longer be renewed. Resolves only
    /// when the lock has expired or changed hands.
    async fn hold_lock(&self, key: &ApplicationKey, token: LockToken) {
        let mut ticker = tokio::time::interval(renewal_period(self.lock.ttl()));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match self.lock.renew(key, token).await {
                Ok(true) => debug!("Renewed fill lock for {key}"),
                Ok(false) => return,
                // Transient; the next tick retries before the TTL runs out.
                Err(e) => warn!("Failed to renew fill lock for {key}: {e}"),
            }
        }
    }

    async fn run_locked(
        &self,
        run: &PipelineRun,
        tracker: &mut ProgressTracker<'_>,
    ) -> Result<PipelineReport, AppError> {
        let key = run.key;
        info!("Starting run for {key} with {} documents", run.documents.len());
        tracker.stage(PipelineStage::Pending).await;

        // ── Per-document analysis ──────────────────────────────────────────
        let total = run.documents.len();
        let mut documents = Vec::with_capacity(total);
        for (index, document) in run.documents.iter().enumerate() {
            let outcome = self.process_document(document, index, total, tracker).await?;
            if let Some(failure) = &outcome.failure {
                warn!(
                    "Document {} ({}) degraded: {failure}",
                    document.id, document.category
                );
            }
            documents.push(outcome);
        }

        let summaries: Vec<DocumentSummary> = documents.iter().map(DocumentOutcome::summary).collect();
        self.store.save_document_summaries(&key, &summaries).await?;

        // ── Value generation ───────────────────────────────────────────────
        tracker.stage(PipelineStage::GeneratingValues).await;
        let schema = self.load_schema().await?;
        let (values, value_generation_failure) = self.generate_values(&schema, &documents).await;

        // ── Filling ────────────────────────────────────────────────────────
        tracker.stage(PipelineStage::Filling).await;
        let filled = fill(&schema, &values);
        let artifact_key = key.artifact_key();
        let artifact = filled.form.to_bytes().map_err(anyhow::Error::from)?;
        self.storage
            .store(&artifact_key, Bytes::from(artifact), ARTIFACT_CONTENT_TYPE)
            .await?;
        self.store.save_filled_form_key(&key, &artifact_key).await?;

        let field_failures: Vec<FieldOutcome> = filled.failures().cloned().collect();
        if !field_failures.is_empty() {
            warn!("{} fields of {key} could not be filled", field_failures.len());
        }

        // ── Aggregation ────────────────────────────────────────────────────
        tracker.stage(PipelineStage::Aggregating).await;
        let statistics = CompletionStatistics::aggregate_with_policy(
            &filled.outcomes,
            self.settings.empty_value_policy,
        );
        if statistics.total_fields == 0 {
            warn!("No fields of {key} were assigned a value; completion is 0%");
        }
        let mut document_stats: BTreeMap<DocumentCategory, DocumentFieldStats> = BTreeMap::new();
        for outcome in &documents {
            document_stats
                .entry(outcome.category)
                .or_default()
                .merge(&outcome.field_stats);
        }
        let field_stats = FieldStats {
            overall: statistics.clone(),
            documents: document_stats.clone(),
        };
        self.store.save_field_stats(&key, &field_stats).await?;

        tracker.stage(PipelineStage::Completed).await;
        info!(
            "Run for {key} completed: {}/{} fields filled ({:.1}%), {} deferred",
            statistics.filled_count,
            statistics.total_fields,
            statistics.percent_filled,
            statistics.deferred_total()
        );
        for topic in Topic::ALL {
            debug!("{key}: {topic:?} fields filled: {}", statistics.topic_count(topic));
        }

        Ok(PipelineReport {
            user_id: key.user_id,
            application_id: key.application_id,
            status: PipelineStage::Completed,
            documents,
            value_generation_failure,
            field_failures,
            missing_uploads: statistics.missing_uploads(),
            statistics,
            document_stats,
            filled_form_key: artifact_key,
        })
    }

    async fn process_document(
        &self,
        document: &DocumentRef,
        index: usize,
        total: usize,
        tracker: &mut ProgressTracker<'_>,
    ) -> Result<DocumentOutcome, AppError> {
        let cache_key = document.analysis_cache_key();
        tracker
            .advance(
                PipelineStage::Extracting,
                document_progress(PipelineStage::Extracting, index, total),
            )
            .await;

        if let Some(cached) = self.caches.analyses.get(&cache_key) {
            debug!("Reusing cached analysis for document {}", document.id);
            return Ok(DocumentOutcome::analyzed(cached, true));
        }

        let bytes = fetch_with_cache(
            &document.storage_key,
            move || async move { self.storage.fetch(&document.storage_key).await },
            &self.caches.documents,
            None,
        )
        .await?;

        let mut document = Document::new(document, bytes);
        let text = match self.extract(&mut document).await {
            Ok(text) => text,
            Err(failure) => return Ok(DocumentOutcome::fallback(&document, failure)),
        };

        tracker
            .advance(
                PipelineStage::Analyzing,
                document_progress(PipelineStage::Analyzing, index, total),
            )
            .await;
        let request = AnalysisRequest::new(&text, document.category);
        let narrative = match timeout(
            self.settings.analysis_timeout,
            self.analysis_oracle.analyze(&request),
        )
        .await
        {
            Ok(Ok(narrative)) => narrative,
            Ok(Err(e)) => {
                return Ok(DocumentOutcome::fallback(
                    &document,
                    StageFailure::Oracle(e.to_string()),
                ))
            }
            Err(_) => {
                return Ok(DocumentOutcome::fallback(
                    &document,
                    StageFailure::OracleTimeout(self.settings.analysis_timeout.as_secs()),
                ))
            }
        };

        tracker
            .advance(
                PipelineStage::Parsing,
                document_progress(PipelineStage::Parsing, index, total),
            )
            .await;
        let analysis = assess(document.id, document.category, &narrative);
        if analysis.success {
            self.caches.analyses.set(cache_key, analysis.clone(), None);
        }
        Ok(DocumentOutcome::analyzed(analysis, false))
    }

    /// Runs the CPU-bound extractor off the async workers, bounded by the
    /// extraction timeout. A panicking decoder counts as an extraction failure.
    async fn extract(&self, document: &mut Document) -> Result<String, StageFailure> {
        let extractor = self.settings.extractor.clone();
        let bytes = document.bytes.clone();
        let task = tokio::task::spawn_blocking(move || extractor.extract(&bytes));
        let result = match timeout(self.settings.extraction_timeout, task).await {
            Ok(Ok(Ok(text))) => Ok(text),
            Ok(Ok(Err(e))) => Err(StageFailure::Extraction(e.to_string())),
            Ok(Err(join_error)) => Err(StageFailure::Extraction(format!(
                "extractor aborted: {join_error}"
            ))),
            Err(_) => Err(StageFailure::ExtractionTimeout(
                self.settings.extraction_timeout.as_secs(),
            )),
        };
        document.extraction_status = match result {
            Ok(_) => ExtractionStatus::Extracted,
            Err(_) => ExtractionStatus::Failed,
        };
        result
    }

    /// Loads the form schema through the template cache.
    async fn load_schema(&self) -> Result<Arc<FormSchema>, AppError> {
        let template_key = &self.settings.template_key;
        fetch_with_cache(
            template_key,
            move || async move {
                let bytes = self.storage.fetch(template_key).await?;
                let name = template_key
                    .rsplit('/')
                    .next()
                    .unwrap_or(template_key)
                    .to_string();
                let schema = tokio::task::spawn_blocking(move || {
                    FormSchema::from_template_bytes(&name, &bytes)
                })
                .await
                .map_err(|e| anyhow::anyhow!("Template parser aborted: {e}"))?
                .map_err(|e| {
                    AppError::Storage(format!("Form template '{template_key}' is unusable: {e}"))
                })?;
                info!(
                    "Loaded form template '{template_key}' with {} fields",
                    schema.len()
                );
                Ok::<_, AppError>(Arc::new(schema))
            },
            &self.caches.templates,
            None,
        )
        .await
    }

    async fn generate_values(
        &self,
        schema: &FormSchema,
        documents: &[DocumentOutcome],
    ) -> (ValueMap, Option<String>) {
        let summaries = documents.iter().map(|d| d.analysis.summary()).collect();
        let request = ValueRequest::new(schema, summaries);
        let limit = self.settings.value_generation_timeout;

        let failure = match timeout(limit, self.value_oracle.generate_values(&request)).await {
            Ok(Ok(raw)) => {
                let values = ValueMap::from_json_map(&raw);
                debug!("Value oracle assigned {} fields", values.len());
                return (values, None);
            }
            Ok(Err(e)) => format!("value generation failed: {e}"),
            Err(_) => format!("value generation timed out after {}s", limit.as_secs()),
        };
        warn!("{failure}; filling with an empty value map");
        (ValueMap::new(), Some(failure))
    }
}
