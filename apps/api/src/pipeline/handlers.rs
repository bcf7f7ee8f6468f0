use std::collections::HashSet;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::cache::fetch_with_cache;
use crate::documents::models::DocumentRef;
use crate::errors::AppError;
use crate::form::filler::FilledForm;
use crate::models::application::{ApplicationKey, ApplicationRow};
use crate::pipeline::orchestrator::{PipelineReport, PipelineRun};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    pub user_id: Uuid,
    pub documents: Vec<DocumentRef>,
}

#[derive(Debug, Deserialize)]
pub struct ApplicationQuery {
    pub user_id: Uuid,
}

/// POST /api/v1/applications/:application_id/process
/// Runs the pipeline for the given documents and returns the run report.
pub async fn handle_process(
    State(state): State<AppState>,
    Path(application_id): Path<Uuid>,
    Json(body): Json<ProcessRequest>,
) -> Result<Json<PipelineReport>, AppError> {
    if body.documents.is_empty() {
        return Err(AppError::Validation(
            "At least one document is required".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    if let Some(duplicate) = body.documents.iter().find(|d| !seen.insert(d.id)) {
        return Err(AppError::Validation(format!(
            "Document {} is listed more than once",
            duplicate.id
        )));
    }

    let key = ApplicationKey::new(body.user_id, application_id);
    info!("Process request for {key}: {} documents", body.documents.len());

    let report = state
        .pipeline
        .run(PipelineRun {
            key,
            documents: body.documents,
        })
        .await?;
    Ok(Json(report))
}

/// GET /api/v1/applications/:application_id?user_id=
pub async fn handle_get_application(
    State(state): State<AppState>,
    Path(application_id): Path<Uuid>,
    Query(query): Query<ApplicationQuery>,
) -> Result<Json<ApplicationRow>, AppError> {
    let key = ApplicationKey::new(query.user_id, application_id);
    state
        .pipeline
        .store
        .get(&key)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Application {application_id} not found")))
}

/// GET /api/v1/applications/:application_id/preview?user_id=
/// Plain-text preview of the filled form, served through the preview cache.
pub async fn handle_preview(
    State(state): State<AppState>,
    Path(application_id): Path<Uuid>,
    Query(query): Query<ApplicationQuery>,
) -> Result<String, AppError> {
    let key = ApplicationKey::new(query.user_id, application_id);
    let pipeline = &state.pipeline;

    let row = pipeline.store.get(&key).await?;
    let (Some(form_key), Some(cache_key)) = (
        row.as_ref().and_then(|row| row.filled_form_key.clone()),
        row.as_ref().and_then(ApplicationRow::preview_cache_key),
    ) else {
        return Err(AppError::NotFound(format!(
            "No filled form for application {application_id}"
        )));
    };

    let storage = &pipeline.storage;
    let artifact_key = form_key.as_str();
    fetch_with_cache(
        &cache_key,
        move || async move {
            let bytes = storage.fetch(artifact_key).await?;
            let form = FilledForm::from_bytes(&bytes).map_err(anyhow::Error::from)?;
            Ok::<_, AppError>(form.render_preview())
        },
        &pipeline.caches.previews,
        None,
    )
    .await
}
