use std::sync::Arc;

use crate::pipeline::orchestrator::Pipeline;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// The pipeline owns every collaborator (storage, store, oracles, lock, caches).
    pub pipeline: Arc<Pipeline>,
}
