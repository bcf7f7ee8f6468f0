//! Pipeline stages and progress reporting.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::models::application::ApplicationKey;
use crate::storage::store::ApplicationStore;

/// Per-document stages share this band of the progress bar.
const DOCUMENT_BAND: (u8, u8) = (5, 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Pending,
    Extracting,
    Analyzing,
    Parsing,
    GeneratingValues,
    Filling,
    Aggregating,
    Completed,
    Failed,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Pending => "pending",
            PipelineStage::Extracting => "extracting",
            PipelineStage::Analyzing => "analyzing",
            PipelineStage::Parsing => "parsing",
            PipelineStage::GeneratingValues => "generating_values",
            PipelineStage::Filling => "filling",
            PipelineStage::Aggregating => "aggregating",
            PipelineStage::Completed => "completed",
            PipelineStage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::Completed | PipelineStage::Failed)
    }

    /// Progress for run-level stages. Per-document stages use `document_progress`.
    pub fn progress(&self) -> u8 {
        match self {
            PipelineStage::Pending => 0,
            PipelineStage::Extracting | PipelineStage::Analyzing | PipelineStage::Parsing => {
                DOCUMENT_BAND.0
            }
            PipelineStage::GeneratingValues => 65,
            PipelineStage::Filling => 80,
            PipelineStage::Aggregating => 90,
            PipelineStage::Completed | PipelineStage::Failed => 100,
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress for a per-document stage of document `index` (0-based) out of `total`.
pub fn document_progress(stage: PipelineStage, index: usize, total: usize) -> u8 {
    let step = match stage {
        PipelineStage::Extracting => 0,
        PipelineStage::Analyzing => 1,
        PipelineStage::Parsing => 2,
        other => return other.progress(),
    };
    let (low, high) = DOCUMENT_BAND;
    let span = f64::from(high - low);
    let per_document = span / total.max(1) as f64;
    let offset = per_document * index as f64 + per_document * step as f64 / 3.0;
    (f64::from(low) + offset).floor().min(f64::from(high)) as u8
}

/// Receives `(status, percentage)` at every stage transition. Never fails the run.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, key: &ApplicationKey, stage: PipelineStage, progress: u8);
}

/// Writes progress through the application store.
pub struct StoreProgressSink {
    store: Arc<dyn ApplicationStore>,
}

impl StoreProgressSink {
    pub fn new(store: Arc<dyn ApplicationStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ProgressSink for StoreProgressSink {
    async fn report(&self, key: &ApplicationKey, stage: PipelineStage, progress: u8) {
        if let Err(e) = self.store.update_status(key, stage.as_str(), progress).await {
            warn!("Failed to record progress {stage} ({progress}%) for {key}: {e}");
        }
    }
}

/// Clamps reported progress so it never decreases within a run.
pub struct ProgressTracker<'a> {
    sink: &'a dyn ProgressSink,
    key: ApplicationKey,
    last: u8,
    finished: bool,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(sink: &'a dyn ProgressSink, key: ApplicationKey) -> Self {
        Self {
            sink,
            key,
            last: 0,
            finished: false,
        }
    }

    pub async fn advance(&mut self, stage: PipelineStage, progress: u8) {
        if self.finished {
            debug!("Ignoring {stage} for {}: run already finished", self.key);
            return;
        }
        self.finished = stage.is_terminal();
        let progress = progress.clamp(self.last, 100);
        self.last = progress;
        info!("Application {}: {stage} ({progress}%)", self.key);
        self.sink.report(&self.key, stage, progress).await;
    }

    pub async fn stage(&mut self, stage: PipelineStage) {
        self.advance(stage, stage.progress()).await;
    }

    pub fn last(&self) -> u8 {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<(PipelineStage, u8)>>);

    #[async_trait]
    impl ProgressSink for RecordingSink {
        async fn report(&self, _key: &ApplicationKey, stage: PipelineStage, progress: u8) {
            self.0.lock().unwrap().push((stage, progress));
        }
    }

    #[test]
    fn test_document_progress_stays_in_band_and_increases() {
        for total in [1usize, 2, 3, 9] {
            let mut last = 0;
            for index in 0..total {
                for stage in [
                    PipelineStage::Extracting,
                    PipelineStage::Analyzing,
                    PipelineStage::Parsing,
                ] {
                    let p = document_progress(stage, index, total);
                    assert!((5..=60).contains(&p), "{p} out of band");
                    assert!(p >= last);
                    last = p;
                }
            }
            assert!(last < PipelineStage::GeneratingValues.progress());
        }
    }

    #[test]
    fn test_run_level_percentages() {
        assert_eq!(PipelineStage::Pending.progress(), 0);
        assert_eq!(PipelineStage::GeneratingValues.progress(), 65);
        assert_eq!(PipelineStage::Filling.progress(), 80);
        assert_eq!(PipelineStage::Aggregating.progress(), 90);
        assert_eq!(PipelineStage::Failed.progress(), 100);
        assert!(PipelineStage::Completed.is_terminal());
    }

    #[tokio::test]
    async fn test_tracker_never_decreases() {
        let sink = RecordingSink::default();
        let key = ApplicationKey::new(uuid::Uuid::new_v4(), uuid::Uuid::new_v4());
        let mut tracker = ProgressTracker::new(&sink, key);

        tracker.stage(PipelineStage::Filling).await;
        tracker.advance(PipelineStage::Parsing, 30).await;
        tracker.stage(PipelineStage::Completed).await;

        let reported = sink.0.lock().unwrap().clone();
        assert_eq!(
            reported,
            vec![
                (PipelineStage::Filling, 80),
                (PipelineStage::Parsing, 80),
                (PipelineStage::Completed, 100),
            ]
        );
        assert_eq!(tracker.last(), 100);
    }

    #[tokio::test]
    async fn test_tracker_ignores_reports_after_terminal_stage() {
        let sink = RecordingSink::default();
        let key = ApplicationKey::new(uuid::Uuid::new_v4(), uuid::Uuid::new_v4());
        let mut tracker = ProgressTracker::new(&sink, key);

        tracker.stage(PipelineStage::Completed).await;
        tracker.stage(PipelineStage::Failed).await;

        let reported = sink.0.lock().unwrap().clone();
        assert_eq!(reported, vec![(PipelineStage::Completed, 100)]);
    }
}
