//! Model trainer boundary.
//!
//! The control loop asks [`ModelTrainer`] after every cycle whether a
//! training run is due. Training pulls the most recent completed records,
//! turns them into feature rows and fits the shared [`LaneModel`] on a
//! blocking thread. The caller only sees success or failure.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use smartway_core::config::TrainingConfig;
use smartway_core::LaneSet;

use crate::engine::features::TrainingRow;
use crate::error::ModelError;
use crate::model::{LaneModel, TrainingSummary};
use crate::store::TrainingStore;

/// When to (re)train.
///
/// The first run happens as soon as `min_completed` records exist; later
/// runs happen every `retrain_every` cycles after the previous attempt.
#[derive(Debug, Clone)]
pub struct RetrainPolicy {
    min_completed: usize,
    retrain_every: u32,
    since_attempt: u32,
    attempted: bool,
}

impl RetrainPolicy {
    pub fn new(config: &TrainingConfig) -> Self {
        Self {
            min_completed: config.min_completed,
            retrain_every: config.retrain_every.max(1),
            since_attempt: 0,
            attempted: false,
        }
    }

    /// Count one finished cycle.
    pub fn on_cycle(&mut self) {
        self.since_attempt = self.since_attempt.saturating_add(1);
    }

    pub fn is_due(&self, completed: usize) -> bool {
        if completed < self.min_completed {
            return false;
        }
        !self.attempted || self.since_attempt >= self.retrain_every
    }

    pub fn mark_attempt(&mut self) {
        self.attempted = true;
        self.since_attempt = 0;
    }
}

pub struct ModelTrainer {
    store: Arc<dyn TrainingStore>,
    model: Arc<dyn LaneModel>,
    lanes: LaneSet,
    window: usize,
    enabled: bool,
    policy: RetrainPolicy,
}

impl ModelTrainer {
    pub fn new(
        config: &TrainingConfig,
        lanes: LaneSet,
        store: Arc<dyn TrainingStore>,
        model: Arc<dyn LaneModel>,
    ) -> Self {
        Self {
            store,
            model,
            lanes,
            window: config.window,
            enabled: config.enabled,
            policy: RetrainPolicy::new(config),
        }
    }

    /// Train if the policy says so. `None` means no run was attempted.
    pub async fn maybe_retrain(&mut self) -> Option<Result<TrainingSummary, ModelError>> {
        if !self.enabled {
            return None;
        }
        let completed = match self.store.completed_count().await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "could not count completed training records");
                return None;
            }
        };
        if !self.policy.is_due(completed) {
            debug!(completed, "retrain not due");
            return None;
        }
        self.policy.mark_attempt();
        Some(self.train().await)
    }

    /// Called once per finished cycle, then behaves like [`maybe_retrain`](Self::maybe_retrain).
    pub async fn after_cycle(&mut self) -> Option<Result<TrainingSummary, ModelError>> {
        self.policy.on_cycle();
        self.maybe_retrain().await
    }

    /// Fit the model on the most recent completed records.
    pub async fn train(&self) -> Result<TrainingSummary, ModelError> {
        let records = self
            .store
            .completed_records(self.window)
            .await
            .map_err(|e| ModelError::Training(format!("loading records: {e}")))?;
        let rows: Vec<TrainingRow> = records
            .iter()
            .filter_map(|r| TrainingRow::from_record(r, &self.lanes))
            .collect();
        if rows.len() < records.len() {
            debug!(
                skipped = records.len() - rows.len(),
                "records not usable for training"
            );
        }

        info!(rows = rows.len(), "training lane model");
        let started = Instant::now();
        let model = self.model.clone();
        let summary = tokio::task::spawn_blocking(move || model.retrain(&rows))
            .await
            .map_err(|e| ModelError::Training(format!("training task failed: {e}")))??;

        info!(
            rows = summary.rows,
            lane_accuracy = summary.lane_accuracy,
            duration_mae = summary.duration_mae,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "lane model trained"
        );
        Ok(summary)
    }
}
