//! Best-effort training data collection.
//!
//! A record is opened when a decision is dispatched and completed once the
//! cycle has finalized. Failures are logged and never reach the control loop.

use std::sync::Arc;

use tracing::{debug, info, warn};

use smartway_core::{PendingExample, RecordId};

use crate::demand::DemandProvider;
use crate::store::TrainingStore;

/// Upper bound for a stored efficiency score.
pub const MAX_EFFICIENCY: f64 = 9.9999;

/// Normalized drop in total demand over one cycle, clamped to `[0, MAX_EFFICIENCY]`.
pub fn efficiency(before_total: u32, after_total: u32) -> f64 {
    let raw = (before_total as f64 - after_total as f64) / before_total.max(1) as f64;
    raw.clamp(0.0, MAX_EFFICIENCY)
}

/// What happened when a record was closed.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Recorded { after_total: u32, efficiency: f64 },
    /// No fresh counts (or an empty intersection); the record stays incomplete.
    NoDemand,
    Failed,
}

pub struct TrainingRecorder {
    store: Arc<dyn TrainingStore>,
    demand: Arc<dyn DemandProvider>,
    enabled: bool,
}

impl TrainingRecorder {
    pub fn new(store: Arc<dyn TrainingStore>, demand: Arc<dyn DemandProvider>, enabled: bool) -> Self {
        Self {
            store,
            demand,
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Persist the pre-decision state. `None` if recording is off or the store failed.
    pub async fn open(&self, example: &PendingExample) -> Option<RecordId> {
        if !self.enabled {
            return None;
        }
        match self.store.create_record(example).await {
            Ok(id) => {
                debug!(
                    record = %id,
                    lane = %example.decision.lane(),
                    "training record opened"
                );
                Some(id)
            }
            Err(e) => {
                warn!(error = %e, "failed to open training record");
                None
            }
        }
    }

    /// Measure the outcome of a finished cycle and close its record.
    pub async fn complete(&self, id: RecordId, before_total: u32) -> Completion {
        let after = match self.demand.latest_counts().await {
            Ok(Some(snapshot)) => snapshot.total(),
            Ok(None) => {
                debug!(record = %id, "no demand data, record left incomplete");
                return Completion::NoDemand;
            }
            Err(e) => {
                warn!(record = %id, error = %e, "failed to read demand, record left incomplete");
                return Completion::NoDemand;
            }
        };
        if after == 0 {
            debug!(record = %id, "empty intersection, record left incomplete");
            return Completion::NoDemand;
        }

        let score = efficiency(before_total, after);
        match self.store.complete_record(id, after, score).await {
            Ok(()) => {
                info!(
                    record = %id,
                    before = before_total,
                    after,
                    efficiency = score,
                    "training record completed"
                );
                Completion::Recorded {
                    after_total: after,
                    efficiency: score,
                }
            }
            Err(e) => {
                warn!(record = %id, error = %e, "failed to complete training record");
                Completion::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use smartway_core::{Decision, DemandSnapshot, Strategy, TrainingRecord};

    use crate::error::{DemandError, StoreError};
    use crate::store::MemoryTrainingStore;

    struct FixedDemand(Mutex<Option<DemandSnapshot>>);

    #[async_trait]
    impl DemandProvider for FixedDemand {
        async fn latest_counts(&self) -> Result<Option<DemandSnapshot>, DemandError> {
            Ok(self.0.lock().unwrap().clone())
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl TrainingStore for BrokenStore {
        async fn create_record(&self, _: &PendingExample) -> Result<RecordId, StoreError> {
            Err(StoreError::NotFound(RecordId(0)))
        }
        async fn complete_record(&self, id: RecordId, _: u32, _: f64) -> Result<(), StoreError> {
            Err(StoreError::NotFound(id))
        }
        async fn completed_count(&self) -> Result<usize, StoreError> {
            Ok(0)
        }
        async fn completed_records(&self, _: usize) -> Result<Vec<TrainingRecord>, StoreError> {
            Ok(Vec::new())
        }
    }

    fn example() -> PendingExample {
        PendingExample {
            snapshot: DemandSnapshot::from_pairs([("A", 6), ("B", 4)]),
            decision: Decision::new("A".into(), 18, Strategy::RuleBased),
            hour: 17,
            weekday: 4,
            cycles_since_open: 1,
        }
    }

    fn demand(after: Option<[(&str, u32); 2]>) -> Arc<FixedDemand> {
        Arc::new(FixedDemand(Mutex::new(after.map(DemandSnapshot::from_pairs))))
    }

    #[test]
    fn efficiency_is_clamped() {
        assert_eq!(efficiency(10, 4), 0.6);
        assert_eq!(efficiency(10, 10), 0.0);
        // more cars afterwards would be negative
        assert_eq!(efficiency(3, 20), 0.0);
        assert_eq!(efficiency(0, 0), 0.0);
        assert_eq!(efficiency(u32::MAX, 0), 1.0);
        for (before, after) in [(0, 5), (1, 0), (7, 9), (1000, 1), (u32::MAX, u32::MAX)] {
            let e = efficiency(before, after);
            assert!((0.0..=MAX_EFFICIENCY).contains(&e));
        }
    }

    #[tokio::test]
    async fn open_and_complete_record() {
        let store = Arc::new(MemoryTrainingStore::new());
        let recorder = TrainingRecorder::new(store.clone(), demand(Some([("A", 1), ("B", 3)])), true);

        let id = recorder.open(&example()).await.unwrap();
        let outcome = recorder.complete(id, 10).await;
        assert_eq!(
            outcome,
            Completion::Recorded {
                after_total: 4,
                efficiency: 0.6
            }
        );
        let record = &store.records()[0];
        assert!(record.completed);
        assert_eq!(record.efficiency, Some(0.6));
    }

    #[tokio::test]
    async fn missing_or_empty_demand_leaves_record_incomplete() {
        for after in [None, Some([("A", 0), ("B", 0)])] {
            let store = Arc::new(MemoryTrainingStore::new());
            let recorder = TrainingRecorder::new(store.clone(), demand(after), true);
            let id = recorder.open(&example()).await.unwrap();
            assert_eq!(recorder.complete(id, 10).await, Completion::NoDemand);
            assert!(!store.records()[0].completed);
        }
    }

    #[tokio::test]
    async fn store_failures_are_swallowed() {
        let recorder = TrainingRecorder::new(
            Arc::new(BrokenStore),
            demand(Some([("A", 1), ("B", 1)])),
            true,
        );
        assert_eq!(recorder.open(&example()).await, None);
        assert_eq!(recorder.complete(RecordId(9), 10).await, Completion::Failed);
    }

    #[tokio::test]
    async fn disabled_recorder_opens_nothing() {
        let store = Arc::new(MemoryTrainingStore::new());
        let recorder = TrainingRecorder::new(store.clone(), demand(None), false);
        assert_eq!(recorder.open(&example()).await, None);
        assert!(store.records().is_empty());
    }
}
