use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use smartway_core::{PendingExample, RecordId, TrainingRecord};

use crate::error::StoreError;

use super::TrainingStore;

/// Records kept by [`MemoryTrainingStore::new`].
pub const DEFAULT_CAPACITY: usize = 1000;

/// Process-local store used when no database is configured.
///
/// Holds at most `capacity` records; creating one more evicts the oldest,
/// complete or not. Only the newest record can still be waiting for its
/// outcome, so anything older and incomplete is stale anyway.
pub struct MemoryTrainingStore {
    capacity: usize,
    inner: Mutex<Records>,
}

#[derive(Default)]
struct Records {
    records: VecDeque<TrainingRecord>,
    completed: usize,
    next_id: i64,
}

impl MemoryTrainingStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Records::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Copy of every retained record, complete or not, oldest first.
    pub fn records(&self) -> Vec<TrainingRecord> {
        self.lock().records.iter().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, Records> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryTrainingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrainingStore for MemoryTrainingStore {
    async fn create_record(&self, example: &PendingExample) -> Result<RecordId, StoreError> {
        let mut inner = self.lock();
        while inner.records.len() >= self.capacity {
            let Some(evicted) = inner.records.pop_front() else {
                break;
            };
            if evicted.completed {
                inner.completed -= 1;
            }
            debug!(id = evicted.id.0, completed = evicted.completed, "evicted training record");
        }

        inner.next_id += 1;
        let id = RecordId(inner.next_id);
        inner.records.push_back(TrainingRecord {
            id,
            created_at: Utc::now(),
            example: example.clone(),
            after_total: None,
            efficiency: None,
            completed: false,
        });
        Ok(id)
    }

    async fn complete_record(
        &self,
        id: RecordId,
        after_total: u32,
        efficiency: f64,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        // ids are handed out in increasing order
        let index = inner
            .records
            .binary_search_by_key(&id, |r| r.id)
            .map_err(|_| StoreError::NotFound(id))?;
        let record = &mut inner.records[index];
        let newly_completed = !record.completed;
        record.after_total = Some(after_total);
        record.efficiency = Some(efficiency);
        record.completed = true;
        if newly_completed {
            inner.completed += 1;
        }
        Ok(())
    }

    async fn completed_count(&self) -> Result<usize, StoreError> {
        Ok(self.lock().completed)
    }

    async fn completed_records(&self, limit: usize) -> Result<Vec<TrainingRecord>, StoreError> {
        let inner = self.lock();
        let mut window: Vec<TrainingRecord> = inner
            .records
            .iter()
            .rev()
            .filter(|r| r.completed)
            .take(limit)
            .cloned()
            .collect();
        window.reverse();
        Ok(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smartway_core::{Decision, DemandSnapshot, Strategy};

    fn example(lane: &str) -> PendingExample {
        PendingExample {
            snapshot: DemandSnapshot::from_pairs([("A", 3), ("B", 1)]),
            decision: Decision::new(lane.into(), 12, Strategy::RuleBased),
            hour: 7,
            weekday: 0,
            cycles_since_open: 2,
        }
    }

    #[tokio::test]
    async fn create_then_complete() {
        let store = MemoryTrainingStore::new();
        let id = store.create_record(&example("A")).await.unwrap();
        assert_eq!(store.completed_count().await.unwrap(), 0);

        store.complete_record(id, 1, 0.75).await.unwrap();
        assert_eq!(store.completed_count().await.unwrap(), 1);

        let record = &store.records()[0];
        assert!(record.completed);
        assert_eq!(record.after_total, Some(1));
        assert_eq!(record.before_total(), 4);
    }

    #[tokio::test]
    async fn completing_unknown_record_fails() {
        let store = MemoryTrainingStore::new();
        let err = store.complete_record(RecordId(42), 0, 0.0).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(RecordId(42))));
    }

    #[tokio::test]
    async fn completed_records_returns_latest_window() {
        let store = MemoryTrainingStore::new();
        for i in 0..5 {
            let id = store.create_record(&example("B")).await.unwrap();
            // leave the second record incomplete
            if i != 1 {
                store.complete_record(id, 0, 1.0).await.unwrap();
            }
        }
        let window = store.completed_records(3).await.unwrap();
        let ids: Vec<i64> = window.iter().map(|r| r.id.0).collect();
        assert_eq!(ids, vec![3, 4, 5]);
        assert_eq!(store.completed_records(100).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn oldest_records_are_evicted_at_capacity() {
        let store = MemoryTrainingStore::with_capacity(3);
        let mut ids = Vec::new();
        for i in 0..10 {
            let id = store.create_record(&example("A")).await.unwrap();
            // every third record never gets an outcome
            if i % 3 != 0 {
                store.complete_record(id, 0, 0.5).await.unwrap();
            }
            ids.push(id);
        }

        let kept: Vec<i64> = store.records().iter().map(|r| r.id.0).collect();
        assert_eq!(kept, vec![8, 9, 10]);
        // record 10 (i = 9) is the incomplete one
        assert_eq!(store.completed_count().await.unwrap(), 2);
        assert_eq!(store.completed_records(100).await.unwrap().len(), 2);

        let err = store.complete_record(ids[0], 0, 0.0).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(RecordId(1))));
    }

    #[tokio::test]
    async fn completing_twice_counts_once() {
        let store = MemoryTrainingStore::with_capacity(0);
        assert_eq!(store.capacity(), 1);
        let id = store.create_record(&example("C")).await.unwrap();
        store.complete_record(id, 2, 0.1).await.unwrap();
        store.complete_record(id, 1, 0.2).await.unwrap();
        assert_eq!(store.completed_count().await.unwrap(), 1);
        assert_eq!(store.records()[0].after_total, Some(1));
    }
}
