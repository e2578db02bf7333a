//! Persistence for training records.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use smartway_core::{PendingExample, RecordId, TrainingRecord};

use crate::error::StoreError;

pub use memory::MemoryTrainingStore;
pub use postgres::PgTrainingStore;

#[async_trait]
pub trait TrainingStore: Send + Sync {
    /// Persist a new, incomplete record and return its id.
    async fn create_record(&self, example: &PendingExample) -> Result<RecordId, StoreError>;

    /// Attach the measured outcome and mark the record complete.
    async fn complete_record(
        &self,
        id: RecordId,
        after_total: u32,
        efficiency: f64,
    ) -> Result<(), StoreError>;

    async fn completed_count(&self) -> Result<usize, StoreError>;

    /// The `limit` most recent completed records, oldest first.
    async fn completed_records(&self, limit: usize) -> Result<Vec<TrainingRecord>, StoreError>;
}
