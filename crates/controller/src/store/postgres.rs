use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::debug;

use smartway_core::{
    Decision, DemandSnapshot, LaneId, PendingExample, RecordId, SmartwayError, Strategy,
    TrainingRecord,
};

use crate::error::StoreError;

use super::TrainingStore;

/// Training records in the `ml_training_data` table.
pub struct PgTrainingStore {
    pool: PgPool,
}

impl PgTrainingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StoredRecord {
    id: i64,
    created_at: DateTime<Utc>,
    snapshot_at: DateTime<Utc>,
    lane_counts: Json<BTreeMap<LaneId, u32>>,
    hour_of_day: i32,
    weekday: i32,
    chosen_lane: String,
    green_seconds: i32,
    strategy: String,
    cycles_since_open: i32,
    cars_after: Option<i32>,
    efficiency: Option<f64>,
    completed: bool,
}

fn non_negative(id: i64, field: &str, value: i32) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt {
        id,
        reason: format!("{field} is negative ({value})"),
    })
}

/// Postgres `INTEGER` columns top out at `i32::MAX`.
fn clamp_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

impl TryFrom<StoredRecord> for TrainingRecord {
    type Error = StoreError;

    fn try_from(row: StoredRecord) -> Result<Self, Self::Error> {
        let id = row.id;
        let strategy: Strategy = row
            .strategy
            .parse()
            .map_err(|e: SmartwayError| StoreError::Corrupt {
                id,
                reason: e.to_string(),
            })?;
        let after_total = row
            .cars_after
            .map(|v| non_negative(id, "cars_after", v))
            .transpose()?;

        Ok(TrainingRecord {
            id: RecordId(id),
            created_at: row.created_at,
            example: PendingExample {
                snapshot: DemandSnapshot::new(row.lane_counts.0, row.snapshot_at),
                decision: Decision::new(
                    LaneId::new(row.chosen_lane),
                    row.green_seconds as i64,
                    strategy,
                ),
                hour: non_negative(id, "hour_of_day", row.hour_of_day)?,
                weekday: non_negative(id, "weekday", row.weekday)?,
                cycles_since_open: non_negative(id, "cycles_since_open", row.cycles_since_open)?,
            },
            after_total,
            efficiency: row.efficiency,
            completed: row.completed,
        })
    }
}

#[async_trait]
impl TrainingStore for PgTrainingStore {
    async fn create_record(&self, example: &PendingExample) -> Result<RecordId, StoreError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO ml_training_data
                (snapshot_at, lane_counts, hour_of_day, weekday, chosen_lane,
                 green_seconds, strategy, cycles_since_open, cars_before)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING id",
        )
        .bind(example.snapshot.captured_at)
        .bind(Json(&example.snapshot.counts))
        .bind(example.hour as i32)
        .bind(example.weekday as i32)
        .bind(example.decision.lane().as_str())
        .bind(example.decision.duration_secs() as i32)
        .bind(example.decision.strategy().as_str())
        .bind(clamp_i32(example.cycles_since_open))
        .bind(clamp_i32(example.snapshot.total()))
        .fetch_one(&self.pool)
        .await?;

        debug!(id, "training record created");
        Ok(RecordId(id))
    }

    async fn complete_record(
        &self,
        id: RecordId,
        after_total: u32,
        efficiency: f64,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE ml_training_data
             SET cars_after = $1, efficiency = $2, completed = TRUE
             WHERE id = $3",
        )
        .bind(clamp_i32(after_total))
        .bind(efficiency)
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn completed_count(&self) -> Result<usize, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM ml_training_data WHERE completed")
                .fetch_one(&self.pool)
                .await?;
        Ok(count.max(0) as usize)
    }

    async fn completed_records(&self, limit: usize) -> Result<Vec<TrainingRecord>, StoreError> {
        let rows = sqlx::query_as::<_, StoredRecord>(
            "SELECT id, created_at, snapshot_at, lane_counts, hour_of_day, weekday,
                    chosen_lane, green_seconds, strategy, cycles_since_open,
                    cars_after, efficiency, completed
             FROM ml_training_data
             WHERE completed
             ORDER BY id DESC
             LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut records = rows
            .into_iter()
            .map(TrainingRecord::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        records.reverse();
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(strategy: &str, cars_after: Option<i32>) -> StoredRecord {
        StoredRecord {
            id: 7,
            created_at: Utc::now(),
            snapshot_at: Utc::now(),
            lane_counts: Json(BTreeMap::from([(LaneId::from("A"), 4), (LaneId::from("B"), 1)])),
            hour_of_day: 8,
            weekday: 2,
            chosen_lane: "A".to_string(),
            green_seconds: 12,
            strategy: strategy.to_string(),
            cycles_since_open: 1,
            cars_after,
            efficiency: Some(0.5),
            completed: true,
        }
    }

    #[test]
    fn counts_beyond_integer_column_are_clamped() {
        assert_eq!(clamp_i32(17), 17);
        assert_eq!(clamp_i32(i32::MAX as u32), i32::MAX);
        assert_eq!(clamp_i32(u32::MAX), i32::MAX);
    }

    #[test]
    fn stored_row_converts_to_record() {
        let record = TrainingRecord::try_from(stored("learned", Some(2))).unwrap();
        assert_eq!(record.id, RecordId(7));
        assert_eq!(record.example.decision.strategy(), Strategy::Learned);
        assert_eq!(record.before_total(), 5);
        assert_eq!(record.after_total, Some(2));
    }

    #[test]
    fn corrupt_rows_are_rejected() {
        let err = TrainingRecord::try_from(stored("neural", None)).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { id: 7, ref reason } if reason.contains("neural")));

        let err = TrainingRecord::try_from(stored("rule_based", Some(-3))).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { id: 7, .. }));
    }
}
