use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, warn};

use smartway_core::config::DemandConfig;
use smartway_core::{DemandSnapshot, LaneId, LaneSet};

use crate::error::DemandError;

use super::DemandProvider;

/// Reads the newest count per lane from the vehicle counter's `veiculos` table.
pub struct PgDemandProvider {
    pool: PgPool,
    lanes: LaneSet,
    lane_mapping: BTreeMap<String, String>,
    stale_after_secs: u64,
}

#[derive(Debug, sqlx::FromRow)]
struct LatestCount {
    lane_id: String,
    current_cars: Option<i32>,
    captured_at: Option<DateTime<Utc>>,
}

impl PgDemandProvider {
    pub fn new(pool: PgPool, lanes: LaneSet, config: &DemandConfig) -> Self {
        Self {
            pool,
            lanes,
            lane_mapping: config.lane_mapping.clone(),
            stale_after_secs: config.stale_after_secs,
        }
    }

    /// Map a counter lane id to a configured lane, if it is one.
    fn resolve(&self, counter_id: &str) -> Option<LaneId> {
        let id = self
            .lane_mapping
            .get(counter_id)
            .map(String::as_str)
            .unwrap_or(counter_id);
        self.lanes.resolve(id).ok().cloned()
    }

    fn snapshot(&self, rows: Vec<LatestCount>) -> Result<Option<DemandSnapshot>, DemandError> {
        if rows.is_empty() {
            return Ok(None);
        }

        let mut counts: BTreeMap<LaneId, u32> =
            self.lanes.iter().map(|l| (l.clone(), 0)).collect();
        let mut newest: Option<DateTime<Utc>> = None;

        for row in rows {
            let Some(lane) = self.resolve(&row.lane_id) else {
                debug!(lane_id = %row.lane_id, "ignoring count for unmapped lane");
                continue;
            };
            let cars = row.current_cars.unwrap_or(0);
            let cars = u32::try_from(cars).map_err(|_| DemandError::InvalidCount {
                lane: row.lane_id.clone(),
                value: cars as i64,
            })?;
            counts.insert(lane, cars);
            if let Some(ts) = row.captured_at {
                newest = Some(newest.map_or(ts, |n| n.max(ts)));
            }
        }

        let now = Utc::now();
        let captured_at = newest.unwrap_or(now);
        let snapshot = DemandSnapshot::new(counts, captured_at);
        let age = snapshot.age_secs(now);
        if age > self.stale_after_secs as f64 {
            warn!(age_secs = age, "vehicle counts may be stale");
        }
        Ok(Some(snapshot))
    }
}

#[async_trait]
impl DemandProvider for PgDemandProvider {
    async fn latest_counts(&self) -> Result<Option<DemandSnapshot>, DemandError> {
        let rows = sqlx::query_as::<_, LatestCount>(
            "SELECT lane_id, current_cars, CAST(timestamp AS timestamptz) AS captured_at
             FROM (
                 SELECT lane_id, current_cars, timestamp,
                        ROW_NUMBER() OVER (PARTITION BY lane_id ORDER BY id DESC) AS rn
                 FROM veiculos
             ) latest
             WHERE rn = 1",
        )
        .fetch_all(&self.pool)
        .await?;

        self.snapshot(rows)
    }
}
