use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::lane::{LaneId, LaneSet};

/// Latest known queue length per lane, as reported by the vehicle counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandSnapshot {
    pub counts: BTreeMap<LaneId, u32>,
    pub captured_at: DateTime<Utc>,
}

impl DemandSnapshot {
    pub fn new(counts: BTreeMap<LaneId, u32>, captured_at: DateTime<Utc>) -> Self {
        Self { counts, captured_at }
    }

    /// Build a snapshot captured now from `(lane, count)` pairs.
    pub fn from_pairs<I, L>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (L, u32)>,
        L: Into<LaneId>,
    {
        Self {
            counts: pairs.into_iter().map(|(l, c)| (l.into(), c)).collect(),
            captured_at: Utc::now(),
        }
    }

    /// Count for a lane; lanes missing from the snapshot count as zero.
    pub fn count(&self, lane: &LaneId) -> u32 {
        self.counts.get(lane).copied().unwrap_or(0)
    }

    /// Sum of all lane counts, saturating at `u32::MAX`.
    pub fn total(&self) -> u32 {
        saturating_total(self.counts.values().copied())
    }

    /// Counts in configuration order, zero-filled.
    pub fn ordered_counts(&self, lanes: &LaneSet) -> Vec<u32> {
        lanes.iter().map(|l| self.count(l)).collect()
    }

    /// Age of the snapshot relative to `now`, in seconds (never negative).
    pub fn age_secs(&self, now: DateTime<Utc>) -> f64 {
        let millis = now.signed_duration_since(self.captured_at).num_milliseconds();
        (millis.max(0) as f64) / 1000.0
    }
}

/// Sum counts without overflowing on corrupt or extreme counter rows.
pub fn saturating_total<I: IntoIterator<Item = u32>>(counts: I) -> u32 {
    counts.into_iter().fold(0u32, |acc, c| acc.saturating_add(c))
}
