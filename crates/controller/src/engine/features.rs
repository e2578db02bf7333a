//! Feature vectors fed to the learned lane model.
//!
//! Layout for `n` lanes:
//! - classifier: `counts[0..n], hour, weekday, total`
//! - regressor: classifier features, then `target, target / (total + 1), cycles_since_open`

use smartway_core::{saturating_total, LaneSet, TrainingRecord};

/// Length of the classifier vector for `lanes` lanes.
pub fn classifier_len(lanes: usize) -> usize {
    lanes + 3
}

/// Length of the regressor vector for `lanes` lanes.
pub fn regressor_len(lanes: usize) -> usize {
    lanes + 6
}

pub fn classifier_features(counts: &[u32], hour: u32, weekday: u32) -> Vec<f64> {
    let total = saturating_total(counts.iter().copied());
    let mut features: Vec<f64> = counts.iter().map(|&c| c as f64).collect();
    features.extend([hour as f64, weekday as f64, total as f64]);
    features
}

pub fn regressor_features(
    counts: &[u32],
    hour: u32,
    weekday: u32,
    target: u32,
    cycles_since_open: u32,
) -> Vec<f64> {
    let total = saturating_total(counts.iter().copied());
    let mut features = classifier_features(counts, hour, weekday);
    features.extend([
        target as f64,
        target as f64 / (total as f64 + 1.0),
        cycles_since_open as f64,
    ]);
    features
}

/// One supervised example extracted from a completed training record.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingRow {
    pub classifier: Vec<f64>,
    pub regressor: Vec<f64>,
    /// Index of the chosen lane in configuration order.
    pub lane_index: usize,
    /// Green seconds that were commanded.
    pub seconds: f64,
}

impl TrainingRow {
    /// Build a row from a record. Incomplete records and records for lanes
    /// that are no longer configured yield `None`.
    pub fn from_record(record: &TrainingRecord, lanes: &LaneSet) -> Option<Self> {
        if !record.completed {
            return None;
        }
        let example = &record.example;
        let lane = example.decision.lane();
        let lane_index = lanes.index_of(lane)?;
        let counts = example.snapshot.ordered_counts(lanes);
        let target = example.snapshot.count(lane);

        Some(Self {
            classifier: classifier_features(&counts, example.hour, example.weekday),
            regressor: regressor_features(
                &counts,
                example.hour,
                example.weekday,
                target,
                example.cycles_since_open,
            ),
            lane_index,
            seconds: example.decision.duration_secs() as f64,
        })
    }
}
