use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decision::Decision;
use crate::demand::DemandSnapshot;

/// Opaque identifier handed out by the training store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub i64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Context captured at dispatch time, before the outcome is known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingExample {
    pub snapshot: DemandSnapshot,
    pub decision: Decision,
    /// Local hour of day (0-23) when the decision was made.
    pub hour: u32,
    /// Local weekday, Monday = 0.
    pub weekday: u32,
    /// How many cycles the chosen lane had waited before this decision.
    pub cycles_since_open: u32,
}

/// One training example: the pre-decision state, the decision, and (once
/// feedback settles) the measured outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecord {
    pub id: RecordId,
    pub created_at: DateTime<Utc>,
    pub example: PendingExample,
    pub after_total: Option<u32>,
    pub efficiency: Option<f64>,
    pub completed: bool,
}

impl TrainingRecord {
    /// Total cars across all lanes before the decision.
    pub fn before_total(&self) -> u32 {
        self.example.snapshot.total()
    }
}
