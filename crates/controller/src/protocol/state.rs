use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::time::Instant;

use smartway_core::{Decision, LaneId, LaneSet, RecordId};

use crate::fairness::FairnessTracker;
use crate::metrics::ControllerMetrics;

use super::CyclePhase;

/// Lanes that confirmed the current command. Never larger than the lane set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AckSet {
    acked: BTreeSet<LaneId>,
}

impl AckSet {
    /// Add a lane. Returns `false` if it was already present.
    pub fn insert(&mut self, lane: LaneId) -> bool {
        self.acked.insert(lane)
    }

    pub fn clear(&mut self) {
        self.acked.clear();
    }

    pub fn len(&self) -> usize {
        self.acked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.acked.is_empty()
    }

    pub fn contains(&self, lane: &LaneId) -> bool {
        self.acked.contains(lane)
    }

    /// Quorum: every configured lane has acknowledged.
    pub fn is_complete(&self, lanes: &LaneSet) -> bool {
        lanes.iter().all(|l| self.acked.contains(l))
    }
}

/// Training record awaiting its outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingRecord {
    pub id: RecordId,
    pub before_total: u32,
}

/// The decision currently on the street.
#[derive(Debug, Clone)]
pub struct ActiveCycle {
    pub decision: Decision,
    pub dispatched_at: Instant,
}

/// Everything shared between the control loop and the ack handler.
#[derive(Debug)]
pub struct ControlState {
    pub phase: CyclePhase,
    pub acks: AckSet,
    pub fairness: FairnessTracker,
    pub pending: Option<PendingRecord>,
    pub active: Option<ActiveCycle>,
    pub metrics: ControllerMetrics,
}

impl ControlState {
    pub fn new(lanes: LaneSet) -> Self {
        Self {
            phase: CyclePhase::Idle,
            acks: AckSet::default(),
            fairness: FairnessTracker::new(lanes),
            pending: None,
            active: None,
            metrics: ControllerMetrics::default(),
        }
    }
}

/// Handle to the single lock guarding [`ControlState`].
///
/// Critical sections are short and never await, so a blocking mutex is used.
#[derive(Debug, Clone)]
pub struct SharedState {
    inner: Arc<Mutex<ControlState>>,
}

impl SharedState {
    pub fn new(lanes: LaneSet) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ControlState::new(lanes))),
        }
    }

    /// Lock the state. A poisoned lock is recovered: every critical section
    /// leaves the state consistent before it can panic.
    pub fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> CyclePhase {
        self.lock().phase
    }

    pub fn metrics(&self) -> ControllerMetrics {
        self.lock().metrics.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_set_is_idempotent() {
        let lanes = LaneSet::from_ids(["A", "B"]).unwrap();
        let mut acks = AckSet::default();
        assert!(acks.insert("A".into()));
        assert!(!acks.insert("A".into()));
        assert_eq!(acks.len(), 1);
        assert!(!acks.is_complete(&lanes));

        acks.insert("B".into());
        assert!(acks.is_complete(&lanes));

        acks.clear();
        assert!(acks.is_empty());
    }

    #[test]
    fn fresh_state_is_idle() {
        let state = SharedState::new(LaneSet::from_ids(["A", "B"]).unwrap());
        assert_eq!(state.phase(), CyclePhase::Idle);
        let guard = state.lock();
        assert!(guard.pending.is_none());
        assert!(guard.active.is_none());
        assert!(guard.acks.is_empty());
    }
}
