//! Per-lane starvation counters and round tracking.
//!
//! The tracker is a pure state machine: it never performs I/O and it is only
//! mutated once a cycle has completed (or been aborted after dispatch).

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::warn;

use smartway_core::{LaneId, LaneSet};

/// Point-in-time copy of the fairness state, handed to the decision engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FairnessSnapshot {
    pub cycles_since_open: BTreeMap<LaneId, u32>,
    pub opened_this_round: BTreeSet<LaneId>,
    pub last_opened: Option<LaneId>,
}

impl FairnessSnapshot {
    pub fn cycles(&self, lane: &LaneId) -> u32 {
        self.cycles_since_open.get(lane).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub struct FairnessTracker {
    lanes: LaneSet,
    cycles_since_open: BTreeMap<LaneId, u32>,
    opened_this_round: BTreeSet<LaneId>,
    last_opened: Option<LaneId>,
    /// Index into `lanes` of the next forced-rotation lane.
    rotation: usize,
}

impl FairnessTracker {
    pub fn new(lanes: LaneSet) -> Self {
        let cycles_since_open = lanes.iter().map(|l| (l.clone(), 0)).collect();
        Self {
            lanes,
            cycles_since_open,
            opened_this_round: BTreeSet::new(),
            last_opened: None,
            rotation: 0,
        }
    }

    pub fn lanes(&self) -> &LaneSet {
        &self.lanes
    }

    pub fn cycles_since_open(&self, lane: &LaneId) -> u32 {
        self.cycles_since_open.get(lane).copied().unwrap_or(0)
    }

    pub fn opened_this_round(&self) -> &BTreeSet<LaneId> {
        &self.opened_this_round
    }

    /// The lane opened by the most recent completed cycle.
    pub fn last_opened(&self) -> Option<&LaneId> {
        self.last_opened.as_ref()
    }

    /// The lane the next forced-rotation decision would pick.
    pub fn rotation_lane(&self) -> &LaneId {
        self.lanes.get(self.rotation).unwrap_or_else(|| self.lanes.first())
    }

    /// All lanes except `exclude`, in configuration order.
    ///
    /// If excluding would leave nothing, the exclusion is dropped.
    pub fn candidates(&self, exclude: Option<&LaneId>) -> Vec<LaneId> {
        Self::without(self.lanes.iter().cloned().collect(), exclude)
    }

    /// Lanes not yet opened in the current round, minus `exclude`.
    ///
    /// A fresh round offers every lane. As with [`candidates`](Self::candidates),
    /// the exclusion is dropped rather than returning an empty set.
    pub fn round_candidates(&self, exclude: Option<&LaneId>) -> Vec<LaneId> {
        let remaining: Vec<LaneId> = self
            .lanes
            .iter()
            .filter(|l| !self.opened_this_round.contains(*l))
            .cloned()
            .collect();
        if remaining.is_empty() {
            return self.candidates(exclude);
        }
        Self::without(remaining, exclude)
    }

    fn without(lanes: Vec<LaneId>, exclude: Option<&LaneId>) -> Vec<LaneId> {
        let Some(excluded) = exclude else {
            return lanes;
        };
        let filtered: Vec<LaneId> = lanes.iter().filter(|l| *l != excluded).cloned().collect();
        if filtered.is_empty() {
            lanes
        } else {
            filtered
        }
    }

    /// Take the forced-rotation lane and advance the pointer.
    pub fn take_rotation_lane(&mut self) -> LaneId {
        let lane = self.rotation_lane().clone();
        self.rotation = (self.rotation + 1) % self.lanes.len();
        lane
    }

    /// Apply the outcome of a finished cycle that opened `chosen`.
    pub fn on_cycle_complete(&mut self, chosen: &LaneId) {
        let Some(index) = self.lanes.index_of(chosen) else {
            warn!(lane = %chosen, "cycle completed for unconfigured lane, fairness unchanged");
            return;
        };

        for (lane, cycles) in self.cycles_since_open.iter_mut() {
            if lane == chosen {
                *cycles = 0;
            } else {
                *cycles += 1;
            }
        }

        self.opened_this_round.insert(chosen.clone());
        if self.opened_this_round.len() == self.lanes.len() {
            self.opened_this_round.clear();
        }

        self.last_opened = Some(chosen.clone());
        self.rotation = (index + 1) % self.lanes.len();
    }

    pub fn snapshot(&self) -> FairnessSnapshot {
        FairnessSnapshot {
            cycles_since_open: self.cycles_since_open.clone(),
            opened_this_round: self.opened_this_round.clone(),
            last_opened: self.last_opened.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> FairnessTracker {
        FairnessTracker::new(LaneSet::from_ids(["A", "B", "C", "D"]).unwrap())
    }

    fn ids(lanes: &[LaneId]) -> Vec<&str> {
        lanes.iter().map(|l| l.as_str()).collect()
    }

    #[test]
    fn complete_resets_chosen_and_increments_others() {
        let mut t = tracker();
        t.on_cycle_complete(&"C".into());
        t.on_cycle_complete(&"A".into());

        assert_eq!(t.cycles_since_open(&"A".into()), 0);
        assert_eq!(t.cycles_since_open(&"B".into()), 2);
        assert_eq!(t.cycles_since_open(&"C".into()), 1);
        assert_eq!(t.cycles_since_open(&"D".into()), 2);
    }

    #[test]
    fn every_other_counter_moves_by_exactly_one() {
        let mut t = tracker();
        for lane in ["B", "B", "D", "A", "C", "C"] {
            let before = t.snapshot();
            let chosen: LaneId = lane.into();
            t.on_cycle_complete(&chosen);
            for other in t.lanes().clone().iter() {
                if *other == chosen {
                    assert_eq!(t.cycles_since_open(other), 0);
                } else {
                    assert_eq!(t.cycles_since_open(other), before.cycles(other) + 1);
                }
            }
        }
    }

    #[test]
    fn round_clears_when_every_lane_opened() {
        let mut t = tracker();
        for lane in ["A", "B", "C"] {
            t.on_cycle_complete(&lane.into());
        }
        assert_eq!(t.opened_this_round().len(), 3);

        t.on_cycle_complete(&"D".into());
        assert!(t.opened_this_round().is_empty());
    }

    #[test]
    fn candidates_drop_excluded_lane() {
        let t = tracker();
        assert_eq!(ids(&t.candidates(Some(&"B".into()))), vec!["A", "C", "D"]);
        assert_eq!(ids(&t.candidates(None)), vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn exclusion_is_dropped_when_it_would_empty_the_set() {
        let single = FairnessTracker::new(LaneSet::from_ids(["A"]).unwrap());
        assert_eq!(ids(&single.candidates(Some(&"A".into()))), vec!["A"]);

        let mut t = tracker();
        for lane in ["A", "B", "C"] {
            t.on_cycle_complete(&lane.into());
        }
        // only D remains in the round; excluding it must not leave nothing
        assert_eq!(ids(&t.round_candidates(Some(&"D".into()))), vec!["D"]);
    }

    #[test]
    fn round_candidates_skip_opened_lanes() {
        let mut t = tracker();
        assert_eq!(ids(&t.round_candidates(None)), vec!["A", "B", "C", "D"]);

        t.on_cycle_complete(&"B".into());
        assert_eq!(ids(&t.round_candidates(t.last_opened())), vec!["A", "C", "D"]);

        t.on_cycle_complete(&"D".into());
        assert_eq!(ids(&t.round_candidates(t.last_opened())), vec!["A", "C"]);
    }

    #[test]
    fn rotation_pointer_follows_last_opened_lane() {
        let mut t = tracker();
        assert_eq!(t.take_rotation_lane().as_str(), "A");
        assert_eq!(t.rotation_lane().as_str(), "B");

        t.on_cycle_complete(&"C".into());
        assert_eq!(t.rotation_lane().as_str(), "D");

        t.on_cycle_complete(&"D".into());
        assert_eq!(t.take_rotation_lane().as_str(), "A");
    }

    #[test]
    fn unknown_lane_leaves_state_untouched() {
        let mut t = tracker();
        t.on_cycle_complete(&"A".into());
        let before = t.snapshot();
        t.on_cycle_complete(&"Z".into());
        assert_eq!(t.snapshot(), before);
    }
}
