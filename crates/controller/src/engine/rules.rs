use smartway_core::config::RulesConfig;
use smartway_core::{Decision, LaneId, LaneSet, Strategy};

use crate::error::ModelError;

use super::duration::rule_seconds;
use super::{DecisionInput, DecisionStrategy};

/// Demand plus a starvation bonus; highest score wins, earlier lanes win ties.
pub struct RuleBasedStrategy {
    lanes: LaneSet,
    rules: RulesConfig,
}

impl RuleBasedStrategy {
    pub fn new(lanes: LaneSet, rules: RulesConfig) -> Self {
        Self { lanes, rules }
    }

    fn score(&self, input: &DecisionInput, lane: &LaneId) -> f64 {
        input.demand.count(lane) as f64
            + self.rules.starvation_bonus * input.fairness.cycles(lane) as f64
    }

    /// Pick the best-scoring eligible lane.
    pub fn choose_lane(&self, input: &DecisionInput) -> Option<LaneId> {
        let eligible = input.eligible(&self.lanes);
        let mut best: Option<(&LaneId, f64)> = None;
        for lane in &eligible {
            let score = self.score(input, lane);
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((lane, score));
            }
        }
        best.map(|(lane, _)| lane.clone())
    }
}

impl DecisionStrategy for RuleBasedStrategy {
    fn name(&self) -> Strategy {
        Strategy::RuleBased
    }

    fn decide(&self, input: &DecisionInput) -> Result<Option<Decision>, ModelError> {
        let total = input.demand.total();
        if total == 0 {
            return Ok(None);
        }
        let Some(lane) = self.choose_lane(input) else {
            return Ok(None);
        };

        let count = input.demand.count(&lane);
        let cycles = input.fairness.cycles(&lane);
        let seconds = rule_seconds(count, total, cycles, &self.rules);
        tracing::debug!(lane = %lane, cars = count, total, seconds, "rule-based choice");
        Ok(Some(Decision::new(lane, seconds as i64, Strategy::RuleBased)))
    }
}
