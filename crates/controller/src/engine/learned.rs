use std::sync::Arc;

use smartway_core::config::{LearnedConfig, RulesConfig};
use smartway_core::{Decision, LaneSet, Strategy};

use crate::error::ModelError;
use crate::model::LaneModel;

use super::duration::learned_seconds;
use super::features::{classifier_features, regressor_features};
use super::{DecisionInput, DecisionStrategy};

/// Wraps a trained [`LaneModel`]: class probabilities pick the lane,
/// the regressor suggests the duration.
pub struct LearnedStrategy {
    lanes: LaneSet,
    rules: RulesConfig,
    learned: LearnedConfig,
    model: Arc<dyn LaneModel>,
}

impl LearnedStrategy {
    pub fn new(
        lanes: LaneSet,
        rules: RulesConfig,
        learned: LearnedConfig,
        model: Arc<dyn LaneModel>,
    ) -> Self {
        Self {
            lanes,
            rules,
            learned,
            model,
        }
    }
}

/// Index of the lane to open given raw class probabilities.
///
/// Probabilities move to log space, gain `bonus * cycles` per lane, and
/// disallowed lanes drop to negative infinity. If nothing is allowed the
/// first lane is returned.
pub fn pick_lane(probabilities: &[f64], cycles: &[u32], allowed: &[bool], bonus: f64) -> usize {
    let mut logits: Vec<f64> = probabilities
        .iter()
        .zip(cycles)
        .zip(allowed)
        .map(|((p, c), ok)| {
            if *ok {
                (p + 1e-10).ln() + bonus * *c as f64
            } else {
                f64::NEG_INFINITY
            }
        })
        .collect();

    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return 0;
    }

    // stable softmax
    let mut sum = 0.0;
    for l in logits.iter_mut() {
        *l = (*l - max).exp();
        sum += *l;
    }
    let mut best = 0;
    for (i, l) in logits.iter().enumerate() {
        if l / sum > logits[best] / sum {
            best = i;
        }
    }
    best
}

impl DecisionStrategy for LearnedStrategy {
    fn name(&self) -> Strategy {
        Strategy::Learned
    }

    fn decide(&self, input: &DecisionInput) -> Result<Option<Decision>, ModelError> {
        if !self.model.is_trained() {
            return Err(ModelError::NotTrained);
        }
        let total = input.demand.total();
        if total == 0 {
            return Ok(None);
        }

        let counts = input.demand.ordered_counts(&self.lanes);
        let probabilities = self
            .model
            .lane_probabilities(&classifier_features(&counts, input.hour, input.weekday))?;
        if probabilities.len() != self.lanes.len() {
            return Err(ModelError::Malformed(format!(
                "expected {} lane probabilities, got {}",
                self.lanes.len(),
                probabilities.len()
            )));
        }
        if probabilities.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(ModelError::Malformed("probabilities must be finite and non-negative".into()));
        }

        let cycles: Vec<u32> = self.lanes.iter().map(|l| input.fairness.cycles(l)).collect();
        let allowed: Vec<bool> = self
            .lanes
            .iter()
            .map(|l| {
                input.exclude.as_ref() != Some(l)
                    && (input.candidates.is_empty() || input.candidates.contains(l))
            })
            .collect();
        let index = pick_lane(&probabilities, &cycles, &allowed, self.learned.starvation_bonus);
        let lane = self
            .lanes
            .get(index)
            .cloned()
            .ok_or_else(|| ModelError::Malformed(format!("lane index {index} out of range")))?;

        let target = input.demand.count(&lane);
        let since_open = input.fairness.cycles(&lane);
        let predicted = self.model.green_seconds(&regressor_features(
            &counts,
            input.hour,
            input.weekday,
            target,
            since_open,
        ))?;
        if !predicted.is_finite() {
            return Err(ModelError::Malformed(format!("predicted duration {predicted}")));
        }

        let seconds = learned_seconds(predicted, target, total, since_open, &self.rules);
        tracing::debug!(lane = %lane, cars = target, predicted, seconds, "learned choice");
        Ok(Some(Decision::new(lane, seconds as i64, Strategy::Learned)))
    }
}
