//! Decision engine: which lane opens next and for how long.
//!
//! Two strategies sit behind [`DecisionStrategy`]. The engine tries the
//! active one and falls back to the rule-based strategy whenever the learned
//! strategy returns an error. Both return `Ok(None)` when there is no demand
//! at all, in which case the caller issues a forced-rotation decision.

pub mod duration;
pub mod features;
pub mod learned;
pub mod rules;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use smartway_core::config::SmartwayConfig;
use smartway_core::{Decision, DemandSnapshot, LaneId, LaneSet, Strategy};

use crate::error::ModelError;
use crate::fairness::FairnessSnapshot;
use crate::model::LaneModel;

pub use learned::LearnedStrategy;
pub use rules::RuleBasedStrategy;

/// Everything a strategy may look at for one decision.
#[derive(Debug, Clone)]
pub struct DecisionInput {
    pub demand: DemandSnapshot,
    pub fairness: FairnessSnapshot,
    /// Lane that must not open again, normally the previous cycle's lane.
    pub exclude: Option<LaneId>,
    /// Lanes allowed to open this cycle.
    pub candidates: Vec<LaneId>,
    /// Local hour of day, 0-23.
    pub hour: u32,
    /// Local weekday, Monday = 0.
    pub weekday: u32,
}

impl DecisionInput {
    /// Candidates minus the excluded lane, in configuration order.
    ///
    /// Falls back to the unfiltered candidates if exclusion would leave none.
    pub fn eligible(&self, lanes: &LaneSet) -> Vec<LaneId> {
        let in_order: Vec<LaneId> = lanes
            .iter()
            .filter(|l| self.candidates.contains(l))
            .cloned()
            .collect();
        let filtered: Vec<LaneId> = in_order
            .iter()
            .filter(|l| self.exclude.as_ref() != Some(*l))
            .cloned()
            .collect();
        if filtered.is_empty() {
            in_order
        } else {
            filtered
        }
    }
}

/// A lane-selection policy.
pub trait DecisionStrategy: Send + Sync {
    fn name(&self) -> Strategy;

    /// `Ok(None)` means "no decision": demand is empty and rotation should take over.
    fn decide(&self, input: &DecisionInput) -> Result<Option<Decision>, ModelError>;
}

/// Which strategy the engine tries first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActiveStrategy {
    RuleBased,
    Learned,
}

pub struct DecisionEngine {
    rules: RuleBasedStrategy,
    learned: LearnedStrategy,
    active: ActiveStrategy,
}

impl DecisionEngine {
    pub fn new(config: &SmartwayConfig, lanes: LaneSet, model: Arc<dyn LaneModel>) -> Self {
        Self {
            rules: RuleBasedStrategy::new(lanes.clone(), config.rules.clone()),
            learned: LearnedStrategy::new(
                lanes,
                config.rules.clone(),
                config.learned.clone(),
                model,
            ),
            active: ActiveStrategy::RuleBased,
        }
    }

    pub fn active(&self) -> ActiveStrategy {
        self.active
    }

    pub fn set_active(&mut self, active: ActiveStrategy) {
        if self.active != active {
            tracing::info!(from = ?self.active, to = ?active, "switching decision strategy");
        }
        self.active = active;
    }

    /// Decide the next green phase, or `None` when there is no demand.
    pub fn decide(&self, input: &DecisionInput) -> Option<Decision> {
        if input.demand.total() == 0 {
            return None;
        }

        if self.active == ActiveStrategy::Learned {
            match self.learned.decide(input) {
                Ok(Some(decision)) => return Some(decision),
                Ok(None) => return None,
                Err(e) => {
                    warn!(error = %e, "learned strategy failed, using rules for this cycle");
                }
            }
        }

        match self.rules.decide(input) {
            Ok(decision) => decision,
            Err(e) => {
                warn!(error = %e, "rule-based strategy failed");
                None
            }
        }
    }
}
