use super::types::SmartwayConfig;
use crate::decision::{MAX_GREEN_SECS, MIN_GREEN_SECS};
use crate::error::SmartwayError;

impl SmartwayConfig {
    /// Validate the config: lane set, duration ladder, tokens, cadence.
    pub fn validate(&self) -> Result<(), SmartwayError> {
        self.validate_lanes()?;
        self.validate_tiers()?;
        self.validate_tokens()?;
        self.validate_training()?;
        self.validate_lane_mapping()?;
        Ok(())
    }

    fn validate_lanes(&self) -> Result<(), SmartwayError> {
        let lanes = self.lane_set()?;
        if lanes.len() < 2 {
            return Err(SmartwayError::Config(
                "at least two lanes are needed to schedule between".into(),
            ));
        }
        Ok(())
    }

    /// Tiers must be strictly ascending and every duration must be commandable.
    fn validate_tiers(&self) -> Result<(), SmartwayError> {
        let in_range = |s: u32| (MIN_GREEN_SECS..=MAX_GREEN_SECS).contains(&s);
        for pair in self.rules.tiers.windows(2) {
            if pair[1].max_count <= pair[0].max_count {
                return Err(SmartwayError::Config(format!(
                    "duration tiers must ascend: {} after {}",
                    pair[1].max_count, pair[0].max_count
                )));
            }
        }
        if let Some(tier) = self.rules.tiers.iter().find(|t| !in_range(t.seconds)) {
            return Err(SmartwayError::Config(format!(
                "tier for <= {} cars has {}s, outside [{MIN_GREEN_SECS}, {MAX_GREEN_SECS}]",
                tier.max_count, tier.seconds
            )));
        }
        if !in_range(self.rules.overflow_seconds) {
            return Err(SmartwayError::Config(format!(
                "overflow_seconds {} outside [{MIN_GREEN_SECS}, {MAX_GREEN_SECS}]",
                self.rules.overflow_seconds
            )));
        }
        if !in_range(self.rotation.forced_seconds) {
            return Err(SmartwayError::Config(format!(
                "forced_seconds {} outside [{MIN_GREEN_SECS}, {MAX_GREEN_SECS}]",
                self.rotation.forced_seconds
            )));
        }
        Ok(())
    }

    fn validate_tokens(&self) -> Result<(), SmartwayError> {
        if self.protocol.stop_token.is_empty() || self.protocol.open_token.is_empty() {
            return Err(SmartwayError::Config("stop and open tokens must be non-empty".into()));
        }
        if self.protocol.ack_poll_ms == 0 {
            return Err(SmartwayError::Config("ack_poll_ms must be positive".into()));
        }
        Ok(())
    }

    fn validate_training(&self) -> Result<(), SmartwayError> {
        if self.training.retrain_every == 0 {
            return Err(SmartwayError::Config("retrain_every must be positive".into()));
        }
        if self.bus.feedback_queue == 0 {
            return Err(SmartwayError::Config("feedback_queue must be positive".into()));
        }
        Ok(())
    }

    fn validate_lane_mapping(&self) -> Result<(), SmartwayError> {
        for (source, lane) in &self.demand.lane_mapping {
            if !self.lanes.contains(lane) {
                return Err(SmartwayError::Config(format!(
                    "demand lane '{source}' maps to unknown lane '{lane}'"
                )));
            }
        }
        Ok(())
    }
}
