use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SmartwayError;
use crate::lane::LaneId;

/// Shortest green phase the controller will ever command.
pub const MIN_GREEN_SECS: u32 = 5;

/// Longest green phase the controller will ever command.
pub const MAX_GREEN_SECS: u32 = 30;

/// Clamp a green duration into `[MIN_GREEN_SECS, MAX_GREEN_SECS]`.
pub fn clamp_green_secs(seconds: i64) -> u32 {
    seconds.clamp(MIN_GREEN_SECS as i64, MAX_GREEN_SECS as i64) as u32
}

/// Which policy produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    RuleBased,
    Learned,
    ForcedRotation,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::RuleBased => "rule_based",
            Strategy::Learned => "learned",
            Strategy::ForcedRotation => "forced_rotation",
        }
    }
}

impl FromStr for Strategy {
    type Err = SmartwayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rule_based" => Ok(Strategy::RuleBased),
            "learned" => Ok(Strategy::Learned),
            "forced_rotation" => Ok(Strategy::ForcedRotation),
            other => Err(SmartwayError::UnknownStrategy(other.to_string())),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which lane gets the green and for how long.
///
/// Fields are private so the `[5, 30]` duration bound holds for every
/// decision that exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    lane: LaneId,
    duration_secs: u32,
    strategy: Strategy,
}

impl Decision {
    /// Create a decision, clamping the duration into the legal range.
    pub fn new(lane: LaneId, duration_secs: i64, strategy: Strategy) -> Self {
        Self {
            lane,
            duration_secs: clamp_green_secs(duration_secs),
            strategy,
        }
    }

    pub fn lane(&self) -> &LaneId {
        &self.lane
    }

    pub fn duration_secs(&self) -> u32 {
        self.duration_secs
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_is_clamped() {
        assert_eq!(Decision::new("A".into(), 2, Strategy::RuleBased).duration_secs(), 5);
        assert_eq!(Decision::new("A".into(), 99, Strategy::Learned).duration_secs(), 30);
        assert_eq!(Decision::new("A".into(), 12, Strategy::ForcedRotation).duration_secs(), 12);
    }

    #[test]
    fn strategy_names_parse_back() {
        for s in [Strategy::RuleBased, Strategy::Learned, Strategy::ForcedRotation] {
            assert_eq!(s.as_str().parse::<Strategy>().unwrap(), s);
        }
        let err = "neural".parse::<Strategy>().unwrap_err();
        assert!(matches!(err, SmartwayError::UnknownStrategy(ref name) if name == "neural"));
    }
}
