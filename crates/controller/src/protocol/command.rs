use serde_json::{Map, Value};

use smartway_core::config::ProtocolConfig;
use smartway_core::{Decision, LaneSet};

/// Builds the JSON command objects sent to the lane endpoints.
///
/// Every command names every configured lane. The stop token is a bare
/// string; the open token is the key of a `{ token: seconds }` object.
#[derive(Debug, Clone)]
pub struct CommandEncoder {
    lanes: LaneSet,
    stop_token: String,
    open_token: String,
}

impl CommandEncoder {
    pub fn new(lanes: LaneSet, protocol: &ProtocolConfig) -> Self {
        Self {
            lanes,
            stop_token: protocol.stop_token.clone(),
            open_token: protocol.open_token.clone(),
        }
    }

    /// `{"A": "L", "B": "L", ...}`
    pub fn all_stop(&self) -> Value {
        let map: Map<String, Value> = self
            .lanes
            .iter()
            .map(|l| (l.to_string(), Value::String(self.stop_token.clone())))
            .collect();
        Value::Object(map)
    }

    /// All stop except the decision's lane: `{"A": {"V": 12}, "B": "L", ...}`
    pub fn open(&self, decision: &Decision) -> Value {
        let mut command = self.all_stop();
        if let Value::Object(map) = &mut command {
            let mut open = Map::new();
            open.insert(self.open_token.clone(), Value::from(decision.duration_secs()));
            map.insert(decision.lane().to_string(), Value::Object(open));
        }
        command
    }
}
