use serde_json::Value;

use smartway_core::{LaneId, LaneSet};

use crate::error::FeedbackError;

/// One lane confirming the current command.
#[derive(Debug, Clone, PartialEq)]
pub enum Ack {
    /// A lane that was told to stop confirmed it.
    Stop(LaneId),
    /// The opened lane confirmed its green time.
    Open { lane: LaneId, seconds: f64 },
}

impl Ack {
    pub fn lane(&self) -> &LaneId {
        match self {
            Ack::Stop(lane) => lane,
            Ack::Open { lane, .. } => lane,
        }
    }
}

/// Parse a feedback payload.
///
/// Accepted forms: a bare lane id (`A`), a JSON string (`"A"`), or a
/// single-key object mapping a lane id to a number (`{"B": 12}`).
pub fn parse_ack(payload: &[u8], lanes: &LaneSet) -> Result<Ack, FeedbackError> {
    let text = std::str::from_utf8(payload)
        .map_err(|_| FeedbackError::NotUtf8)?
        .trim();

    if let Ok(lane) = lanes.resolve(text) {
        return Ok(Ack::Stop(lane.clone()));
    }

    let unrecognized = || FeedbackError::Unrecognized(text.to_string());
    let value: Value = serde_json::from_str(text).map_err(|_| unrecognized())?;
    match value {
        Value::String(id) => lanes
            .resolve(&id)
            .map(|lane| Ack::Stop(lane.clone()))
            .map_err(|_| FeedbackError::UnknownLane(id)),
        Value::Object(map) if map.len() == 1 => {
            let Some((id, seconds)) = map.into_iter().next() else {
                return Err(unrecognized());
            };
            let seconds = seconds.as_f64().ok_or_else(unrecognized)?;
            let lane = lanes
                .resolve(&id)
                .map_err(|_| FeedbackError::UnknownLane(id.clone()))?;
            Ok(Ack::Open {
                lane: lane.clone(),
                seconds,
            })
        }
        _ => Err(unrecognized()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lanes() -> LaneSet {
        LaneSet::from_ids(["A", "B", "C", "D"]).unwrap()
    }

    #[test]
    fn bare_lane_is_stop_ack() {
        assert_eq!(parse_ack(b"A", &lanes()), Ok(Ack::Stop("A".into())));
        assert_eq!(parse_ack(b"  D\n", &lanes()), Ok(Ack::Stop("D".into())));
        assert_eq!(parse_ack(br#""C""#, &lanes()), Ok(Ack::Stop("C".into())));
    }

    #[test]
    fn single_key_object_is_open_ack() {
        let ack = parse_ack(br#"{"B": 12}"#, &lanes()).unwrap();
        assert_eq!(
            ack,
            Ack::Open {
                lane: "B".into(),
                seconds: 12.0
            }
        );
        assert_eq!(ack.lane().as_str(), "B");
    }

    #[test]
    fn garbage_is_rejected() {
        let l = lanes();
        assert!(matches!(parse_ack(b"hello", &l), Err(FeedbackError::Unrecognized(_))));
        assert!(matches!(parse_ack(br#"{"B": "V"}"#, &l), Err(FeedbackError::Unrecognized(_))));
        assert!(matches!(
            parse_ack(br#"{"A": 1, "B": 2}"#, &l),
            Err(FeedbackError::Unrecognized(_))
        ));
        assert!(matches!(parse_ack(b"[1,2]", &l), Err(FeedbackError::Unrecognized(_))));
        assert_eq!(parse_ack(&[0xff, 0xfe], &l), Err(FeedbackError::NotUtf8));
    }

    #[test]
    fn unknown_lanes_are_rejected() {
        let l = lanes();
        assert_eq!(
            parse_ack(br#"{"Z": 10}"#, &l),
            Err(FeedbackError::UnknownLane("Z".into()))
        );
        assert_eq!(parse_ack(br#""Q""#, &l), Err(FeedbackError::UnknownLane("Q".into())));
    }
}
