//! Inbound acknowledgment path.
//!
//! The feedback pump owns the subscriber socket and forwards messages into a
//! bounded channel. The ack handler drains that channel and applies each
//! message under the state lock, so the "ignore unless awaiting" rule is
//! checked atomically with the ack-set update.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use smartway_bus::{EventSubscriber, Message};
use smartway_core::{LaneId, LaneSet};

use crate::error::FeedbackError;

use super::feedback::{parse_ack, Ack};
use super::state::SharedState;
use super::CyclePhase;

/// What the handler did with one feedback payload.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedbackOutcome {
    Accepted { lane: LaneId, quorum: bool },
    Duplicate(LaneId),
    OutOfPhase,
    Rejected(FeedbackError),
}

/// Apply one feedback payload to the shared state.
pub fn handle_feedback(state: &SharedState, lanes: &LaneSet, payload: &[u8]) -> FeedbackOutcome {
    let mut guard = state.lock();

    if guard.phase != CyclePhase::AwaitAck {
        guard.metrics.feedback_out_of_phase += 1;
        debug!(phase = %guard.phase, "feedback outside await_ack, dropped");
        return FeedbackOutcome::OutOfPhase;
    }

    let ack = match parse_ack(payload, lanes) {
        Ok(ack) => ack,
        Err(e) => {
            guard.metrics.feedback_malformed += 1;
            warn!(
                error = %e,
                payload = %String::from_utf8_lossy(payload),
                "dropping feedback"
            );
            return FeedbackOutcome::Rejected(e);
        }
    };

    let lane = ack.lane().clone();
    if !guard.acks.insert(lane.clone()) {
        guard.metrics.acks_duplicate += 1;
        debug!(lane = %lane, "duplicate ack ignored");
        return FeedbackOutcome::Duplicate(lane);
    }
    guard.metrics.acks_accepted += 1;

    let acked = guard.acks.len();
    match &ack {
        Ack::Open { seconds, .. } => {
            debug!(lane = %lane, seconds, acked, total = lanes.len(), "open ack")
        }
        Ack::Stop(_) => debug!(lane = %lane, acked, total = lanes.len(), "stop ack"),
    }

    let quorum = guard.acks.is_complete(lanes);
    if quorum {
        info!(lanes = lanes.len(), "all lanes acknowledged");
    }
    FeedbackOutcome::Accepted { lane, quorum }
}

/// Drain the feedback queue until every sender is gone.
pub async fn run_ack_handler(mut rx: mpsc::Receiver<Message>, state: SharedState, lanes: LaneSet) {
    while let Some(message) = rx.recv().await {
        handle_feedback(&state, &lanes, &message.payload);
    }
    debug!("feedback queue closed, ack handler stopping");
}

/// Forward feedback messages from the subscriber into the bounded queue.
///
/// Messages on other topics are skipped; single-frame messages carry no
/// topic and are always forwarded.
pub async fn run_feedback_pump<S: EventSubscriber>(
    subscriber: S,
    topic: String,
    tx: mpsc::Sender<Message>,
) {
    loop {
        match subscriber.recv().await {
            Ok(message) => {
                if !message.topic.is_empty() && message.topic != topic {
                    debug!(topic = %message.topic, "skipping message on unexpected topic");
                    continue;
                }
                if tx.send(message).await.is_err() {
                    debug!("ack handler gone, feedback pump stopping");
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "feedback recv error");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}
