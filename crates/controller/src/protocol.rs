//! Broadcast/acknowledge protocol for one green phase.
//!
//! Each cycle walks `Idle → BroadcastRed → BroadcastGreen → AwaitAck →
//! Finalize → Idle`. The control loop drives the transitions; the ack
//! handler only ever adds lanes to the ack set while the phase is
//! `AwaitAck`.

pub mod command;
pub mod coordinator;
pub mod feedback;
pub mod inbound;
pub mod state;

use std::fmt;

use serde::Serialize;

pub use command::CommandEncoder;
pub use coordinator::{CycleReport, ProtocolCoordinator, QuorumOutcome};
pub use feedback::{parse_ack, Ack};
pub use inbound::{handle_feedback, run_ack_handler, run_feedback_pump, FeedbackOutcome};
pub use state::{AckSet, ActiveCycle, ControlState, PendingRecord, SharedState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CyclePhase {
    Idle,
    BroadcastRed,
    BroadcastGreen,
    AwaitAck,
    Finalize,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CyclePhase::Idle => "idle",
            CyclePhase::BroadcastRed => "broadcast_red",
            CyclePhase::BroadcastGreen => "broadcast_green",
            CyclePhase::AwaitAck => "await_ack",
            CyclePhase::Finalize => "finalize",
        };
        f.write_str(name)
    }
}
