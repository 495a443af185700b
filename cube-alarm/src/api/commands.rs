//! Command types sent from API handlers to the actors.
//!
//! Each command carries a oneshot reply channel so the handler can
//! await the result and translate it into an HTTP response.

use tokio::sync::oneshot;

use crate::alarm::Alarm;
use crate::broadcast::StopReason;
use crate::cube::LinkError;
use crate::machine::{StopOutcome, TriggerOutcome};

/// Commands from the API to the alarm state machine.
#[derive(Debug)]
pub enum AlarmCommand {
    /// Start ringing `alarm` now, regardless of its schedule.
    Trigger {
        alarm: Alarm,
        reply: oneshot::Sender<TriggerOutcome>,
    },

    /// End the active session. Succeeds when idle too.
    Stop {
        reason: StopReason,
        reply: oneshot::Sender<StopOutcome>,
    },
}

/// Commands from the API to the cube link.
#[derive(Debug)]
pub enum CubeCommand {
    /// Bring the link up and keep it up. Fails only without a transport.
    Connect {
        reply: oneshot::Sender<Result<(), LinkError>>,
    },

    /// Tear the link down and stop reconnecting.
    Disconnect {
        reply: oneshot::Sender<Result<(), LinkError>>,
    },

    /// Force the solved state without a physical solve.
    Reset {
        reply: oneshot::Sender<Result<(), LinkError>>,
    },
}
