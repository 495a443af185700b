//! API data transfer objects.
//!
//! These types define the API contract shared between the daemon and
//! clients. Alarm definitions themselves are [`crate::alarm::Alarm`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::alarm::Alarm;
use crate::broadcast::{Event, StopReason};
use crate::cube::{CubeMove, LinkPhase};

/// Last known cube and link state.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct CubeStatus {
    pub phase: LinkPhase,
    pub connected: bool,
    pub solved: bool,
    pub last_move: Option<CubeMove>,
    /// Battery level in percent, once reported.
    pub battery: Option<u8>,
}

/// The alarm currently ringing.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct ActiveAlarm {
    pub alarm: Alarm,
    pub triggered_at: DateTime<Utc>,
}

/// Everything an observer needs to render current state. Sent first on the
/// push channel, then kept current by applying events.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct Snapshot {
    pub cube: CubeStatus,
    pub active_alarm: Option<ActiveAlarm>,
}

impl Snapshot {
    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::CubeConnecting => {
                self.cube.phase = LinkPhase::Connecting;
                self.cube.connected = false;
            }
            Event::CubeConnected { connected } => {
                self.cube.connected = *connected;
                self.cube.phase = if *connected {
                    LinkPhase::Connected
                } else {
                    LinkPhase::Disconnected
                };
            }
            Event::CubeMove {
                face,
                direction,
                serial,
            } => {
                self.cube.last_move = Some(CubeMove {
                    face: *face,
                    direction: *direction,
                    serial: *serial,
                });
            }
            Event::CubeSolved => self.cube.solved = true,
            Event::CubeUnsolved => self.cube.solved = false,
            Event::CubeBattery { level } => self.cube.battery = Some(*level),
            Event::AlarmTriggered { alarm, timestamp } => {
                self.active_alarm = Some(ActiveAlarm {
                    alarm: alarm.clone(),
                    triggered_at: *timestamp,
                });
            }
            Event::AlarmStopped { .. } => self.active_alarm = None,
            Event::AlarmCreated { .. } | Event::AlarmUpdated { .. } | Event::AlarmDeleted { .. } => {}
        }
    }
}

/// Full daemon status.
#[derive(Clone, Debug, Deserialize, Serialize, ToSchema)]
pub struct SystemStatus {
    #[serde(flatten)]
    pub snapshot: Snapshot,
    pub alarm_count: usize,
    pub uptime_secs: u64,
}

/// Result of a stop request. Stopping while idle is not an error.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct StopResponse {
    /// False when nothing was ringing.
    pub stopped: bool,
    pub reason: StopReason,
}

/// Result of a manual trigger.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct TriggerResponse {
    /// False when another alarm was already ringing.
    pub started: bool,
    pub active_alarm: Option<ActiveAlarm>,
}
