//! State-change fan-out.
//!
//! [`EventBroadcaster`] keeps the current [`Snapshot`] and a broadcast
//! channel behind one lock. Publishing applies the event to the snapshot
//! and sends it in the same critical section, so a new subscriber gets a
//! snapshot and a receiver that start from exactly the same point.
//!
//! Delivery is best effort. Publishing never waits on subscribers; one that
//! falls more than [`EVENT_CAPACITY`] events behind loses the oldest ones.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use utoipa::ToSchema;

use crate::alarm::{Alarm, AlarmId};
use crate::api_client::types::Snapshot;
use crate::cube::{CubeMove, Direction, Face};
use crate::tracing::prelude::*;

pub const EVENT_CAPACITY: usize = 256;

/// How an alarm session ended.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StopReason {
    /// Cube solved after the minimum ring duration.
    Solved,
    Manual,
    Emergency,
}

/// Push channel event. Serialized with its name in the `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, strum::IntoStaticStr)]
#[serde(tag = "type", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Event {
    CubeConnecting,
    CubeConnected {
        connected: bool,
    },
    CubeMove {
        face: Face,
        direction: Direction,
        serial: u16,
    },
    CubeSolved,
    CubeUnsolved,
    CubeBattery {
        level: u8,
    },
    AlarmTriggered {
        alarm: Alarm,
        timestamp: DateTime<Utc>,
    },
    AlarmStopped {
        alarm_id: AlarmId,
        reason: StopReason,
        timestamp: DateTime<Utc>,
    },
    AlarmCreated {
        alarm: Alarm,
    },
    AlarmUpdated {
        alarm: Alarm,
    },
    AlarmDeleted {
        id: AlarmId,
    },
}

impl Event {
    /// Wire name, as found in the `type` field.
    pub fn name(&self) -> &'static str {
        self.into()
    }
}

impl From<CubeMove> for Event {
    fn from(mv: CubeMove) -> Self {
        Event::CubeMove {
            face: mv.face,
            direction: mv.direction,
            serial: mv.serial,
        }
    }
}

struct Inner {
    snapshot: Snapshot,
    tx: broadcast::Sender<Event>,
}

pub struct EventBroadcaster {
    inner: Mutex<Inner>,
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Mutex::new(Inner {
                snapshot: Snapshot::default(),
                tx,
            }),
        }
    }

    pub fn publish(&self, event: Event) {
        let mut inner = self.inner.lock();
        inner.snapshot.apply(&event);
        trace!(event = event.name(), subscribers = inner.tx.receiver_count(), "Publishing");
        // No subscribers is fine.
        let _ = inner.tx.send(event);
    }

    /// Current snapshot plus a receiver for every event after it.
    pub fn subscribe(&self) -> (Snapshot, broadcast::Receiver<Event>) {
        let inner = self.inner.lock();
        (inner.snapshot.clone(), inner.tx.subscribe())
    }

    pub fn snapshot(&self) -> Snapshot {
        self.inner.lock().snapshot.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().tx.receiver_count()
    }
}
