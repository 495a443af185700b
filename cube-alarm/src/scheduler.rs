//! The scheduler turns the wall clock into alarm triggers.
//!
//! Every tick it reads the local time, and for each enabled alarm whose day
//! and `HH:MM` match it asks the state machine to start a session. Each
//! alarm fires at most once per matching minute. A minute that passes
//! without a tick (suspend, long stall) is simply missed; there is no
//! catch-up.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime, Timelike};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::alarm::AlarmId;
use crate::machine::MachineInput;
use crate::store::AlarmStore;
use crate::tracing::prelude::*;

/// Source of local wall-clock time.
pub trait WallClock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// The system clock in the local time zone.
#[derive(Debug, Default)]
pub struct LocalClock;

impl WallClock for LocalClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

pub struct Scheduler {
    store: Arc<AlarmStore>,
    clock: Arc<dyn WallClock>,
    machine_tx: mpsc::Sender<MachineInput>,
    period: Duration,

    /// Minute each alarm last fired in. Only entries for the current minute
    /// are kept.
    last_fired: HashMap<AlarmId, NaiveDateTime>,
}

impl Scheduler {
    pub fn new(
        store: Arc<AlarmStore>,
        clock: Arc<dyn WallClock>,
        machine_tx: mpsc::Sender<MachineInput>,
        period: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            machine_tx,
            period,
            last_fired: HashMap::new(),
        }
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        debug!(period = ?self.period, "Scheduler started");

        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }

        debug!("Scheduler stopped");
    }

    /// Check every alarm against the current minute. Returns how many
    /// triggers were sent.
    pub async fn tick(&mut self) -> usize {
        let now = self.clock.now();
        let minute = truncate_to_minute(now);
        self.last_fired.retain(|_, fired| *fired == minute);

        let mut sent = 0;
        for alarm in self.store.list() {
            if !alarm.is_due(&now) || self.last_fired.contains_key(&alarm.id) {
                continue;
            }

            let id = alarm.id.clone();
            debug!(alarm = %id, %minute, "Alarm due");
            if self
                .machine_tx
                .send(MachineInput::Scheduled(alarm))
                .await
                .is_err()
            {
                warn!(alarm = %id, "Alarm state machine gone, trigger dropped");
                continue;
            }
            self.last_fired.insert(id, minute);
            sent += 1;
        }
        sent
    }
}

fn truncate_to_minute(t: NaiveDateTime) -> NaiveDateTime {
    t.with_second(0).and_then(|t| t.with_nanosecond(0)).unwrap_or(t)
}
