//! Alarm state machine.
//!
//! The single writer of the active alarm session. Scheduler triggers, cube
//! solved signals and API commands all arrive as [`MachineInput`]s on one
//! channel and are applied in that order.
//!
//! ```text
//!            trigger (first wins)
//!   Idle ─────────────────────────▶ Ringing
//!    ▲                                 │
//!    └─────────────────────────────────┘
//!      solved after MIN_RING_DURATION,
//!      manual stop, emergency stop
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::alarm::{Alarm, AlarmId};
use crate::api::commands::AlarmCommand;
use crate::api_client::types::ActiveAlarm;
use crate::audio::AudioPlayer;
use crate::broadcast::{Event, EventBroadcaster, StopReason};
use crate::tracing::prelude::*;

/// A solved signal younger than this, measured from session start, does
/// not stop the alarm. The cube may report a stale solved state right after
/// the alarm goes off.
pub const MIN_RING_DURATION: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub enum MachineInput {
    /// The scheduler matched this alarm.
    Scheduled(Alarm),

    /// The cube reported (or the operator forced) a solved state.
    CubeSolved,

    Command(AlarmCommand),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    Started(ActiveAlarm),

    /// Another alarm holds the session; the trigger was dropped.
    AlreadyRinging(ActiveAlarm),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StopOutcome {
    Stopped(AlarmId),
    AlreadyIdle,
}

#[derive(Debug, Clone)]
struct ActiveSession {
    alarm: Alarm,

    /// Monotonic, for the ring duration guard.
    started_at: Instant,

    /// Wall clock, for observers.
    triggered_at: DateTime<Utc>,
}

impl ActiveSession {
    fn to_active(&self) -> ActiveAlarm {
        ActiveAlarm {
            alarm: self.alarm.clone(),
            triggered_at: self.triggered_at,
        }
    }
}

pub struct AlarmStateMachine {
    session: Option<ActiveSession>,

    /// `None` rings silently.
    sound: Option<PathBuf>,

    player: Arc<dyn AudioPlayer>,
    broadcaster: Arc<EventBroadcaster>,
    inputs: mpsc::Receiver<MachineInput>,
}

impl AlarmStateMachine {
    pub fn new(
        sound: Option<PathBuf>,
        player: Arc<dyn AudioPlayer>,
        broadcaster: Arc<EventBroadcaster>,
        inputs: mpsc::Receiver<MachineInput>,
    ) -> Self {
        Self {
            session: None,
            sound,
            player,
            broadcaster,
            inputs,
        }
    }

    pub fn is_ringing(&self) -> bool {
        self.session.is_some()
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        debug!("Alarm state machine started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                input = self.inputs.recv() => match input {
                    Some(input) => self.handle(input),
                    None => break,
                },
            }
        }

        if self.session.is_some() {
            self.player.stop();
        }
        debug!("Alarm state machine stopped");
    }

    pub fn handle(&mut self, input: MachineInput) {
        match input {
            MachineInput::Scheduled(alarm) => {
                self.trigger(alarm);
            }
            MachineInput::CubeSolved => self.on_solved(),
            MachineInput::Command(AlarmCommand::Trigger { alarm, reply }) => {
                let _ = reply.send(self.trigger(alarm));
            }
            MachineInput::Command(AlarmCommand::Stop { reason, reply }) => {
                let _ = reply.send(self.stop(reason));
            }
        }
    }

    /// Idle → Ringing. A trigger while ringing is dropped.
    pub fn trigger(&mut self, alarm: Alarm) -> TriggerOutcome {
        if let Some(session) = &self.session {
            info!(
                alarm = %alarm.id,
                ringing = %session.alarm.id,
                "Alarm already ringing, trigger ignored"
            );
            return TriggerOutcome::AlreadyRinging(session.to_active());
        }

        let session = ActiveSession {
            alarm,
            started_at: Instant::now(),
            triggered_at: Utc::now(),
        };
        info!(
            alarm = %session.alarm.id,
            label = %session.alarm.label,
            requires_cube_solve = session.alarm.requires_cube_solve,
            "Alarm triggered"
        );

        match &self.sound {
            Some(sound) => self.player.play(sound),
            None => debug!("Alarm sound suppressed"),
        }

        self.broadcaster.publish(Event::AlarmTriggered {
            alarm: session.alarm.clone(),
            timestamp: session.triggered_at,
        });

        let active = session.to_active();
        self.session = Some(session);
        TriggerOutcome::Started(active)
    }

    /// Ringing → Idle if the alarm wants a solve and has rung long enough.
    pub fn on_solved(&mut self) {
        let Some(session) = &self.session else {
            trace!("Solved signal while idle");
            return;
        };

        if !session.alarm.requires_cube_solve {
            debug!(alarm = %session.alarm.id, "Alarm does not stop on solve");
            return;
        }

        let elapsed = session.started_at.elapsed();
        if elapsed < MIN_RING_DURATION {
            info!(
                alarm = %session.alarm.id,
                ?elapsed,
                "Solved signal too early, still ringing"
            );
            return;
        }

        self.stop(StopReason::Solved);
    }

    /// Ringing → Idle by any path. Idempotent.
    pub fn stop(&mut self, reason: StopReason) -> StopOutcome {
        let Some(session) = self.session.take() else {
            debug!(%reason, "Stop while idle");
            return StopOutcome::AlreadyIdle;
        };

        let elapsed = session.started_at.elapsed();
        match reason {
            StopReason::Emergency => {
                warn!(alarm = %session.alarm.id, ?elapsed, "Alarm emergency stop")
            }
            _ => info!(alarm = %session.alarm.id, %reason, ?elapsed, "Alarm stopped"),
        }

        self.player.stop();
        self.broadcaster.publish(Event::AlarmStopped {
            alarm_id: session.alarm.id.clone(),
            reason,
            timestamp: Utc::now(),
        });

        StopOutcome::Stopped(session.alarm.id)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use tokio::sync::{broadcast, oneshot};

    use super::*;
    use crate::alarm::Day;
    use crate::alarm::tests::alarm;
    use crate::audio::testing::{PlayerCall, RecordingPlayer};

    struct Harness {
        machine: AlarmStateMachine,
        player: Arc<RecordingPlayer>,
        events: broadcast::Receiver<Event>,
        broadcaster: Arc<EventBroadcaster>,
    }

    fn harness(sound: Option<&str>) -> Harness {
        let player = Arc::new(RecordingPlayer::default());
        let broadcaster = Arc::new(EventBroadcaster::new());
        let (_, events) = broadcaster.subscribe();
        let (_tx, rx) = mpsc::channel(1);
        let machine = AlarmStateMachine::new(
            sound.map(PathBuf::from),
            player.clone(),
            broadcaster.clone(),
            rx,
        );
        Harness {
            machine,
            player,
            events,
            broadcaster,
        }
    }

    fn wake_up() -> Alarm {
        alarm("wake", "07:00", &[Day::Monday])
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_starts_sound_and_publishes() {
        let mut h = harness(Some("sounds/alarm.wav"));

        let outcome = h.machine.trigger(wake_up());

        assert!(matches!(outcome, TriggerOutcome::Started(ref a) if a.alarm.id.as_str() == "wake"));
        assert_eq!(
            h.player.calls(),
            vec![PlayerCall::Play(PathBuf::from("sounds/alarm.wav"))]
        );
        assert!(matches!(
            h.events.try_recv().unwrap(),
            Event::AlarmTriggered { ref alarm, .. } if alarm.id.as_str() == "wake"
        ));
        assert!(h.broadcaster.snapshot().active_alarm.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn suppressed_sound_still_rings() {
        let mut h = harness(None);
        h.machine.trigger(wake_up());
        assert!(h.machine.is_ringing());
        assert!(h.player.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn solved_inside_guard_window_is_ignored() {
        let mut h = harness(None);
        h.machine.trigger(wake_up());

        tokio::time::advance(Duration::from_millis(4900)).await;
        h.machine.on_solved();
        assert!(h.machine.is_ringing());

        tokio::time::advance(Duration::from_millis(100)).await;
        h.machine.on_solved();
        assert!(!h.machine.is_ringing());

        // Later solved signals find nothing to stop.
        h.machine.on_solved();
        let stops = std::iter::from_fn(|| h.events.try_recv().ok())
            .filter(|e| matches!(e, Event::AlarmStopped { .. }))
            .count();
        assert_eq!(stops, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn solve_does_not_stop_alarm_without_solve_requirement() {
        let mut h = harness(None);
        let mut a = wake_up();
        a.requires_cube_solve = false;
        h.machine.trigger(a);

        tokio::time::advance(Duration::from_secs(30)).await;
        h.machine.on_solved();
        assert!(h.machine.is_ringing());

        assert_eq!(
            h.machine.stop(StopReason::Manual),
            StopOutcome::Stopped(AlarmId::new("wake"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn manual_stop_ignores_guard_window() {
        let mut h = harness(Some("a.wav"));
        h.machine.trigger(wake_up());

        let outcome = h.machine.stop(StopReason::Manual);

        assert_eq!(outcome, StopOutcome::Stopped(AlarmId::new("wake")));
        assert_eq!(h.player.calls().last(), Some(&PlayerCall::Stop));
        let _ = h.events.try_recv();
        assert!(matches!(
            h.events.try_recv().unwrap(),
            Event::AlarmStopped {
                reason: StopReason::Manual,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_while_idle_is_silent_noop() {
        let mut h = harness(None);
        assert_eq!(h.machine.stop(StopReason::Manual), StopOutcome::AlreadyIdle);
        assert_eq!(
            h.machine.stop(StopReason::Emergency),
            StopOutcome::AlreadyIdle
        );
        assert!(h.events.try_recv().is_err());
        assert!(h.player.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn first_trigger_wins() {
        let mut h = harness(None);
        h.machine.trigger(wake_up());
        let second = alarm("gym", "07:00", &[Day::Monday]);

        let outcome = h.machine.trigger(second.clone());
        assert!(matches!(outcome, TriggerOutcome::AlreadyRinging(ref a) if a.alarm.id.as_str() == "wake"));

        h.machine.stop(StopReason::Manual);
        assert!(matches!(h.machine.trigger(second), TriggerOutcome::Started(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn guard_window_restarts_with_each_session() {
        let mut h = harness(None);
        h.machine.trigger(wake_up());
        tokio::time::advance(Duration::from_secs(60)).await;
        h.machine.stop(StopReason::Manual);

        h.machine.trigger(wake_up());
        tokio::time::advance(Duration::from_secs(1)).await;
        h.machine.on_solved();
        assert!(h.machine.is_ringing());
    }

    #[tokio::test(start_paused = true)]
    async fn run_applies_commands_in_order() {
        let player = Arc::new(RecordingPlayer::default());
        let broadcaster = Arc::new(EventBroadcaster::new());
        let (tx, rx) = mpsc::channel(8);
        let machine =
            AlarmStateMachine::new(Some("a.wav".into()), player.clone(), broadcaster.clone(), rx);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(machine.run(shutdown.clone()));

        tx.send(MachineInput::Scheduled(wake_up())).await.unwrap();
        let (reply, rx_stop) = oneshot::channel();
        tx.send(MachineInput::Command(AlarmCommand::Stop {
            reason: StopReason::Emergency,
            reply,
        }))
        .await
        .unwrap();

        assert_eq!(rx_stop.await.unwrap(), StopOutcome::Stopped(AlarmId::new("wake")));
        assert!(broadcaster.snapshot().active_alarm.is_none());

        shutdown.cancel();
        task.await.unwrap();
        assert_eq!(
            player.calls(),
            vec![PlayerCall::Play(Path::new("a.wav").into()), PlayerCall::Stop]
        );
    }
}
