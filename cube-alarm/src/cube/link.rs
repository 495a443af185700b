//! Cube link actor.
//!
//! A single task owns [`CubeLinkState`] and applies, in arrival order, API
//! commands and the results of the tasks it spawns: connect attempts,
//! session tasks and retry timers. The link holds the session cipher:
//! notifications are decrypted here and commands encrypted before they are
//! handed to the session task. Every spawned task is tagged with the
//! generation current when it started. Disconnecting or losing the link
//! bumps the generation, so late results of abandoned work are recognized
//! and dropped.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::backoff::ExponentialBackoff;
use super::cipher::GanCipher;
use super::protocol::{self, CubeRequest, Notification};
use super::transport::{CubeConnection, CubeTransport};
use super::{CubeLinkState, LinkError, LinkPhase};
use crate::api::commands::CubeCommand;
use crate::broadcast::{Event, EventBroadcaster};
use crate::machine::MachineInput;
use crate::tracing::prelude::*;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const INPUT_CAPACITY: usize = 64;
const REQUEST_CAPACITY: usize = 8;

/// Results reported back by tasks the link spawned.
enum LinkInput {
    Established {
        generation: u64,
        conn: Box<dyn CubeConnection>,
    },
    Failed {
        generation: u64,
        error: LinkError,
    },
    Frame {
        generation: u64,
        frame: Bytes,
    },
    Lost {
        generation: u64,
        error: Option<LinkError>,
    },
    Retry {
        generation: u64,
    },
}

pub struct CubeLink {
    transport: Option<Arc<dyn CubeTransport>>,
    address: Option<String>,
    state: CubeLinkState,

    /// Bumped whenever in-flight work must be abandoned.
    generation: u64,

    /// Operator intent: keep the link up and retry after failures.
    want_link: bool,

    /// Cancels the current connect attempt, session task or retry timer.
    session: Option<CancellationToken>,

    /// Present while a session is up.
    cipher: Option<GanCipher>,
    requests: Option<mpsc::Sender<Bytes>>,

    backoff: ExponentialBackoff,
    commands: mpsc::Receiver<CubeCommand>,
    inputs_tx: mpsc::Sender<LinkInput>,
    inputs_rx: mpsc::Receiver<LinkInput>,
    broadcaster: Arc<EventBroadcaster>,
    machine_tx: mpsc::Sender<MachineInput>,
    tasks: TaskTracker,
}

impl CubeLink {
    pub fn new(
        transport: Option<Arc<dyn CubeTransport>>,
        address: Option<String>,
        commands: mpsc::Receiver<CubeCommand>,
        broadcaster: Arc<EventBroadcaster>,
        machine_tx: mpsc::Sender<MachineInput>,
    ) -> Self {
        let (inputs_tx, inputs_rx) = mpsc::channel(INPUT_CAPACITY);
        Self {
            transport,
            address,
            state: CubeLinkState::default(),
            generation: 0,
            want_link: false,
            session: None,
            cipher: None,
            requests: None,
            backoff: ExponentialBackoff::default(),
            commands,
            inputs_tx,
            inputs_rx,
            broadcaster,
            machine_tx,
            tasks: TaskTracker::new(),
        }
    }

    pub fn state(&self) -> &CubeLinkState {
        &self.state
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        debug!("Cube link started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                Some(cmd) = self.commands.recv() => self.on_command(cmd).await,
                Some(input) = self.inputs_rx.recv() => self.on_input(input).await,
                else => break,
            }
        }

        self.want_link = false;
        self.abandon();
        self.inputs_rx.close();
        self.tasks.close();
        self.tasks.wait().await;
        debug!("Cube link stopped");
    }

    async fn on_command(&mut self, cmd: CubeCommand) {
        match cmd {
            CubeCommand::Connect { reply } => {
                let _ = reply.send(self.connect());
            }
            CubeCommand::Disconnect { reply } => {
                self.disconnect();
                let _ = reply.send(Ok(()));
            }
            CubeCommand::Reset { reply } => {
                self.reset().await;
                let _ = reply.send(Ok(()));
            }
        }
    }

    /// Bring the link up. No-op while connecting or connected.
    pub fn connect(&mut self) -> Result<(), LinkError> {
        if self.transport.is_none() {
            return Err(LinkError::NoTransport);
        }
        self.want_link = true;

        if self.state.phase != LinkPhase::Disconnected {
            debug!(phase = ?self.state.phase, "Connect ignored, link already up");
            return Ok(());
        }

        // A pending retry timer is superseded by this attempt.
        self.start_attempt();
        Ok(())
    }

    /// Tear the link down and stop retrying. Always publishes the
    /// disconnected state.
    pub fn disconnect(&mut self) {
        self.want_link = false;
        self.abandon();
        self.backoff.reset();
        self.state.phase = LinkPhase::Disconnected;
        info!(generation = self.generation, "Cube link disconnected by operator");
        self.broadcaster.publish(Event::CubeConnected { connected: false });
    }

    /// Operator override: treat the cube as solved. A connected cube is told
    /// to reset too, so its next state report agrees.
    pub async fn reset(&mut self) {
        if self.request(CubeRequest::Reset) {
            info!("Cube state reset to solved");
        } else {
            info!("Cube state reset to solved locally, cube not connected");
        }
        self.state.solved = true;
        self.broadcaster.publish(Event::CubeSolved);
        self.notify_solved().await;
    }

    async fn on_input(&mut self, input: LinkInput) {
        match input {
            LinkInput::Established { generation, conn } => self.on_established(generation, conn),
            LinkInput::Failed { generation, error } => {
                if generation != self.generation {
                    return;
                }
                warn!(generation, error = %error, "Cube connect failed");
                self.link_down();
            }
            LinkInput::Frame { generation, frame } => {
                if generation != self.generation {
                    trace!(generation, "Dropping frame from stale session");
                    return;
                }
                self.on_encrypted(&frame).await;
            }
            LinkInput::Lost { generation, error } => {
                if generation != self.generation {
                    return;
                }
                match error {
                    Some(e) => warn!(generation, error = %e, "Cube link lost"),
                    None => info!(generation, "Cube closed the link"),
                }
                self.link_down();
            }
            LinkInput::Retry { generation } => {
                if generation != self.generation
                    || !self.want_link
                    || self.state.phase != LinkPhase::Disconnected
                {
                    return;
                }
                self.start_attempt();
            }
        }
    }

    fn on_established(&mut self, generation: u64, mut conn: Box<dyn CubeConnection>) {
        if generation != self.generation || !self.want_link {
            debug!(generation, current = self.generation, "Discarding stale connection");
            self.tasks.spawn(async move { conn.close().await });
            return;
        }

        let cipher = match GanCipher::for_address(conn.address()) {
            Ok(cipher) => cipher,
            Err(e) => {
                warn!(generation, error = %e, "Cannot key cube session");
                self.tasks.spawn(async move { conn.close().await });
                self.link_down();
                return;
            }
        };
        debug!(generation, address = conn.address(), "Cube session keyed");

        self.backoff.reset();
        self.set_connected();

        let (requests_tx, requests_rx) = mpsc::channel(REQUEST_CAPACITY);
        let token = self.session_token();
        let tx = self.inputs_tx.clone();
        self.tasks
            .spawn(run_session(generation, conn, requests_rx, token, tx));
        self.cipher = Some(cipher);
        self.requests = Some(requests_tx);

        for request in [CubeRequest::Hardware, CubeRequest::Facelets, CubeRequest::Battery] {
            self.request(request);
        }
    }

    /// Encrypt and queue a command for the cube. False when no session is
    /// up or the queue is full.
    fn request(&self, request: CubeRequest) -> bool {
        let (Some(cipher), Some(requests)) = (&self.cipher, &self.requests) else {
            return false;
        };
        let frame = match cipher.encrypt(&request.encode()) {
            Ok(frame) => Bytes::from(frame),
            Err(e) => {
                warn!(?request, error = %e, "Cannot encrypt cube request");
                return false;
            }
        };
        match requests.try_send(frame) {
            Ok(()) => {
                trace!(?request, "Cube request queued");
                true
            }
            Err(e) => {
                warn!(?request, error = %e, "Cube request dropped");
                false
            }
        }
    }

    async fn on_encrypted(&mut self, frame: &[u8]) {
        let Some(cipher) = &self.cipher else {
            trace!("Dropping frame without a session cipher");
            return;
        };
        match cipher.decrypt(frame) {
            Ok(plain) => self.on_frame(&plain).await,
            Err(e) => self.malformed(e.into()),
        }
    }

    async fn on_frame(&mut self, frame: &[u8]) {
        match protocol::decode(frame) {
            Ok(Some(notification)) => self.on_notification(notification).await,
            Ok(None) => trace!(len = frame.len(), "Ignoring untracked cube frame"),
            Err(e) => self.malformed(e.into()),
        }
    }

    fn malformed(&mut self, error: LinkError) {
        warn!(generation = self.generation, error = %error, "Malformed cube frame, dropping link");
        self.link_down();
    }

    async fn on_notification(&mut self, notification: Notification) {
        self.state.last_event = Some(Instant::now());

        match notification {
            Notification::Move(mv) => {
                // A move proves the link is up even if the handshake was missed.
                self.set_connected();
                trace!(%mv, serial = mv.serial, "Cube move");
                self.state.last_move = Some(mv);
                self.broadcaster.publish(Event::from(mv));
            }
            Notification::Facelets { solved: true, .. } => {
                if !self.state.solved {
                    info!("Cube solved");
                    self.state.solved = true;
                    self.broadcaster.publish(Event::CubeSolved);
                }
                self.notify_solved().await;
            }
            Notification::Facelets { solved: false, .. } => {
                if self.state.solved {
                    debug!("Cube no longer solved");
                    self.state.solved = false;
                    self.broadcaster.publish(Event::CubeUnsolved);
                }
            }
            Notification::Battery(level) => {
                if self.state.battery != Some(level) {
                    debug!(level, "Cube battery");
                    self.state.battery = Some(level);
                    self.broadcaster.publish(Event::CubeBattery { level });
                }
            }
        }
    }

    async fn notify_solved(&self) {
        if self.machine_tx.send(MachineInput::CubeSolved).await.is_err() {
            warn!("Alarm state machine gone, solved signal dropped");
        }
    }

    fn start_attempt(&mut self) {
        let Some(transport) = self.transport.clone() else {
            return;
        };

        let token = self.session_token();
        let generation = self.generation;
        self.state.phase = LinkPhase::Connecting;
        info!(generation, address = self.address.as_deref().unwrap_or("any"), "Connecting to cube");
        self.broadcaster.publish(Event::CubeConnecting);

        let address = self.address.clone();
        let tx = self.inputs_tx.clone();
        self.tasks.spawn(async move {
            let attempt = tokio::time::timeout(CONNECT_TIMEOUT, transport.connect(address.as_deref()));
            let input = tokio::select! {
                _ = token.cancelled() => return,
                result = attempt => match result {
                    Ok(Ok(conn)) => LinkInput::Established { generation, conn },
                    Ok(Err(error)) => LinkInput::Failed { generation, error },
                    Err(_) => LinkInput::Failed {
                        generation,
                        error: LinkError::ConnectTimeout(CONNECT_TIMEOUT),
                    },
                },
            };
            if let Err(mpsc::error::SendError(LinkInput::Established { mut conn, .. })) =
                tx.send(input).await
            {
                conn.close().await;
            }
        });
    }

    /// Mark the link down and, if still wanted, schedule a retry.
    fn link_down(&mut self) {
        self.abandon();
        self.state.phase = LinkPhase::Disconnected;
        self.broadcaster.publish(Event::CubeConnected { connected: false });

        if self.want_link {
            self.schedule_retry();
        }
    }

    fn schedule_retry(&mut self) {
        let delay = self.backoff.next_delay();
        let token = self.session_token();
        let generation = self.generation;
        let tx = self.inputs_tx.clone();
        debug!(generation, ?delay, "Cube reconnect scheduled");

        self.tasks.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(LinkInput::Retry { generation }).await;
                }
            }
        });
    }

    fn set_connected(&mut self) {
        if self.state.phase != LinkPhase::Connected {
            info!(generation = self.generation, "Cube connected");
            self.state.phase = LinkPhase::Connected;
            self.broadcaster.publish(Event::CubeConnected { connected: true });
        }
    }

    /// Cancel whatever the current session is doing and invalidate its
    /// results.
    fn abandon(&mut self) {
        if let Some(token) = self.session.take() {
            token.cancel();
        }
        self.cipher = None;
        self.requests = None;
        self.generation += 1;
    }

    /// Fresh token for the next piece of session work. The previous one is
    /// cancelled, without bumping the generation.
    fn session_token(&mut self) -> CancellationToken {
        let token = CancellationToken::new();
        if let Some(old) = self.session.replace(token.clone()) {
            old.cancel();
        }
        token
    }
}

enum SessionStep {
    Read(Result<Option<Bytes>, LinkError>),
    Write(Bytes),
}

/// Forward notifications from `conn` to the link and write queued commands
/// to it, until cancelled or the session ends.
async fn run_session(
    generation: u64,
    mut conn: Box<dyn CubeConnection>,
    mut requests: mpsc::Receiver<Bytes>,
    token: CancellationToken,
    tx: mpsc::Sender<LinkInput>,
) {
    loop {
        let step = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            Some(frame) = requests.recv() => SessionStep::Write(frame),
            next = conn.next_frame() => SessionStep::Read(next),
        };

        let error = match step {
            SessionStep::Write(frame) => match conn.send(frame).await {
                Ok(()) => continue,
                Err(e) => Some(e),
            },
            SessionStep::Read(Ok(Some(frame))) => {
                if tx.send(LinkInput::Frame { generation, frame }).await.is_err() {
                    break;
                }
                continue;
            }
            SessionStep::Read(Ok(None)) => None,
            SessionStep::Read(Err(e)) => Some(e),
        };
        let _ = tx.send(LinkInput::Lost { generation, error }).await;
        break;
    }
    conn.close().await;
}

#[cfg(test)]
mod tests {
    use tokio::sync::{broadcast, oneshot};

    use super::*;
    use crate::cube::protocol::tests::{move_frame, scrambled_frame, solved_frame};
    use crate::cube::transport::memory::{MemoryCube, MemoryTransport, PendingConnect};
    use crate::cube::{Direction, Face};

    struct Harness {
        commands: mpsc::Sender<CubeCommand>,
        attempts: mpsc::UnboundedReceiver<PendingConnect>,
        events: broadcast::Receiver<Event>,
        machine: mpsc::Receiver<MachineInput>,
        broadcaster: Arc<EventBroadcaster>,
        shutdown: CancellationToken,
    }

    impl Harness {
        fn spawn() -> Self {
            let (link, harness) = Self::build(true);
            tokio::spawn(link.run(harness.shutdown.clone()));
            harness
        }

        fn build(with_transport: bool) -> (CubeLink, Self) {
            let (transport, attempts) = MemoryTransport::new();
            let transport: Option<Arc<dyn CubeTransport>> = if with_transport {
                Some(Arc::new(transport))
            } else {
                None
            };
            let (cmd_tx, cmd_rx) = mpsc::channel(8);
            let (machine_tx, machine_rx) = mpsc::channel(8);
            let broadcaster = Arc::new(EventBroadcaster::new());
            let (_, events) = broadcaster.subscribe();
            let link = CubeLink::new(
                transport,
                Some("CF:AA:79:C9:96:9C".into()),
                cmd_rx,
                broadcaster.clone(),
                machine_tx,
            );
            let harness = Self {
                commands: cmd_tx,
                attempts,
                events,
                machine: machine_rx,
                broadcaster,
                shutdown: CancellationToken::new(),
            };
            (link, harness)
        }

        async fn command(
            &self,
            make: impl FnOnce(oneshot::Sender<Result<(), LinkError>>) -> CubeCommand,
        ) -> Result<(), LinkError> {
            let (tx, rx) = oneshot::channel();
            self.commands.send(make(tx)).await.unwrap();
            rx.await.unwrap()
        }

        async fn connect(&self) -> Result<(), LinkError> {
            self.command(|reply| CubeCommand::Connect { reply }).await
        }

        async fn event(&mut self) -> Event {
            self.events.recv().await.unwrap()
        }

        /// Connect and accept the attempt, returning the cube's end.
        async fn connected(&mut self) -> MemoryCube {
            self.connect().await.unwrap();
            assert_eq!(self.event().await, Event::CubeConnecting);
            let cube = self.attempts.recv().await.unwrap().accept();
            assert_eq!(self.event().await, Event::CubeConnected { connected: true });
            cube
        }
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            self.shutdown.cancel();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn connect_passes_configured_address() {
        let mut h = Harness::spawn();
        h.connect().await.unwrap();
        let attempt = h.attempts.recv().await.unwrap();
        assert_eq!(attempt.address.as_deref(), Some("CF:AA:79:C9:96:9C"));
    }

    #[tokio::test(start_paused = true)]
    async fn connect_is_idempotent() {
        let mut h = Harness::spawn();
        let _cube = h.connected().await;

        h.connect().await.unwrap();
        h.connect().await.unwrap();

        assert!(h.attempts.try_recv().is_err());
        assert!(h.broadcaster.snapshot().cube.connected);
    }

    #[tokio::test]
    async fn connect_without_transport_fails() {
        let (mut link, _h) = Harness::build(false);
        assert!(matches!(link.connect(), Err(LinkError::NoTransport)));
        assert_eq!(link.state().phase, LinkPhase::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn moves_and_solved_signals_are_published() {
        let mut h = Harness::spawn();
        let cube = h.connected().await;

        cube.notify(move_frame(32, 1, 1));
        assert_eq!(
            h.event().await,
            Event::CubeMove {
                face: Face::R,
                direction: Direction::CounterClockwise,
                serial: 1,
            }
        );

        cube.notify(solved_frame());
        assert_eq!(h.event().await, Event::CubeSolved);
        assert!(matches!(h.machine.recv().await, Some(MachineInput::CubeSolved)));

        // A repeated solved signal reaches the machine but is not republished.
        cube.notify(solved_frame());
        assert!(matches!(h.machine.recv().await, Some(MachineInput::CubeSolved)));

        cube.notify(scrambled_frame());
        assert_eq!(h.event().await, Event::CubeUnsolved);
        assert!(!h.broadcaster.snapshot().cube.solved);
    }

    #[tokio::test]
    async fn move_implies_connected() {
        let (mut link, mut h) = Harness::build(false);
        assert_eq!(link.state().phase, LinkPhase::Disconnected);

        link.on_frame(&move_frame(2, 0, 5)).await;

        assert_eq!(link.state().phase, LinkPhase::Connected);
        assert_eq!(h.event().await, Event::CubeConnected { connected: true });
        assert!(matches!(h.event().await, Event::CubeMove { .. }));
    }

    #[tokio::test]
    async fn moves_leave_solved_untouched() {
        let (mut link, _h) = Harness::build(false);
        link.on_frame(&solved_frame()).await;
        link.on_frame(&move_frame(8, 0, 1)).await;
        assert!(link.state().solved);
    }

    #[tokio::test]
    async fn reset_forces_solved() {
        let (mut link, mut h) = Harness::build(false);
        link.reset().await;

        assert!(link.state().solved);
        assert_eq!(h.event().await, Event::CubeSolved);
        assert!(matches!(h.machine.recv().await, Some(MachineInput::CubeSolved)));
    }

    #[tokio::test(start_paused = true)]
    async fn link_loss_keeps_solved_and_retries_after_a_second() {
        let mut h = Harness::spawn();
        let cube = h.connected().await;
        cube.notify(solved_frame());
        assert_eq!(h.event().await, Event::CubeSolved);

        let lost_at = Instant::now();
        drop(cube);
        assert_eq!(h.event().await, Event::CubeConnected { connected: false });
        assert!(h.broadcaster.snapshot().cube.solved);

        let retry = h.attempts.recv().await.unwrap();
        assert!(lost_at.elapsed() >= Duration::from_secs(1));
        assert_eq!(h.event().await, Event::CubeConnecting);

        let _cube = retry.accept();
        assert_eq!(h.event().await, Event::CubeConnected { connected: true });
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_frame_drops_link_and_reconnects() {
        let mut h = Harness::spawn();
        let cube = h.connected().await;

        let mut bad_magic = vec![0x13; 16];
        bad_magic[1] = 0x37;
        cube.notify(bad_magic);
        assert_eq!(h.event().await, Event::CubeConnected { connected: false });
        assert!(h.attempts.recv().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn short_ciphertext_drops_link() {
        let mut h = Harness::spawn();
        let cube = h.connected().await;

        cube.raw(Ok(Bytes::from_static(&[0x13, 0x37])));
        assert_eq!(h.event().await, Event::CubeConnected { connected: false });
        assert!(!h.broadcaster.snapshot().cube.connected);
    }

    #[tokio::test(start_paused = true)]
    async fn session_start_requests_cube_state() {
        let mut h = Harness::spawn();
        let mut cube = h.connected().await;

        assert_eq!(cube.written().await, CubeRequest::Hardware.encode());
        assert_eq!(cube.written().await, CubeRequest::Facelets.encode());
        assert_eq!(cube.written().await, CubeRequest::Battery.encode());
    }

    #[tokio::test(start_paused = true)]
    async fn reset_is_written_to_connected_cube() {
        let mut h = Harness::spawn();
        let mut cube = h.connected().await;
        for _ in 0..3 {
            cube.written().await;
        }

        h.command(|reply| CubeCommand::Reset { reply })
            .await
            .unwrap();

        assert_eq!(cube.written().await, CubeRequest::Reset.encode());
        assert_eq!(h.event().await, Event::CubeSolved);
        assert!(h.broadcaster.snapshot().cube.solved);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_attempts_back_off() {
        let mut h = Harness::spawn();
        h.connect().await.unwrap();

        let mut attempt = h.attempts.recv().await.unwrap();
        for _ in 0..3 {
            let refused_at = Instant::now();
            attempt.refuse(LinkError::Bridge("no cube in range".into()));
            attempt = h.attempts.recv().await.unwrap();
            assert!(refused_at.elapsed() >= Duration::from_secs(1));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn connect_attempt_times_out() {
        let mut h = Harness::spawn();
        h.connect().await.unwrap();
        let started = Instant::now();

        // Hold the attempt without answering it.
        let _pending = h.attempts.recv().await.unwrap();
        assert_eq!(h.event().await, Event::CubeConnecting);
        assert_eq!(h.event().await, Event::CubeConnected { connected: false });
        assert!(started.elapsed() >= CONNECT_TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_abandons_pending_attempt() {
        let mut h = Harness::spawn();
        h.connect().await.unwrap();
        let pending = h.attempts.recv().await.unwrap();

        h.command(|reply| CubeCommand::Disconnect { reply })
            .await
            .unwrap();

        // A late result is closed instead of bringing the link up.
        let cube = pending.accept();

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(cube.is_closed());
        assert!(h.attempts.try_recv().is_err());
        assert!(!h.broadcaster.snapshot().cube.connected);
    }

    #[tokio::test]
    async fn stale_connection_is_discarded() {
        let (mut link, _h) = Harness::build(false);
        link.want_link = true;
        let stale = link.generation;
        link.abandon();

        let (transport, mut attempts) = MemoryTransport::new();
        let attempt = tokio::spawn(async move { transport.connect(None).await });
        let cube = attempts.recv().await.unwrap().accept();
        let conn = attempt.await.unwrap().unwrap();

        link.on_input(LinkInput::Established {
            generation: stale,
            conn,
        })
        .await;
        link.tasks.close();
        link.tasks.wait().await;

        assert_eq!(link.state().phase, LinkPhase::Disconnected);
        assert!(cube.is_closed());
    }

    #[tokio::test]
    async fn disconnect_always_publishes() {
        let (mut link, mut h) = Harness::build(false);
        link.disconnect();
        assert_eq!(h.event().await, Event::CubeConnected { connected: false });
    }
}
