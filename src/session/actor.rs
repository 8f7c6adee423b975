//! Per-entry actor
//!
//! All mutable state of one connection entry lives in an `EntryActor` that
//! runs on its own task and consumes a single command queue. The signaling
//! pump, the peer-event forwarder and every timer post into that queue and
//! never touch entry state directly.
//!
//! Each spawned source is tagged with the epoch current when it was started.
//! Teardown bumps the epoch, so anything still in flight from a previous
//! link or session is discarded on arrival.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::peer::adapter::PeerSessionAdapter;
use crate::peer::candidate::CandidateBuffer;
use crate::peer::engine::{IceCandidate, PeerEngine, PeerEvent, PeerState};
use crate::registry::config::RegistryConfig;
use crate::registry::hub::SubscriptionHub;
use crate::registry::key::StreamKey;
use crate::signaling::link::{LinkEvent, SignalingLink};
use crate::signaling::message::SignalMessage;
use crate::signaling::transport::SignalingConnector;
use crate::stats::ConnectionStats;

use super::config::WebRtcConfig;
use super::heartbeat::HeartbeatMonitor;
use super::state::{ConnectionState, EntryState};

/// Commands consumed by an entry actor
#[derive(Debug)]
pub(crate) enum EntryCommand {
    /// Open the link and session if not already running
    Start,
    /// A new config was supplied on acquire
    Reconfigure(WebRtcConfig),
    /// Caller asked for a fresh attempt
    Reconnect,
    Link { epoch: u64, event: LinkEvent },
    Peer { epoch: u64, event: PeerEvent },
    HeartbeatTick { epoch: u64 },
    ReconnectDue { epoch: u64 },
    DebounceElapsed { epoch: u64 },
    /// Release everything and exit; acknowledged once torn down
    Shutdown(oneshot::Sender<()>),
}

type CommandSender = mpsc::WeakUnboundedSender<EntryCommand>;

fn post(commands: &CommandSender, command: EntryCommand) -> bool {
    commands
        .upgrade()
        .is_some_and(|tx| tx.send(command).is_ok())
}

/// Collaborators and shared handles an actor is started with
pub(crate) struct ActorContext {
    pub key: StreamKey,
    pub settings: RegistryConfig,
    pub connector: Arc<dyn SignalingConnector>,
    pub engine: Arc<dyn PeerEngine>,
    pub hub: Arc<SubscriptionHub>,
    pub stats: Arc<Mutex<ConnectionStats>>,
}

pub(crate) struct EntryActor {
    key: StreamKey,
    config: WebRtcConfig,
    settings: RegistryConfig,
    connector: Arc<dyn SignalingConnector>,
    commands: CommandSender,
    hub: Arc<SubscriptionHub>,
    stats: Arc<Mutex<ConnectionStats>>,

    link: SignalingLink,
    adapter: PeerSessionAdapter,
    candidates: CandidateBuffer,
    heartbeat: HeartbeatMonitor,
    state: EntryState,

    /// Generation of the link and timers
    epoch: u64,
    /// Generation of the peer session; also bumped on renegotiation
    session_epoch: u64,

    remote_peer_id: Option<String>,
    /// Remote candidates received before the offer was applied
    pending_remote: Vec<Option<IceCandidate>>,
    answered: bool,

    peer_events: Option<JoinHandle<()>>,
    reconnect_timer: Option<JoinHandle<()>>,
    debounce_timer: Option<JoinHandle<()>>,
}

impl EntryActor {
    pub(crate) fn new(ctx: ActorContext, config: WebRtcConfig, commands: CommandSender) -> Self {
        let heartbeat =
            HeartbeatMonitor::new(ctx.settings.heartbeat_interval, ctx.settings.liveness_timeout);

        Self {
            link: SignalingLink::new(ctx.key.clone()),
            adapter: PeerSessionAdapter::new(ctx.key.clone(), ctx.engine),
            candidates: CandidateBuffer::new(config.viewer_id.clone()),
            heartbeat,
            state: EntryState::new(),
            key: ctx.key,
            config,
            settings: ctx.settings,
            connector: ctx.connector,
            commands,
            hub: ctx.hub,
            stats: ctx.stats,
            epoch: 0,
            session_epoch: 0,
            remote_peer_id: None,
            pending_remote: Vec::new(),
            answered: false,
            peer_events: None,
            reconnect_timer: None,
            debounce_timer: None,
        }
    }

    /// Consume commands until shut down or every sender is gone
    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<EntryCommand>) {
        while let Some(command) = commands.recv().await {
            match command {
                EntryCommand::Start => self.start().await,
                EntryCommand::Reconfigure(config) => self.reconfigure(config).await,
                EntryCommand::Reconnect => self.reconnect().await,
                EntryCommand::Link { epoch, event } if epoch == self.epoch => {
                    self.on_link_event(event).await
                }
                EntryCommand::Peer { epoch, event } if epoch == self.session_epoch => {
                    self.on_peer_event(event).await
                }
                EntryCommand::HeartbeatTick { epoch } if epoch == self.epoch => {
                    self.on_heartbeat_tick().await
                }
                EntryCommand::ReconnectDue { epoch } if epoch == self.epoch => {
                    self.on_reconnect_due().await
                }
                EntryCommand::DebounceElapsed { epoch } if epoch == self.epoch => {
                    self.on_debounce_elapsed().await
                }
                EntryCommand::Shutdown(ack) => {
                    self.teardown().await;
                    self.state.reset();
                    self.publish();

                    // Queued events may still hold transport handles
                    commands.close();
                    while commands.try_recv().is_ok() {}

                    tracing::info!(stream = %self.key, "Connection released");
                    let _ = ack.send(());
                    return;
                }
                _ => {
                    tracing::trace!(stream = %self.key, "Discarding event from a previous session");
                }
            }
        }

        self.teardown().await;
    }

    async fn start(&mut self) {
        if self.state.retries_exhausted {
            tracing::debug!(stream = %self.key, "Retries exhausted, waiting for an explicit reconnect");
            return;
        }
        if self.link.is_active() || self.adapter.is_active() || self.reconnect_timer.is_some() {
            return;
        }
        self.connect().await;
    }

    async fn reconfigure(&mut self, config: WebRtcConfig) {
        if !self.config.differs_materially(&config) {
            self.config = config;
            return;
        }

        tracing::info!(
            stream = %self.key,
            url = %config.signaling_url,
            viewer = %config.viewer_id,
            "Configuration changed, restarting connection"
        );

        self.teardown().await;
        self.candidates = CandidateBuffer::new(config.viewer_id.clone());
        self.config = config;
        self.state.reset_retries();
        self.connect().await;
    }

    async fn reconnect(&mut self) {
        tracing::info!(stream = %self.key, "Reconnect requested");
        self.teardown().await;
        self.state.reset_retries();
        self.connect().await;
    }

    /// Create a session and open the link for the current epoch
    async fn connect(&mut self) {
        self.state.begin_connecting();
        self.stats.lock().sessions_started += 1;
        self.publish();

        if let Err(e) = self.open_session().await {
            self.fail(e).await;
            return;
        }

        let commands = self.commands.clone();
        let epoch = self.epoch;
        self.link.open(
            self.connector.clone(),
            self.config.signaling_url.clone(),
            self.settings.connect_timeout,
            move |event| post(&commands, EntryCommand::Link { epoch, event }),
        );
    }

    /// Replace the peer session and its event forwarder
    async fn open_session(&mut self) -> Result<()> {
        self.session_epoch += 1;
        if let Some(forwarder) = self.peer_events.take() {
            forwarder.abort();
        }

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        self.adapter
            .create(&self.config.ice_servers, events_tx)
            .await?;

        let commands = self.commands.clone();
        let epoch = self.session_epoch;
        self.peer_events = Some(tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                if !post(&commands, EntryCommand::Peer { epoch, event }) {
                    break;
                }
            }
        }));
        Ok(())
    }

    async fn on_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Opened(outbound) => {
                self.link.attach(outbound);
                self.state.link_opened();
                tracing::info!(
                    stream = %self.key,
                    url = %self.config.signaling_url,
                    "Signaling link open"
                );
                self.publish();
            }
            LinkEvent::Message(text) => self.on_message(&text).await,
            LinkEvent::Closed(reason) => {
                if self.link.on_closed() {
                    let reason = reason.unwrap_or_else(|| "no reason given".into());
                    self.fail(Error::Transport(format!("signaling closed: {}", reason)))
                        .await;
                }
            }
            LinkEvent::Failed(e) => {
                self.link.on_closed();
                self.fail(e).await;
            }
        }
    }

    async fn on_message(&mut self, text: &str) {
        self.stats.lock().messages_received += 1;

        let message = match SignalMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(stream = %self.key, error = %e, "Ignoring undecodable signaling frame");
                return;
            }
        };

        if let Some(to) = message.recipient() {
            if to != self.config.viewer_id {
                tracing::debug!(
                    stream = %self.key,
                    kind = message.kind(),
                    from = message.sender().unwrap_or("?"),
                    to = %to,
                    "Ignoring message addressed to another viewer"
                );
                return;
            }
        }

        match message {
            SignalMessage::Offer { from, sdp, .. } => self.on_offer(from, sdp).await,
            SignalMessage::Ice { candidate, .. } => {
                if self.adapter.has_remote_offer() {
                    self.adapter.add_remote_candidate(candidate).await;
                } else {
                    self.pending_remote.push(candidate);
                }
            }
            SignalMessage::Ping { from, .. } => {
                let pong = SignalMessage::pong(self.config.viewer_id.clone(), from);
                self.send(&pong);
            }
            SignalMessage::Pong { .. } => {
                self.heartbeat.record_pong();
                self.stats.lock().pongs_received += 1;
            }
            SignalMessage::Answer { from, .. } => {
                tracing::debug!(stream = %self.key, from = %from, "Ignoring inbound answer");
            }
            SignalMessage::Unknown => {
                tracing::debug!(stream = %self.key, "Ignoring unknown signaling message type");
            }
        }
    }

    async fn on_offer(&mut self, from: String, sdp: String) {
        if self.reconnect_timer.is_some() {
            tracing::debug!(stream = %self.key, remote = %from, "Ignoring offer while a reconnect is pending");
            return;
        }

        tracing::info!(stream = %self.key, remote = %from, "Offer received");

        if self.adapter.has_remote_offer() {
            tracing::info!(stream = %self.key, "Renegotiating on a fresh peer session");
            self.heartbeat.stop();
            self.answered = false;
            self.candidates.clear();
            self.pending_remote.clear();
            if let Err(e) = self.open_session().await {
                self.fail(e).await;
                return;
            }
            self.publish();
        }

        self.remote_peer_id = Some(from.clone());

        let flushed = self.candidates.set_remote(&from);
        if !flushed.is_empty() {
            tracing::debug!(
                stream = %self.key,
                count = flushed.len(),
                "Flushing buffered local candidates"
            );
        }
        for message in &flushed {
            if self.send(message) {
                let mut stats = self.stats.lock();
                stats.candidates_sent += 1;
                stats.candidates_flushed += 1;
            }
        }

        if let Err(e) = self.negotiate(&from, &sdp).await {
            self.fail(e).await;
        }
    }

    /// Offer in, answer out. The heartbeat starts once the answer is on the wire.
    async fn negotiate(&mut self, remote: &str, sdp: &str) -> Result<()> {
        self.adapter.set_remote_offer(sdp).await?;

        for candidate in std::mem::take(&mut self.pending_remote) {
            self.adapter.add_remote_candidate(candidate).await;
        }

        let answer = self.adapter.create_and_set_local_answer().await?;
        let message = SignalMessage::answer(self.config.viewer_id.clone(), remote, answer);
        if !self.send(&message) {
            return Err(Error::Transport("answer could not be sent".into()));
        }

        self.answered = true;
        self.start_heartbeat();
        tracing::info!(stream = %self.key, remote = %remote, "Answer sent");
        Ok(())
    }

    fn start_heartbeat(&mut self) {
        let commands = self.commands.clone();
        let epoch = self.epoch;
        self.heartbeat
            .start(move || post(&commands, EntryCommand::HeartbeatTick { epoch }));
    }

    async fn on_heartbeat_tick(&mut self) {
        if !self.answered || !self.heartbeat.is_running() {
            return;
        }

        if let Err(e) = self.heartbeat.check() {
            tracing::warn!(stream = %self.key, error = %e, "Liveness timeout");
            self.fail(e).await;
            return;
        }

        let Some(remote) = self.remote_peer_id.clone() else {
            return;
        };
        if self.send(&SignalMessage::ping(self.config.viewer_id.clone(), remote)) {
            self.stats.lock().pings_sent += 1;
        }
    }

    async fn on_peer_event(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::LocalCandidate(candidate) => match self.candidates.push(candidate) {
                Some(message) => {
                    if self.send(&message) {
                        self.stats.lock().candidates_sent += 1;
                    }
                }
                None => {
                    tracing::debug!(
                        stream = %self.key,
                        queued = self.candidates.len(),
                        "Local candidate queued until the remote peer is known"
                    );
                }
            },
            PeerEvent::Track(track) => {
                self.adapter.on_track(track);
                self.publish();
            }
            PeerEvent::StateChange(peer_state) => self.on_peer_state(peer_state),
        }
    }

    fn on_peer_state(&mut self, peer_state: PeerState) {
        tracing::debug!(stream = %self.key, peer_state = %peer_state, "Peer state changed");

        // The session is replaced once the pending reconnect fires
        if self.reconnect_timer.is_some() {
            return;
        }

        match peer_state {
            PeerState::Connected | PeerState::Completed => {
                if let Some(timer) = self.debounce_timer.take() {
                    timer.abort();
                    tracing::info!(stream = %self.key, "Peer session recovered");
                }
                if self.state.state != ConnectionState::Connected {
                    self.state.session_connected();
                    self.stats.lock().last_connected_at = Some(Instant::now());
                    tracing::info!(stream = %self.key, "Peer session connected");
                    self.publish();
                }
            }
            PeerState::Failed => {
                let delay = self.settings.failed_debounce;
                self.degrade(ConnectionState::Failed, "peer connection failed", delay);
            }
            PeerState::Disconnected => {
                let delay = self.settings.disconnected_debounce;
                self.degrade(ConnectionState::Disconnected, "peer connection lost", delay);
            }
            PeerState::New | PeerState::Connecting | PeerState::Closed => {}
        }
    }

    /// Record a degraded peer state and arm the debounce timer once
    fn degrade(&mut self, state: ConnectionState, reason: &str, delay: Duration) {
        if self.state.retries_exhausted {
            return;
        }

        self.state.degrade(state, reason);
        self.publish();

        if self.debounce_timer.is_some() {
            return;
        }

        tracing::warn!(
            stream = %self.key,
            state = %state,
            debounce_ms = delay.as_millis() as u64,
            "Peer session degraded"
        );

        let commands = self.commands.clone();
        let epoch = self.epoch;
        self.debounce_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            post(&commands, EntryCommand::DebounceElapsed { epoch });
        }));
    }

    async fn on_debounce_elapsed(&mut self) {
        self.debounce_timer = None;
        if self.state.state == ConnectionState::Connected {
            return;
        }

        let reason = self
            .state
            .error
            .clone()
            .unwrap_or_else(|| "peer connection lost".into());
        self.schedule_reconnect(Error::Session(reason), Some(Duration::ZERO))
            .await;
    }

    /// Surface a failure and hand it to the reconnect policy
    async fn fail(&mut self, error: Error) {
        if self.state.retries_exhausted {
            return;
        }

        self.heartbeat.stop();
        let state = if error.is_transport() {
            ConnectionState::Disconnected
        } else {
            ConnectionState::Failed
        };
        self.state.degrade(state, error.to_string());
        self.publish();

        self.schedule_reconnect(error, None).await;
    }

    /// Arm the reconnect timer, or give up once the attempt budget is spent.
    ///
    /// Without an explicit `delay` the wait grows linearly with the attempt.
    /// A request while a reconnect is already pending is dropped.
    async fn schedule_reconnect(&mut self, error: Error, delay: Option<Duration>) {
        if self.state.retries_exhausted || self.reconnect_timer.is_some() {
            return;
        }

        let attempt = self.state.reconnect_attempts + 1;
        if attempt > self.settings.max_reconnect_attempts {
            let exhausted = Error::MaxRetriesExceeded(self.state.reconnect_attempts);
            tracing::error!(
                stream = %self.key,
                attempts = self.state.reconnect_attempts,
                last_error = %error,
                "Giving up on reconnecting"
            );
            self.teardown().await;
            self.state.exhaust(&exhausted);
            self.publish();
            return;
        }

        self.state.reconnect_attempts = attempt;
        let delay = delay.unwrap_or_else(|| self.settings.backoff_delay(attempt));
        self.stats.lock().reconnects_scheduled += 1;

        tracing::warn!(
            stream = %self.key,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Reconnect scheduled"
        );
        self.publish();

        let commands = self.commands.clone();
        let epoch = self.epoch;
        self.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            post(&commands, EntryCommand::ReconnectDue { epoch });
        }));
    }

    async fn on_reconnect_due(&mut self) {
        self.reconnect_timer = None;
        tracing::info!(
            stream = %self.key,
            attempt = self.state.reconnect_attempts,
            "Reconnecting"
        );
        self.teardown().await;
        self.connect().await;
    }

    /// Release the link and session. Timers go first so none can fire into a
    /// half-torn-down entry.
    async fn teardown(&mut self) {
        self.epoch += 1;
        self.session_epoch += 1;

        for task in [
            self.reconnect_timer.take(),
            self.debounce_timer.take(),
            self.peer_events.take(),
        ]
        .into_iter()
        .flatten()
        {
            task.abort();
        }
        self.heartbeat.stop();

        self.adapter.close().await;
        self.candidates.clear();
        self.pending_remote.clear();
        self.remote_peer_id = None;
        self.answered = false;
        self.link.shutdown().await;

        self.publish();
    }

    fn send(&self, message: &SignalMessage) -> bool {
        let sent = self.link.send(message);
        if sent {
            self.stats.lock().messages_sent += 1;
        }
        sent
    }

    fn publish(&self) {
        self.hub
            .publish(self.state.snapshot(self.adapter.media().cloned()));
    }
}
