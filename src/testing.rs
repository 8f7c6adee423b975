//! In-memory collaborators for tests
//!
//! `FakeConnector` hands every accepted connection to the test as a
//! `FakeServer`. `FakeEngine` records every engine call as a short string and
//! hands each created session to the test so it can emit peer events.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::peer::engine::{
    IceCandidate, PeerEngine, PeerEvent, PeerEventSender, PeerSession, PeerState, RemoteTrack,
    TrackKind,
};
use crate::session::config::IceServer;
use crate::signaling::message::SignalMessage;
use crate::signaling::transport::{ChannelEvent, SignalingChannel, SignalingConnector};

/// Connector that accepts connections in memory
///
/// A connection counts as open until the client drops its read half.
pub(crate) struct FakeConnector {
    servers: mpsc::UnboundedSender<FakeServer>,
    refuse: AtomicBool,
    attempts: AtomicU32,
    links: Mutex<Vec<(String, mpsc::UnboundedSender<ChannelEvent>)>>,
    overlapped: AtomicBool,
}

impl FakeConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<FakeServer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            servers: tx,
            refuse: AtomicBool::new(false),
            attempts: AtomicU32::new(0),
            links: Mutex::new(Vec::new()),
            overlapped: AtomicBool::new(false),
        });
        (connector, rx)
    }

    /// Make every following connect fail
    pub fn refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Connect calls so far, refused ones included
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Connections the client still holds open
    pub fn open_links(&self) -> usize {
        let mut links = self.links.lock();
        links.retain(|(_, tx)| !tx.is_closed());
        links.len()
    }

    /// Whether a URL was ever connected while an earlier link to it was open
    pub fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignalingConnector for FakeConnector {
    async fn connect(&self, url: &str) -> Result<SignalingChannel> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(Error::Transport("connection refused".into()));
        }

        let (outbound, from_client) = mpsc::unbounded_channel();
        let (to_client, inbound) = mpsc::unbounded_channel();

        {
            let mut links = self.links.lock();
            links.retain(|(_, tx)| !tx.is_closed());
            if links.iter().any(|(open, _)| open == url) {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            links.push((url.to_string(), to_client.clone()));
        }

        let server = FakeServer {
            url: url.to_string(),
            from_client,
            to_client,
        };
        if self.servers.send(server).is_err() {
            return Err(Error::Transport("server gone".into()));
        }

        Ok(SignalingChannel { outbound, inbound })
    }
}

/// Server end of one fake signaling connection
///
/// Dropping it looks like the transport going away.
pub(crate) struct FakeServer {
    pub url: String,
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<ChannelEvent>,
}

impl FakeServer {
    /// Next message from the client, or `None` once the client closed
    pub async fn recv(&mut self) -> Option<SignalMessage> {
        let text = self.from_client.recv().await?;
        Some(SignalMessage::decode(&text).expect("client sent an undecodable frame"))
    }

    /// Next message if one is already queued
    pub fn try_recv(&mut self) -> Option<SignalMessage> {
        let text = self.from_client.try_recv().ok()?;
        Some(SignalMessage::decode(&text).expect("client sent an undecodable frame"))
    }

    /// Skip messages until one of the given type arrives
    pub async fn recv_kind(&mut self, kind: &str) -> Option<SignalMessage> {
        while let Some(message) = self.recv().await {
            if message.kind() == kind {
                return Some(message);
            }
        }
        None
    }

    /// Whether the client dropped its end. Discards anything still queued.
    pub fn is_closed(&mut self) -> bool {
        loop {
            match self.from_client.try_recv() {
                Ok(_) => continue,
                Err(mpsc::error::TryRecvError::Empty) => return false,
                Err(mpsc::error::TryRecvError::Disconnected) => return true,
            }
        }
    }

    pub fn send(&self, message: SignalMessage) {
        self.send_raw(&message.encode().expect("encode"));
    }

    pub fn send_raw(&self, text: &str) {
        let _ = self.to_client.send(ChannelEvent::Text(text.to_string()));
    }

    /// Close from the server side with a reason
    pub fn close(&self, reason: &str) {
        let _ = self.to_client.send(ChannelEvent::Closed(Some(reason.to_string())));
    }

    /// Offer from broadcaster `from`
    pub fn offer(&self, from: &str, sdp: &str) {
        self.send(SignalMessage::Offer {
            from: from.into(),
            sdp: sdp.into(),
            to: None,
        });
    }
}

#[derive(Default)]
struct EngineLog {
    calls: Vec<String>,
    next_id: u32,
    live: HashSet<u32>,
    live_per_tag: HashMap<String, usize>,
    overlapped: bool,
    reject_candidates: bool,
    reject_offers: bool,
}

/// Engine that records calls instead of negotiating
pub(crate) struct FakeEngine {
    log: Arc<Mutex<EngineLog>>,
    sessions: mpsc::UnboundedSender<FakeSessionHandle>,
}

impl FakeEngine {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<FakeSessionHandle>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = Arc::new(Self {
            log: Arc::new(Mutex::new(EngineLog::default())),
            sessions: tx,
        });
        (engine, rx)
    }

    /// Every engine call so far, e.g. `remote#2:<sdp>`
    pub fn calls(&self) -> Vec<String> {
        self.log.lock().calls.clone()
    }

    pub fn live_sessions(&self) -> usize {
        self.log.lock().live.len()
    }

    /// Whether two sessions for the same first ICE URL were ever live together
    pub fn overlapped(&self) -> bool {
        self.log.lock().overlapped
    }

    pub fn reject_candidates(&self, reject: bool) {
        self.log.lock().reject_candidates = reject;
    }

    /// Make `set_remote_description` fail
    pub fn reject_offers(&self, reject: bool) {
        self.log.lock().reject_offers = reject;
    }
}

#[async_trait]
impl PeerEngine for FakeEngine {
    async fn create_session(
        &self,
        ice_servers: &[IceServer],
        events: PeerEventSender,
    ) -> Result<Arc<dyn PeerSession>> {
        let tag = ice_servers
            .first()
            .and_then(|server| server.urls.first().cloned())
            .unwrap_or_default();

        let id = {
            let mut log = self.log.lock();
            log.next_id += 1;
            let id = log.next_id;
            log.calls.push(format!("create#{}", id));
            log.live.insert(id);

            let live = log.live_per_tag.entry(tag.clone()).or_default();
            *live += 1;
            if *live > 1 {
                log.overlapped = true;
            }
            id
        };

        let _ = self.sessions.send(FakeSessionHandle {
            id,
            events: events.clone(),
        });

        Ok(Arc::new(FakeSession {
            id,
            tag,
            log: self.log.clone(),
            remote: Mutex::new(String::new()),
            _events: events,
        }))
    }
}

struct FakeSession {
    id: u32,
    tag: String,
    log: Arc<Mutex<EngineLog>>,
    remote: Mutex<String>,
    _events: PeerEventSender,
}

#[async_trait]
impl PeerSession for FakeSession {
    async fn set_remote_description(&self, offer_sdp: &str) -> Result<()> {
        let mut log = self.log.lock();
        log.calls.push(format!("remote#{}:{}", self.id, offer_sdp));
        if log.reject_offers {
            return Err(Error::Session("malformed sdp".into()));
        }
        *self.remote.lock() = offer_sdp.to_string();
        Ok(())
    }

    async fn create_answer(&self) -> Result<String> {
        self.log.lock().calls.push(format!("answer#{}", self.id));
        Ok(format!("answer-to:{}", self.remote.lock()))
    }

    async fn set_local_description(&self, answer_sdp: &str) -> Result<()> {
        self.log
            .lock()
            .calls
            .push(format!("local#{}:{}", self.id, answer_sdp));
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: Option<IceCandidate>) -> Result<()> {
        let mut log = self.log.lock();
        let line = candidate.map(|c| c.candidate).unwrap_or_else(|| "end".into());
        log.calls.push(format!("candidate#{}:{}", self.id, line));
        if log.reject_candidates {
            return Err(Error::Session("duplicate candidate".into()));
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut log = self.log.lock();
        if log.live.remove(&self.id) {
            log.calls.push(format!("close#{}", self.id));
            if let Some(live) = log.live_per_tag.get_mut(&self.tag) {
                *live -= 1;
            }
        }
        Ok(())
    }
}

/// Test-side handle for emitting events from a fake session
pub(crate) struct FakeSessionHandle {
    pub id: u32,
    pub events: PeerEventSender,
}

impl FakeSessionHandle {
    pub fn candidate(&self, line: &str) {
        let _ = self
            .events
            .send(PeerEvent::LocalCandidate(Some(IceCandidate::new(line))));
    }

    pub fn end_of_candidates(&self) {
        let _ = self.events.send(PeerEvent::LocalCandidate(None));
    }

    pub fn state(&self, state: PeerState) {
        let _ = self.events.send(PeerEvent::StateChange(state));
    }

    pub fn track(&self, track: Arc<FakeTrack>) {
        let _ = self.events.send(PeerEvent::Track(track));
    }
}

/// Remote track that remembers whether it was stopped
#[derive(Debug)]
pub(crate) struct FakeTrack {
    id: String,
    stream_id: String,
    kind: TrackKind,
    stopped: AtomicBool,
}

impl FakeTrack {
    pub fn video(id: &str, stream_id: &str) -> Arc<Self> {
        Self::with_kind(id, stream_id, TrackKind::Video)
    }

    pub fn audio(id: &str, stream_id: &str) -> Arc<Self> {
        Self::with_kind(id, stream_id, TrackKind::Audio)
    }

    fn with_kind(id: &str, stream_id: &str, kind: TrackKind) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            stream_id: stream_id.into(),
            kind,
            stopped: AtomicBool::new(false),
        })
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl RemoteTrack for FakeTrack {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn stream_id(&self) -> String {
        self.stream_id.clone()
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
