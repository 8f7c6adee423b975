//! Connection entry and consumer handle
//!
//! A `ConnectionEntry` is the store's record for one stream key: the command
//! queue of its actor plus the state that consumers read without going
//! through the actor (snapshots, stats, flags). `ConnectionHandle` is the
//! cloneable view handed out by `acquire`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::peer::adapter::MediaHandle;
use crate::peer::engine::PeerEngine;
use crate::session::actor::{ActorContext, EntryActor, EntryCommand};
use crate::session::config::WebRtcConfig;
use crate::session::state::{ConnectionSnapshot, ConnectionState};
use crate::signaling::transport::SignalingConnector;
use crate::stats::ConnectionStats;

use super::config::RegistryConfig;
use super::hub::{Subscription, SubscriptionHub};
use super::key::StreamKey;

/// Entry for a single stream key in the store
pub(crate) struct ConnectionEntry {
    key: StreamKey,

    /// Queue of the actor that owns the link and session
    commands: mpsc::UnboundedSender<EntryCommand>,

    /// Snapshot fan-out
    hub: Arc<SubscriptionHub>,

    stats: Arc<Mutex<ConnectionStats>>,

    /// Survives `release` when set
    persistent: AtomicBool,

    /// Config the entry was last started or reconfigured with
    config: Mutex<WebRtcConfig>,

    /// When the entry was created
    created_at: Instant,

    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionEntry {
    /// Create an entry and start its actor
    pub(super) fn spawn(
        key: StreamKey,
        config: WebRtcConfig,
        persistent: bool,
        settings: RegistryConfig,
        connector: Arc<dyn SignalingConnector>,
        engine: Arc<dyn PeerEngine>,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let hub = SubscriptionHub::new(key.clone());
        let stats = Arc::new(Mutex::new(ConnectionStats::new()));

        let ctx = ActorContext {
            key: key.clone(),
            settings,
            connector,
            engine,
            hub: hub.clone(),
            stats: stats.clone(),
        };
        let actor = EntryActor::new(ctx, config.clone(), tx.downgrade());
        let task = tokio::spawn(actor.run(rx));

        let entry = Arc::new(Self {
            key,
            commands: tx,
            hub,
            stats,
            persistent: AtomicBool::new(persistent),
            config: Mutex::new(config),
            created_at: Instant::now(),
            task: Mutex::new(Some(task)),
        });

        // The actor is alive: it holds the receiver until shut down
        let _ = entry.send(EntryCommand::Start);
        entry
    }

    pub(super) fn send(&self, command: EntryCommand) -> Result<()> {
        self.commands.send(command).map_err(|_| Error::Closed)
    }

    pub(super) fn is_persistent(&self) -> bool {
        self.persistent.load(Ordering::Acquire)
    }

    pub(super) fn set_persistent(&self, persistent: bool) {
        self.persistent.store(persistent, Ordering::Release);
    }

    /// Hand a newly supplied config to the actor.
    ///
    /// Returns `true` if it differs materially and the connection restarts.
    pub(super) fn update_config(&self, config: WebRtcConfig) -> Result<bool> {
        let mut current = self.config.lock();
        if *current == config {
            return Ok(false);
        }

        let restart = current.differs_materially(&config);
        *current = config.clone();
        drop(current);

        self.send(EntryCommand::Reconfigure(config))?;
        Ok(restart)
    }

    /// Tear the entry down and wait until its link and session are released
    pub(super) async fn shutdown(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.send(EntryCommand::Shutdown(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }

        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(stream = %self.key, error = %e, "Connection task ended abnormally");
            }
        }
    }

    pub(super) fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// Consumer view of one connection
///
/// Cheap to clone. Dropping a handle never affects the connection; only the
/// store's `release`, `close` and `dispose_all` do.
#[derive(Clone)]
pub struct ConnectionHandle {
    entry: Arc<ConnectionEntry>,
}

impl ConnectionHandle {
    pub(super) fn new(entry: Arc<ConnectionEntry>) -> Self {
        Self { entry }
    }

    pub fn key(&self) -> &StreamKey {
        &self.entry.key
    }

    pub fn state(&self) -> ConnectionState {
        self.entry.hub.current().state
    }

    /// Media of the current session, once a track has arrived
    pub fn media(&self) -> Option<MediaHandle> {
        self.entry.hub.current().media
    }

    /// Last failure, if the connection is not healthy
    pub fn error(&self) -> Option<String> {
        self.entry.hub.current().error
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.entry.hub.current()
    }

    /// Observe every change. The current snapshot is delivered synchronously
    /// before this returns.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ConnectionSnapshot) + Send + Sync + 'static,
    {
        self.entry.hub.subscribe(callback)
    }

    /// Async alternative to `subscribe`
    pub fn watch(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.entry.hub.watch()
    }

    /// Start over with a fresh retry budget. Also resumes a connection that
    /// gave up after too many attempts.
    pub fn reconnect(&self) -> Result<()> {
        self.entry.send(EntryCommand::Reconnect)
    }

    pub fn stats(&self) -> ConnectionStats {
        self.entry.stats.lock().clone()
    }

    pub fn is_persistent(&self) -> bool {
        self.entry.is_persistent()
    }

    /// Config currently in effect
    pub fn config(&self) -> WebRtcConfig {
        self.entry.config.lock().clone()
    }

    /// Whether both handles refer to the same connection entry
    pub fn same_connection(&self, other: &ConnectionHandle) -> bool {
        Arc::ptr_eq(&self.entry, &other.entry)
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("key", &self.entry.key)
            .field("state", &self.state())
            .field("persistent", &self.is_persistent())
            .finish()
    }
}
