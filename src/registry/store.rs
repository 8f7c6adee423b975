//! Connection store implementation
//!
//! The central table of viewer connections, one entry per stream key.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::peer::engine::PeerEngine;
use crate::session::config::WebRtcConfig;
use crate::signaling::transport::{SignalingConnector, WebSocketConnector};

use super::config::RegistryConfig;
use super::entry::{ConnectionEntry, ConnectionHandle};
use super::key::StreamKey;

/// Owner of every viewer connection in the process
///
/// Insert, remove and dispose happen under one table lock. Removal awaits the
/// entry's teardown while still holding it, so a concurrent acquire of the
/// same key cannot start a second session before the first is closed.
pub struct ConnectionStore {
    /// Map of stream key to connection entry
    entries: Mutex<HashMap<StreamKey, Arc<ConnectionEntry>>>,

    connector: Arc<dyn SignalingConnector>,
    engine: Arc<dyn PeerEngine>,

    /// Configuration
    config: RegistryConfig,
}

impl ConnectionStore {
    /// Create a store that signals over WebSocket with default timings
    pub fn new(engine: Arc<dyn PeerEngine>) -> Self {
        Self::with_config(engine, RegistryConfig::default())
    }

    /// Create a store that signals over WebSocket with custom timings
    pub fn with_config(engine: Arc<dyn PeerEngine>, config: RegistryConfig) -> Self {
        Self::with_connector(Arc::new(WebSocketConnector), engine, config)
    }

    /// Create a store with a custom signaling transport
    pub fn with_connector(
        connector: Arc<dyn SignalingConnector>,
        engine: Arc<dyn PeerEngine>,
        config: RegistryConfig,
    ) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            connector,
            engine,
            config,
        }
    }

    /// Get the store configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Get or create the connection for `key`
    ///
    /// A new entry starts connecting right away. For an existing entry a
    /// materially different config (viewer id or signaling URL) restarts the
    /// connection; other changes apply to the next session. `persistent =
    /// true` marks the entry to survive `release`; `false` leaves an existing
    /// mark alone.
    ///
    /// Fails with `ConfigInvalid` before touching the table if `config` is
    /// malformed.
    pub async fn acquire(
        &self,
        key: StreamKey,
        config: WebRtcConfig,
        persistent: bool,
    ) -> Result<ConnectionHandle> {
        if let Err(e) = config.validate() {
            tracing::warn!(stream = %key, error = %e, "Rejecting connection config");
            return Err(e);
        }

        let mut entries = self.entries.lock().await;

        if let Some(entry) = entries.get(&key) {
            if persistent {
                entry.set_persistent(true);
            }
            let restarted = entry.update_config(config)?;

            tracing::info!(
                stream = %key,
                persistent = entry.is_persistent(),
                restarted,
                "Connection reused"
            );
            return Ok(ConnectionHandle::new(entry.clone()));
        }

        let entry = ConnectionEntry::spawn(
            key.clone(),
            config,
            persistent,
            self.config.clone(),
            self.connector.clone(),
            self.engine.clone(),
        );
        entries.insert(key.clone(), entry.clone());

        tracing::info!(
            stream = %key,
            persistent,
            connections = entries.len(),
            "Connection created"
        );

        Ok(ConnectionHandle::new(entry))
    }

    /// Release a consumer's interest in `key`
    ///
    /// Non-persistent entries are torn down and removed. Persistent entries
    /// keep running. Returns `true` if the entry was removed.
    pub async fn release(&self, key: &StreamKey) -> bool {
        let mut entries = self.entries.lock().await;

        let persistent = match entries.get(key) {
            Some(entry) => entry.is_persistent(),
            None => return false,
        };
        if persistent {
            tracing::debug!(stream = %key, "Keeping persistent connection");
            return false;
        }

        Self::remove_locked(&mut entries, key).await;
        true
    }

    /// Tear down `key` regardless of persistence
    pub async fn close(&self, key: &StreamKey) -> bool {
        let mut entries = self.entries.lock().await;
        if !entries.contains_key(key) {
            return false;
        }
        Self::remove_locked(&mut entries, key).await;
        true
    }

    /// Mark or unmark `key` as persistent. Returns `false` if unknown.
    pub async fn set_persistent(&self, key: &StreamKey, persistent: bool) -> bool {
        let entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) => {
                entry.set_persistent(persistent);
                tracing::debug!(stream = %key, persistent, "Persistence updated");
                true
            }
            None => false,
        }
    }

    /// Handle to an existing connection, without creating one
    pub async fn get(&self, key: &StreamKey) -> Option<ConnectionHandle> {
        let entries = self.entries.lock().await;
        entries.get(key).cloned().map(ConnectionHandle::new)
    }

    /// Get total number of connections
    pub async fn connection_count(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Keys of every live connection
    pub async fn keys(&self) -> Vec<StreamKey> {
        self.entries.lock().await.keys().cloned().collect()
    }

    /// Tear down every connection, persistent ones included
    pub async fn dispose_all(&self) {
        let mut entries = self.entries.lock().await;
        let drained: Vec<_> = entries.drain().map(|(_, entry)| entry).collect();
        let count = drained.len();

        join_all(drained.iter().map(|entry| entry.shutdown())).await;

        tracing::info!(connections = count, "All connections disposed");
    }

    async fn remove_locked(entries: &mut HashMap<StreamKey, Arc<ConnectionEntry>>, key: &StreamKey) {
        if let Some(entry) = entries.remove(key) {
            entry.shutdown().await;
            tracing::info!(
                stream = %key,
                age_secs = entry.age().as_secs(),
                connections = entries.len(),
                "Connection removed"
            );
        }
    }
}
