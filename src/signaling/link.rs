//! Signaling link
//!
//! One logical connection to the signaling server for one stream key. The link
//! never mutates entry state itself: connect results and inbound traffic are
//! reported through a notifier that posts into the owning entry's queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::Error;
use crate::registry::key::StreamKey;

use super::message::SignalMessage;
use super::transport::{ChannelEvent, SignalingChannel, SignalingConnector};

/// Something that happened on a signaling link
#[derive(Debug)]
pub enum LinkEvent {
    /// Transport is open. The writer stays valid only while the link's
    /// pump holds the transport.
    Opened(mpsc::WeakUnboundedSender<String>),
    /// Inbound text frame
    Message(String),
    /// Transport closed by the remote side
    Closed(Option<String>),
    /// Connect or I/O failure
    Failed(Error),
}

/// Signaling link owned by a connection entry
pub struct SignalingLink {
    key: StreamKey,
    outbound: Option<mpsc::WeakUnboundedSender<String>>,
    pump: Option<JoinHandle<()>>,
    closed_intentionally: bool,
}

impl SignalingLink {
    pub fn new(key: StreamKey) -> Self {
        Self {
            key,
            outbound: None,
            pump: None,
            closed_intentionally: false,
        }
    }

    /// Start connecting to `url`, closing any previous transport first.
    ///
    /// `notify` receives every `LinkEvent` for this transport and returns
    /// `false` once nobody is listening, which stops the pump.
    pub fn open<F>(
        &mut self,
        connector: Arc<dyn SignalingConnector>,
        url: String,
        connect_timeout: Duration,
        notify: F,
    ) where
        F: Fn(LinkEvent) -> bool + Send + 'static,
    {
        self.close();
        self.closed_intentionally = false;

        tracing::debug!(stream = %self.key, url = %url, "Opening signaling link");

        self.pump = Some(tokio::spawn(async move {
            let channel = match tokio::time::timeout(connect_timeout, connector.connect(&url)).await
            {
                Ok(Ok(channel)) => channel,
                Ok(Err(e)) => {
                    notify(LinkEvent::Failed(e));
                    return;
                }
                Err(_) => {
                    notify(LinkEvent::Failed(Error::Transport(format!(
                        "connect timed out after {}s",
                        connect_timeout.as_secs()
                    ))));
                    return;
                }
            };

            let SignalingChannel {
                outbound,
                mut inbound,
            } = channel;

            // The pump owns both halves; dropping it closes the transport
            if !notify(LinkEvent::Opened(outbound.downgrade())) {
                return;
            }
            let _outbound = outbound;

            while let Some(event) = inbound.recv().await {
                let (event, terminal) = match event {
                    ChannelEvent::Text(text) => (LinkEvent::Message(text), false),
                    ChannelEvent::Closed(reason) => (LinkEvent::Closed(reason), true),
                    ChannelEvent::Error(e) => (LinkEvent::Failed(Error::Transport(e)), true),
                };
                if !notify(event) || terminal {
                    return;
                }
            }

            notify(LinkEvent::Closed(Some("transport dropped".into())));
        }));
    }

    /// Install the writer handed over by `LinkEvent::Opened`
    pub fn attach(&mut self, outbound: mpsc::WeakUnboundedSender<String>) {
        self.outbound = Some(outbound);
    }

    /// Send a message. Returns `false` (and logs) if the link is not open.
    pub fn send(&self, message: &SignalMessage) -> bool {
        let Some(outbound) = self.writer() else {
            tracing::warn!(
                stream = %self.key,
                kind = message.kind(),
                "Signaling link not open, dropping message"
            );
            return false;
        };

        let text = match message.encode() {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(stream = %self.key, error = %e, "Failed to encode signaling message");
                return false;
            }
        };

        if outbound.send(text).is_err() {
            tracing::warn!(stream = %self.key, kind = message.kind(), "Signaling link went away");
            return false;
        }

        tracing::debug!(stream = %self.key, kind = message.kind(), "Signaling message sent");
        true
    }

    fn writer(&self) -> Option<mpsc::UnboundedSender<String>> {
        self.outbound
            .as_ref()
            .and_then(|weak| weak.upgrade())
            .filter(|tx| !tx.is_closed())
    }

    /// Record that the transport went down.
    ///
    /// Returns `true` if the close was unexpected and should be recovered.
    /// The finished pump is kept until `shutdown` reaps it.
    pub fn on_closed(&mut self) -> bool {
        self.outbound = None;
        !self.closed_intentionally
    }

    /// Close the transport on purpose
    pub fn close(&mut self) {
        self.closed_intentionally = true;
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if self.outbound.take().is_some() {
            tracing::debug!(stream = %self.key, "Signaling link closed");
        }
    }

    /// Close on purpose and wait until the transport is released
    pub async fn shutdown(&mut self) {
        let pump = self.pump.take();
        self.close();
        if let Some(pump) = pump {
            pump.abort();
            let _ = pump.await;
        }
    }

    /// Whether the transport is open for writing
    pub fn is_open(&self) -> bool {
        self.writer().is_some()
    }

    /// Whether a connect or read pump is running
    pub fn is_active(&self) -> bool {
        self.pump.is_some() || self.outbound.is_some()
    }

    pub fn closed_intentionally(&self) -> bool {
        self.closed_intentionally
    }
}

impl Drop for SignalingLink {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeConnector;

    #[tokio::test]
    async fn test_send_before_open_is_a_noop() {
        let link = SignalingLink::new(StreamKey::camera(1));
        assert!(!link.send(&SignalMessage::ping("v", "b")));
        assert!(!link.is_open());
    }

    #[tokio::test]
    async fn test_open_send_and_intentional_close() {
        let (connector, mut servers) = FakeConnector::new();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let mut link = SignalingLink::new(StreamKey::camera(1));
        link.open(
            connector,
            "ws://signal".into(),
            Duration::from_secs(1),
            move |event| events_tx.send(event).is_ok(),
        );

        let mut server = servers.recv().await.unwrap();
        match events_rx.recv().await.unwrap() {
            LinkEvent::Opened(outbound) => link.attach(outbound),
            other => panic!("unexpected {:?}", other),
        }

        assert!(link.send(&SignalMessage::ping("v", "b")));
        assert_eq!(server.recv().await, Some(SignalMessage::ping("v", "b")));

        server.send_raw("{\"type\":\"pong\",\"from\":\"b\",\"to\":\"v\"}");
        assert!(matches!(events_rx.recv().await, Some(LinkEvent::Message(_))));

        link.close();
        assert!(link.closed_intentionally());
        assert!(!link.is_open());
        assert_eq!(server.recv().await, None);
    }

    #[tokio::test]
    async fn test_shutdown_releases_transport_before_returning() {
        let (connector, mut servers) = FakeConnector::new();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let mut link = SignalingLink::new(StreamKey::camera(1));
        link.open(
            connector.clone(),
            "ws://signal".into(),
            Duration::from_secs(1),
            move |event| events_tx.send(event).is_ok(),
        );

        let mut server = servers.recv().await.unwrap();
        let Some(LinkEvent::Opened(outbound)) = events_rx.recv().await else {
            panic!("link never opened");
        };
        // A copy of the writer left behind must not keep the transport up
        let stale = outbound.clone();
        link.attach(outbound);
        assert_eq!(connector.open_links(), 1);

        link.shutdown().await;

        assert!(server.is_closed());
        assert!(stale.upgrade().is_none());
        assert_eq!(connector.open_links(), 0);
        assert!(!link.is_active());
    }

    #[tokio::test]
    async fn test_remote_close_is_unexpected() {
        let (connector, mut servers) = FakeConnector::new();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let mut link = SignalingLink::new(StreamKey::camera(1));
        link.open(
            connector,
            "ws://signal".into(),
            Duration::from_secs(1),
            move |event| events_tx.send(event).is_ok(),
        );

        let server = servers.recv().await.unwrap();
        if let Some(LinkEvent::Opened(outbound)) = events_rx.recv().await {
            link.attach(outbound);
        }

        server.close("going away");
        match events_rx.recv().await {
            Some(LinkEvent::Closed(reason)) => assert_eq!(reason.as_deref(), Some("going away")),
            other => panic!("unexpected {:?}", other),
        }
        assert!(link.on_closed());
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported() {
        let (connector, _servers) = FakeConnector::new();
        connector.refuse(true);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let mut link = SignalingLink::new(StreamKey::camera(1));
        link.open(
            connector,
            "ws://signal".into(),
            Duration::from_secs(1),
            move |event| events_tx.send(event).is_ok(),
        );

        assert!(matches!(
            events_rx.recv().await,
            Some(LinkEvent::Failed(Error::Transport(_)))
        ));
    }
}
