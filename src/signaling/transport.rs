//! Signaling transport
//!
//! A connector turns a URL into a duplex text channel. The built-in
//! `WebSocketConnector` runs the socket on two tasks: a writer draining the
//! outbound queue and a reader reporting frames, close and errors.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::error::Result;

/// Event read from a signaling channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Text frame
    Text(String),
    /// Peer closed the channel, with a reason if one was given
    Closed(Option<String>),
    /// Channel failed
    Error(String),
}

/// An open duplex text channel
///
/// Dropping `outbound` closes the channel gracefully.
#[derive(Debug)]
pub struct SignalingChannel {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<ChannelEvent>,
}

/// Opens signaling channels
#[async_trait]
pub trait SignalingConnector: Send + Sync + 'static {
    /// Connect to `url`. Returns once the channel is writable.
    async fn connect(&self, url: &str) -> Result<SignalingChannel>;
}

/// WebSocket connector over `tokio-tungstenite`
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl SignalingConnector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<SignalingChannel> {
        let (ws_stream, _) = connect_async(url).await?;
        let (mut write, mut read) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        let writer_events = in_tx.clone();
        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if let Err(e) = write.send(Message::Text(text)).await {
                    let _ = writer_events.send(ChannelEvent::Error(e.to_string()));
                    return;
                }
            }

            // Every sender is gone: the owner closed the link
            if let Err(e) = write.close().await {
                tracing::debug!(error = %e, "WebSocket close handshake failed");
            }
        });

        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if in_tx.send(ChannelEvent::Text(text)).is_err() {
                            return;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        let reason =
                            frame.map(|f| format!("{} {}", u16::from(f.code), f.reason));
                        let _ = in_tx.send(ChannelEvent::Closed(reason));
                        return;
                    }
                    Ok(Message::Binary(data)) => {
                        tracing::debug!(len = data.len(), "Ignoring binary signaling frame");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let _ = in_tx.send(ChannelEvent::Error(e.to_string()));
                        return;
                    }
                }
            }

            let _ = in_tx.send(ChannelEvent::Closed(None));
        });

        Ok(SignalingChannel {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}
