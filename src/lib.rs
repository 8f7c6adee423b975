//! viewlink
//!
//! Persistent viewer connections for real-time video. Each stream key gets
//! exactly one signaling link and one peer session, shared by any number of
//! observers. The crate drives the offer/answer/ICE exchange over a JSON
//! WebSocket protocol, keeps the link honest with a ping/pong heartbeat and
//! recovers from failures with bounded linear backoff.
//!
//! The media transport is supplied through the [`PeerEngine`] trait. With the
//! `webrtc-engine` feature, `peer::rtc::WebRtcEngine` implements it over
//! `webrtc-rs`.
//!
//! # Example
//!
//! ```no_run
//! # use std::sync::Arc;
//! # async fn run(engine: Arc<dyn viewlink::PeerEngine>) -> viewlink::Result<()> {
//! use viewlink::{ConnectionStore, IceServer, StreamKey, WebRtcConfig};
//!
//! let store = ConnectionStore::new(engine);
//! let config = WebRtcConfig::new("wss://signal.example.com/ws", "viewer:alice:42:")
//!     .ice_server(IceServer::new("stun:stun.l.google.com:19302"));
//!
//! let handle = store.acquire(StreamKey::camera(42), config, false).await?;
//! let _subscription = handle.subscribe(|snapshot| {
//!     println!("camera 42 is {}", snapshot.state);
//! });
//!
//! // ...
//! store.release(&StreamKey::camera(42)).await;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod peer;
pub mod registry;
pub mod session;
pub mod signaling;
pub mod stats;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};
pub use peer::{IceCandidate, MediaHandle, PeerEngine, PeerEvent, PeerSession, PeerState, RemoteTrack};
pub use registry::{ConnectionHandle, ConnectionStore, RegistryConfig, StreamKey, Subscription};
pub use session::{ConnectionSnapshot, ConnectionState, IceServer, WebRtcConfig};
pub use signaling::{SignalMessage, SignalingConnector, WebSocketConnector};
pub use stats::ConnectionStats;
