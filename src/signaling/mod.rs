//! Signaling
//!
//! JSON messages over a duplex text channel, one link per stream key.

pub mod link;
pub mod message;
pub mod transport;

pub use link::{LinkEvent, SignalingLink};
pub use message::SignalMessage;
pub use transport::{ChannelEvent, SignalingChannel, SignalingConnector, WebSocketConnector};
