//! Per-entry session logic
//!
//! Configuration, the connection state machine, the heartbeat monitor and the
//! actor that ties them together for one stream key.

pub(crate) mod actor;
pub mod config;
pub mod heartbeat;
pub mod state;

pub use config::{IceServer, ViewerId, WebRtcConfig};
pub use heartbeat::HeartbeatMonitor;
pub use state::{ConnectionSnapshot, ConnectionState};
