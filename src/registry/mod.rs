//! Connection registry
//!
//! The registry owns one connection entry per stream key and hands out
//! handles to any number of consumers. Each entry runs as an actor task; the
//! store only inserts, removes and forwards commands.
//!
//! # Architecture
//!
//! ```text
//!                          ConnectionStore
//!                     ┌─────────────────────────┐
//!                     │ entries: HashMap<Key,   │
//!                     │   ConnectionEntry {     │
//!                     │     commands: mpsc::Tx, │
//!                     │     hub,                │
//!                     │   }                     │
//!                     │ >                       │
//!                     └───────────┬─────────────┘
//!                                 │ EntryCommand
//!                                 ▼
//!                            [EntryActor]
//!             ┌───────────────────┼───────────────────┐
//!             │                   │                   │
//!       SignalingLink     PeerSessionAdapter   HeartbeatMonitor
//!        (WebSocket)       (PeerEngine)          (ping/pong)
//!             │                   │                   │
//!             └──► LinkEvent / PeerEvent / timers ──► actor queue
//!                                 │
//!                                 ▼
//!                         SubscriptionHub ──► subscribers, watch()
//! ```
//!
//! # Ownership
//!
//! Consumers hold `ConnectionHandle`s, which never keep a connection alive
//! on their own. An entry goes away only through `release` (non-persistent
//! entries), `close` or `dispose_all`.

pub mod config;
pub mod entry;
pub mod hub;
pub mod key;
pub mod store;

pub use config::RegistryConfig;
pub use entry::ConnectionHandle;
pub use hub::{Subscription, SubscriptionHub};
pub use key::StreamKey;
pub use store::ConnectionStore;
