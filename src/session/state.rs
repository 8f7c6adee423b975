//! Connection state machine
//!
//! Tracks the observable state of one connection entry, from first open
//! through recovery and teardown.

use crate::error::Error;
use crate::peer::adapter::MediaHandle;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not started, or explicitly torn down
    #[default]
    Idle,
    /// Signaling link opening or negotiation in progress
    Connecting,
    /// Peer session established
    Connected,
    /// Transport lost or peer session disconnected, recovery pending
    Disconnected,
    /// Negotiation or peer session failed; terminal once retries are exhausted
    Failed,
}

impl ConnectionState {
    /// Whether media is (or may soon be) flowing
    pub fn is_live(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What subscribers observe about a connection
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,
    /// Media of the current session, once a track has arrived
    pub media: Option<MediaHandle>,
    /// Human-readable description of the last failure
    pub error: Option<String>,
    pub reconnect_attempts: u32,
}

/// Mutable state of one entry, owned by its actor
#[derive(Debug, Default)]
pub struct EntryState {
    pub state: ConnectionState,
    pub error: Option<String>,

    /// Reconnects scheduled since the last successful link open
    pub reconnect_attempts: u32,

    /// Automatic recovery stopped; only an explicit reconnect resumes
    pub retries_exhausted: bool,
}

impl EntryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new link/session pair is being set up
    pub fn begin_connecting(&mut self) {
        self.state = ConnectionState::Connecting;
    }

    /// The signaling link opened; the retry budget starts over
    pub fn link_opened(&mut self) {
        self.state = ConnectionState::Connecting;
        self.reconnect_attempts = 0;
    }

    pub fn session_connected(&mut self) {
        self.state = ConnectionState::Connected;
        self.error = None;
    }

    /// Move to `Disconnected` or `Failed` with a reason
    pub fn degrade(&mut self, state: ConnectionState, reason: impl Into<String>) {
        debug_assert!(matches!(
            state,
            ConnectionState::Disconnected | ConnectionState::Failed
        ));
        self.state = state;
        self.error = Some(reason.into());
    }

    /// Stop automatic recovery for good
    pub fn exhaust(&mut self, error: &Error) {
        self.state = ConnectionState::Failed;
        self.error = Some(error.to_string());
        self.retries_exhausted = true;
    }

    /// Restore the retry budget after an explicit request
    pub fn reset_retries(&mut self) {
        self.reconnect_attempts = 0;
        self.retries_exhausted = false;
    }

    /// Back to `Idle` with nothing remembered
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn snapshot(&self, media: Option<MediaHandle>) -> ConnectionSnapshot {
        ConnectionSnapshot {
            state: self.state,
            media,
            error: self.error.clone(),
            reconnect_attempts: self.reconnect_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_open_resets_attempts() {
        let mut state = EntryState::new();
        state.begin_connecting();
        state.reconnect_attempts = 3;
        state.degrade(ConnectionState::Disconnected, "socket reset");

        state.link_opened();
        assert_eq!(state.state, ConnectionState::Connecting);
        assert_eq!(state.reconnect_attempts, 0);
        // The last error stays visible until the session connects
        assert_eq!(state.error.as_deref(), Some("socket reset"));

        state.session_connected();
        assert_eq!(state.error, None);
    }

    #[test]
    fn test_exhaust_is_sticky_until_reset() {
        let mut state = EntryState::new();
        state.reconnect_attempts = 5;
        state.exhaust(&Error::MaxRetriesExceeded(5));

        let snapshot = state.snapshot(None);
        assert_eq!(snapshot.state, ConnectionState::Failed);
        assert_eq!(
            snapshot.error.as_deref(),
            Some("Gave up reconnecting after 5 attempts")
        );
        assert!(state.retries_exhausted);

        state.reset_retries();
        assert!(!state.retries_exhausted);
        assert_eq!(state.reconnect_attempts, 0);
        assert_eq!(state.state, ConnectionState::Failed);

        state.reset();
        assert_eq!(state.state, ConnectionState::Idle);
        assert_eq!(state.error, None);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        assert!(ConnectionState::Connected.is_live());
        assert!(!ConnectionState::Failed.is_live());
    }
}
