//! Statistics for viewer connections

use std::time::{Duration, Instant};

/// Per-entry counters
#[derive(Debug, Clone, Default)]
pub struct ConnectionStats {
    /// Link/session pairs set up, first connect included
    pub sessions_started: u64,
    /// Automatic reconnects scheduled
    pub reconnects_scheduled: u64,
    /// Signaling messages written to the link
    pub messages_sent: u64,
    /// Text frames read from the link
    pub messages_received: u64,
    /// Local candidates sent, flushed ones included
    pub candidates_sent: u64,
    /// Local candidates that waited in the buffer for the remote id
    pub candidates_flushed: u64,
    pub pings_sent: u64,
    pub pongs_received: u64,
    /// Last time the peer session reached connected
    pub last_connected_at: Option<Instant>,
}

impl ConnectionStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Time since the peer session last connected
    pub fn since_connected(&self) -> Option<Duration> {
        self.last_connected_at.map(|at| at.elapsed())
    }

    /// Share of pings that were answered, if any were sent
    pub fn pong_ratio(&self) -> Option<f64> {
        if self.pings_sent == 0 {
            return None;
        }
        Some(self.pongs_received as f64 / self.pings_sent as f64)
    }
}
