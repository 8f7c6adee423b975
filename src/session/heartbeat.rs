//! Heartbeat monitor
//!
//! A socket can look open while delivering nothing. Once the handshake has
//! completed, the entry pings the broadcaster on every tick and expects pongs;
//! silence longer than the liveness timeout is a transport failure.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{Error, Result};

/// Liveness tracking for one session
#[derive(Debug)]
pub struct HeartbeatMonitor {
    interval: Duration,
    timeout: Duration,
    last_ack: Option<Instant>,
    ticker: Option<JoinHandle<()>>,
}

impl HeartbeatMonitor {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            last_ack: None,
            ticker: None,
        }
    }

    /// Start ticking. `tick` runs every interval until it returns `false` or
    /// the monitor is stopped. The liveness window starts now.
    pub fn start<F>(&mut self, tick: F)
    where
        F: Fn() -> bool + Send + 'static,
    {
        self.stop();
        self.last_ack = Some(Instant::now());

        let interval = self.interval;
        self.ticker = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            loop {
                ticker.tick().await;
                if !tick() {
                    break;
                }
            }
        }));
    }

    /// Stop ticking and forget the last ack
    pub fn stop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        self.last_ack = None;
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    /// A pong arrived
    pub fn record_pong(&mut self) {
        if self.is_running() {
            self.last_ack = Some(Instant::now());
        }
    }

    /// Fail with `LivenessTimeout` if the peer has been silent too long
    pub fn check(&self) -> Result<()> {
        match self.last_ack {
            Some(last) if last.elapsed() > self.timeout => {
                Err(Error::LivenessTimeout(last.elapsed()))
            }
            _ => Ok(()),
        }
    }
}

impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
