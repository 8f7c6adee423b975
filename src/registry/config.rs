//! Registry configuration
//!
//! Timing and retry policy shared by every connection entry of a store.

use std::time::Duration;

/// Reconnection, heartbeat and debounce policy for connection entries
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Base delay for linear reconnect backoff (delay = base * attempt)
    pub reconnect_base_delay: Duration,

    /// Automatic reconnect attempts before giving up
    pub max_reconnect_attempts: u32,

    /// Interval between heartbeat pings
    pub heartbeat_interval: Duration,

    /// Silence after which the signaling link is considered dead
    pub liveness_timeout: Duration,

    /// Debounce applied when the peer session reports `failed`
    pub failed_debounce: Duration,

    /// Debounce applied when the peer session reports `disconnected`
    pub disconnected_debounce: Duration,

    /// Signaling connect must complete within this time
    pub connect_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            reconnect_base_delay: Duration::from_secs(3),
            max_reconnect_attempts: 5,
            heartbeat_interval: Duration::from_secs(10),
            liveness_timeout: Duration::from_secs(30),
            failed_debounce: Duration::from_secs(2),
            disconnected_debounce: Duration::from_secs(3),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl RegistryConfig {
    /// Set the base reconnect delay
    pub fn reconnect_base_delay(mut self, delay: Duration) -> Self {
        self.reconnect_base_delay = delay;
        self
    }

    /// Set the maximum number of automatic reconnect attempts
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Set the heartbeat ping interval
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the liveness timeout
    pub fn liveness_timeout(mut self, timeout: Duration) -> Self {
        self.liveness_timeout = timeout;
        self
    }

    /// Set both peer-state debounce delays
    pub fn debounce(mut self, failed: Duration, disconnected: Duration) -> Self {
        self.failed_debounce = failed;
        self.disconnected_debounce = disconnected;
        self
    }

    /// Set the signaling connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Delay before the given (1-based) reconnect attempt
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.reconnect_base_delay * attempt.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();

        assert_eq!(config.reconnect_base_delay, Duration::from_secs(3));
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(config.liveness_timeout, Duration::from_secs(30));
        assert_eq!(config.failed_debounce, Duration::from_secs(2));
        assert_eq!(config.disconnected_debounce, Duration::from_secs(3));
    }

    #[test]
    fn test_linear_backoff() {
        let config = RegistryConfig::default();

        assert_eq!(config.backoff_delay(1), Duration::from_secs(3));
        assert_eq!(config.backoff_delay(2), Duration::from_secs(6));
        assert_eq!(config.backoff_delay(5), Duration::from_secs(15));
    }

    #[test]
    fn test_builder_chaining() {
        let config = RegistryConfig::default()
            .reconnect_base_delay(Duration::from_millis(100))
            .max_reconnect_attempts(2)
            .heartbeat_interval(Duration::from_secs(1))
            .liveness_timeout(Duration::from_secs(3))
            .debounce(Duration::from_millis(10), Duration::from_millis(20))
            .connect_timeout(Duration::from_secs(1));

        assert_eq!(config.backoff_delay(3), Duration::from_millis(300));
        assert_eq!(config.max_reconnect_attempts, 2);
        assert_eq!(config.failed_debounce, Duration::from_millis(10));
        assert_eq!(config.disconnected_debounce, Duration::from_millis(20));
        assert_eq!(config.connect_timeout, Duration::from_secs(1));
    }
}
