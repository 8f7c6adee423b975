//! Error types
//!
//! Every collaborator failure is converted into one of these variants at the
//! point where the collaborator is called. Consumers only ever observe them as
//! state transitions plus a human-readable message.

use std::time::Duration;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for connection management
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Required configuration is missing or malformed
    ConfigInvalid(String),
    /// Signaling socket failed or closed unexpectedly
    Transport(String),
    /// Peer session negotiation failed
    Session(String),
    /// No pong received within the liveness window
    LivenessTimeout(Duration),
    /// Automatic reconnection gave up after this many attempts
    MaxRetriesExceeded(u32),
    /// A signaling frame could not be decoded
    Protocol(String),
    /// The connection entry has been shut down
    Closed,
}

impl Error {
    /// Whether this error should be retried with transport backoff
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::LivenessTimeout(_))
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::ConfigInvalid(reason) => write!(f, "Invalid configuration: {}", reason),
            Error::Transport(reason) => write!(f, "Signaling transport error: {}", reason),
            Error::Session(reason) => write!(f, "Session negotiation failed: {}", reason),
            Error::LivenessTimeout(elapsed) => {
                write!(f, "No heartbeat response for {}s", elapsed.as_secs())
            }
            Error::MaxRetriesExceeded(attempts) => {
                write!(f, "Gave up reconnecting after {} attempts", attempts)
            }
            Error::Protocol(reason) => write!(f, "Malformed signaling message: {}", reason),
            Error::Closed => write!(f, "Connection closed"),
        }
    }
}

impl std::error::Error for Error {}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Protocol(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::ConfigInvalid(format!("signaling url: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_liveness_counts_as_transport() {
        assert!(Error::LivenessTimeout(Duration::from_secs(31)).is_transport());
        assert!(Error::Transport("reset".into()).is_transport());
        assert!(!Error::Session("bad sdp".into()).is_transport());
    }

    #[test]
    fn test_display_is_human_readable() {
        assert_eq!(
            Error::MaxRetriesExceeded(5).to_string(),
            "Gave up reconnecting after 5 attempts"
        );
        assert_eq!(
            Error::LivenessTimeout(Duration::from_secs(30)).to_string(),
            "No heartbeat response for 30s"
        );
    }
}
