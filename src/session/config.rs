//! Connection configuration
//!
//! `WebRtcConfig` is the immutable per-connection input: where to signal,
//! who we are, and which ICE servers the peer session may use.

use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// ICE (STUN/TURN) server descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceServer {
    /// One or more server URLs (`stun:` / `turn:` / `turns:`)
    #[serde(deserialize_with = "one_or_many")]
    pub urls: Vec<String>,

    /// TURN username
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// TURN credential
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    /// Server reachable at a single URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }

    /// Server reachable at several URLs
    pub fn with_urls<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            urls: urls.into_iter().map(Into::into).collect(),
            username: None,
            credential: None,
        }
    }

    /// Attach a TURN credential pair
    pub fn credentials(mut self, username: impl Into<String>, credential: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.credential = Some(credential.into());
        self
    }
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(url) => vec![url],
        OneOrMany::Many(urls) => urls,
    })
}

/// Parsed viewer identity: `viewer:<user>:<camera>:<agent>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerId {
    pub user: String,
    pub camera: String,
    /// Empty for plain camera streams
    pub agent: String,
}

impl ViewerId {
    /// Parse and validate a viewer identity string.
    ///
    /// Malformed identities are rejected, never repaired.
    pub fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.split(':').collect();
        match parts.as_slice() {
            ["viewer", user, camera, agent] if !user.is_empty() && !camera.is_empty() => {
                Ok(Self {
                    user: (*user).to_string(),
                    camera: (*camera).to_string(),
                    agent: (*agent).to_string(),
                })
            }
            _ => Err(Error::ConfigInvalid(format!(
                "viewer id {:?} is not of the form viewer:<user>:<camera>:<agent>",
                raw
            ))),
        }
    }
}

impl std::fmt::Display for ViewerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "viewer:{}:{}:{}", self.user, self.camera, self.agent)
    }
}

/// Per-connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebRtcConfig {
    /// WebSocket signaling endpoint (`ws://` or `wss://`)
    pub signaling_url: String,

    /// Local viewer identity, used as `from` on every outbound message
    pub viewer_id: String,

    /// ICE servers in preference order
    #[serde(default)]
    pub ice_servers: Vec<IceServer>,
}

impl WebRtcConfig {
    /// Create a config without ICE servers
    pub fn new(signaling_url: impl Into<String>, viewer_id: impl Into<String>) -> Self {
        Self {
            signaling_url: signaling_url.into(),
            viewer_id: viewer_id.into(),
            ice_servers: Vec::new(),
        }
    }

    /// Append an ICE server
    pub fn ice_server(mut self, server: IceServer) -> Self {
        self.ice_servers.push(server);
        self
    }

    /// Parse a config from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::ConfigInvalid(e.to_string()))
    }

    /// Check that every required field is present and well formed
    pub fn validate(&self) -> Result<()> {
        if self.signaling_url.is_empty() {
            return Err(Error::ConfigInvalid("signaling url is empty".into()));
        }

        let url = Url::parse(&self.signaling_url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::ConfigInvalid(format!(
                "signaling url must use ws:// or wss://, got {}://",
                url.scheme()
            )));
        }

        ViewerId::parse(&self.viewer_id)?;

        for server in &self.ice_servers {
            if server.urls.is_empty() || server.urls.iter().any(|u| u.is_empty()) {
                return Err(Error::ConfigInvalid("ICE server without a URL".into()));
            }
        }

        Ok(())
    }

    /// Whether switching to `other` requires tearing down a live connection
    pub fn differs_materially(&self, other: &WebRtcConfig) -> bool {
        self.viewer_id != other.viewer_id || self.signaling_url != other.signaling_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> WebRtcConfig {
        WebRtcConfig::new("ws://signal.local/ws", "viewer:alice:cam1:agent1")
            .ice_server(IceServer::new("stun:stun.l.google.com:19302"))
    }

    #[test]
    fn test_valid_config() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_scheme() {
        let mut cfg = config();
        cfg.signaling_url = "http://signal.local/ws".into();
        assert!(matches!(cfg.validate(), Err(Error::ConfigInvalid(_))));
    }

    #[test]
    fn test_rejects_three_part_viewer_id() {
        let mut cfg = config();
        cfg.viewer_id = "viewer:alice:agent1".into();
        assert!(matches!(cfg.validate(), Err(Error::ConfigInvalid(_))));

        assert!(ViewerId::parse("viewer:alice:cam1:").is_ok());
        assert!(ViewerId::parse("watcher:alice:cam1:agent1").is_err());
        assert!(ViewerId::parse("viewer::cam1:agent1").is_err());
    }

    #[test]
    fn test_viewer_id_round_trip() {
        let id = ViewerId::parse("viewer:alice:cam1:agent1").unwrap();
        assert_eq!(id.camera, "cam1");
        assert_eq!(id.to_string(), "viewer:alice:cam1:agent1");
    }

    #[test]
    fn test_material_difference() {
        let base = config();

        let mut other = base.clone();
        other.ice_servers.clear();
        assert!(!base.differs_materially(&other));

        other.viewer_id = "viewer:bob:cam1:agent1".into();
        assert!(base.differs_materially(&other));

        let mut other = base.clone();
        other.signaling_url = "wss://elsewhere/ws".into();
        assert!(base.differs_materially(&other));
    }

    #[test]
    fn test_from_json_accepts_single_or_many_urls() {
        let cfg = WebRtcConfig::from_json(
            r#"{
                "signalingUrl": "wss://signal.local/ws",
                "viewerId": "viewer:alice:cam1:agent1",
                "iceServers": [
                    {"urls": "stun:stun.example.org"},
                    {"urls": ["turn:a.example.org", "turns:b.example.org"],
                     "username": "u", "credential": "p"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(cfg.ice_servers.len(), 2);
        assert_eq!(cfg.ice_servers[0].urls, vec!["stun:stun.example.org"]);
        assert_eq!(cfg.ice_servers[1].urls.len(), 2);
        assert_eq!(cfg.ice_servers[1].username.as_deref(), Some("u"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_from_json_missing_field() {
        let result = WebRtcConfig::from_json(r#"{"signalingUrl": "ws://s"}"#);
        assert!(matches!(result, Err(Error::ConfigInvalid(_))));
    }
}
