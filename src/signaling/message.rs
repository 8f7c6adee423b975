//! Signaling wire protocol
//!
//! Textual JSON messages exchanged with the signaling server, discriminated
//! by a `type` field:
//!
//! | type            | fields                    |
//! |-----------------|---------------------------|
//! | `offer`         | `from`, `sdp`             |
//! | `answer`        | `from`, `to`, `sdp`       |
//! | `ice`           | `from`, `to`, `candidate` |
//! | `ping` / `pong` | `from`, `to`              |
//!
//! An `ice` message whose candidate is `{}` marks end-of-candidates.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::peer::engine::IceCandidate;

/// A signaling message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalMessage {
    /// Broadcaster proposes a session
    Offer {
        from: String,
        sdp: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
    },

    /// Our response to an offer
    Answer { from: String, to: String, sdp: String },

    /// Trickled ICE candidate, either direction
    Ice {
        from: String,
        #[serde(default)]
        to: String,
        #[serde(with = "end_of_candidates")]
        candidate: Option<IceCandidate>,
    },

    /// Liveness probe
    Ping {
        from: String,
        #[serde(default)]
        to: String,
    },

    /// Liveness response
    Pong {
        from: String,
        #[serde(default)]
        to: String,
    },

    /// Any `type` this client does not understand
    #[serde(other)]
    Unknown,
}

impl SignalMessage {
    pub fn answer(from: impl Into<String>, to: impl Into<String>, sdp: impl Into<String>) -> Self {
        SignalMessage::Answer {
            from: from.into(),
            to: to.into(),
            sdp: sdp.into(),
        }
    }

    pub fn ice(
        from: impl Into<String>,
        to: impl Into<String>,
        candidate: Option<IceCandidate>,
    ) -> Self {
        SignalMessage::Ice {
            from: from.into(),
            to: to.into(),
            candidate,
        }
    }

    pub fn ping(from: impl Into<String>, to: impl Into<String>) -> Self {
        SignalMessage::Ping {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn pong(from: impl Into<String>, to: impl Into<String>) -> Self {
        SignalMessage::Pong {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Decode a text frame
    pub fn decode(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Encode as a text frame
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Wire name of the message type
    pub fn kind(&self) -> &'static str {
        match self {
            SignalMessage::Offer { .. } => "offer",
            SignalMessage::Answer { .. } => "answer",
            SignalMessage::Ice { .. } => "ice",
            SignalMessage::Ping { .. } => "ping",
            SignalMessage::Pong { .. } => "pong",
            SignalMessage::Unknown => "unknown",
        }
    }

    /// Sender identity, if the message carries one
    pub fn sender(&self) -> Option<&str> {
        match self {
            SignalMessage::Offer { from, .. }
            | SignalMessage::Answer { from, .. }
            | SignalMessage::Ice { from, .. }
            | SignalMessage::Ping { from, .. }
            | SignalMessage::Pong { from, .. } => Some(from),
            SignalMessage::Unknown => None,
        }
    }

    /// Addressee, if the message names one
    pub fn recipient(&self) -> Option<&str> {
        let to = match self {
            SignalMessage::Offer { to, .. } => to.as_deref(),
            SignalMessage::Answer { to, .. }
            | SignalMessage::Ice { to, .. }
            | SignalMessage::Ping { to, .. }
            | SignalMessage::Pong { to, .. } => Some(to.as_str()),
            SignalMessage::Unknown => None,
        };
        to.filter(|to| !to.is_empty())
    }
}

/// `None` travels as `{}`; `{}`, `null` and an empty candidate line all decode to `None`.
mod end_of_candidates {
    use serde::de::Error as _;
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value;

    use crate::peer::engine::IceCandidate;

    pub fn serialize<S>(candidate: &Option<IceCandidate>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match candidate {
            Some(candidate) => candidate.serialize(serializer),
            None => serializer.serialize_map(Some(0))?.end(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<IceCandidate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(map)) if map.is_empty() => Ok(None),
            Some(value) => {
                let candidate: IceCandidate =
                    serde_json::from_value(value).map_err(D::Error::custom)?;
                if candidate.candidate.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(candidate))
                }
            }
        }
    }
}
