//! Peer-session engine interface
//!
//! The media transport itself (SDP negotiation, ICE, DTLS/SRTP, decoding) is
//! supplied from outside the crate. Only `PeerSessionAdapter` calls into it.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::session::config::IceServer;

/// ICE candidate in its browser JSON shape (`RTCIceCandidateInit`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,

    #[serde(default, rename = "sdpMLineIndex", skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    /// Candidate with only the SDP attribute line set
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_mline_index: None,
            username_fragment: None,
        }
    }

    /// Set the media stream identification tag
    pub fn with_mid(mut self, mid: impl Into<String>, mline_index: u16) -> Self {
        self.sdp_mid = Some(mid.into());
        self.sdp_mline_index = Some(mline_index);
        self
    }
}

/// Connection state reported by the peer session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    New,
    Connecting,
    Connected,
    /// ICE finished checking all candidate pairs
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl std::fmt::Display for PeerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PeerState::New => "new",
            PeerState::Connecting => "connecting",
            PeerState::Connected => "connected",
            PeerState::Completed => "completed",
            PeerState::Disconnected => "disconnected",
            PeerState::Failed => "failed",
            PeerState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Kind of a received media track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// A remote media track produced by the engine
pub trait RemoteTrack: Send + Sync + std::fmt::Debug {
    /// Track identity, unique within a session
    fn id(&self) -> String;

    /// Logical media stream the track belongs to
    fn stream_id(&self) -> String;

    fn kind(&self) -> TrackKind;

    /// Stop delivering media. Called when the session is torn down.
    fn stop(&self) {}

    /// Access the engine-specific track type
    fn as_any(&self) -> &dyn Any;
}

/// Events emitted by a peer session
#[derive(Debug)]
pub enum PeerEvent {
    /// Locally gathered candidate; `None` means gathering is complete
    LocalCandidate(Option<IceCandidate>),
    /// A remote track started
    Track(Arc<dyn RemoteTrack>),
    /// Connection state changed
    StateChange(PeerState),
}

/// Channel on which an engine reports session events
pub type PeerEventSender = mpsc::UnboundedSender<PeerEvent>;

/// One negotiated (or negotiating) peer session
#[async_trait]
pub trait PeerSession: Send + Sync {
    /// Apply the remote offer
    async fn set_remote_description(&self, offer_sdp: &str) -> Result<()>;

    /// Create an answer for the applied offer
    async fn create_answer(&self) -> Result<String>;

    /// Apply our own answer
    async fn set_local_description(&self, answer_sdp: &str) -> Result<()>;

    /// Add a remote candidate; `None` signals end-of-candidates
    async fn add_ice_candidate(&self, candidate: Option<IceCandidate>) -> Result<()>;

    /// Release the session. Must be idempotent.
    async fn close(&self) -> Result<()>;
}

/// Factory for peer sessions
#[async_trait]
pub trait PeerEngine: Send + Sync + 'static {
    /// Create a new session. Events for it must be sent on `events`.
    async fn create_session(
        &self,
        ice_servers: &[IceServer],
        events: PeerEventSender,
    ) -> Result<Arc<dyn PeerSession>>;
}
