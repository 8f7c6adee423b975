//! Peer sessions
//!
//! The engine traits the media transport plugs into, the adapter that drives
//! them, and local candidate buffering.

pub mod adapter;
pub mod candidate;
pub mod engine;
#[cfg(feature = "webrtc-engine")]
pub mod rtc;

pub use adapter::{MediaHandle, PeerSessionAdapter};
pub use candidate::CandidateBuffer;
pub use engine::{
    IceCandidate, PeerEngine, PeerEvent, PeerEventSender, PeerSession, PeerState, RemoteTrack,
    TrackKind,
};
#[cfg(feature = "webrtc-engine")]
pub use rtc::WebRtcEngine;
