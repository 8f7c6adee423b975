//! Peer engine over `webrtc-rs`
//!
//! Receive-only sessions: the broadcaster's offer decides which audio and
//! video transceivers exist, and remote tracks are surfaced as they start.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_remote::TrackRemote;

use crate::error::{Error, Result};
use crate::session::config::IceServer;

use super::engine::{
    IceCandidate, PeerEngine, PeerEvent, PeerEventSender, PeerSession, PeerState, RemoteTrack,
    TrackKind,
};

fn session_error(context: &str, err: webrtc::Error) -> Error {
    Error::Session(format!("{}: {}", context, err))
}

/// `PeerEngine` backed by `webrtc-rs`
pub struct WebRtcEngine {
    api: API,
}

impl WebRtcEngine {
    /// Build an engine with the default codecs and interceptors
    pub fn new() -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| session_error("register codecs", e))?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(|e| session_error("register interceptors", e))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self { api })
    }
}

#[async_trait]
impl PeerEngine for WebRtcEngine {
    async fn create_session(
        &self,
        ice_servers: &[IceServer],
        events: PeerEventSender,
    ) -> Result<Arc<dyn PeerSession>> {
        let config = RTCConfiguration {
            ice_servers: ice_servers
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone().unwrap_or_default(),
                    credential: server.credential.clone().unwrap_or_default(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };

        let pc = Arc::new(
            self.api
                .new_peer_connection(config)
                .await
                .map_err(|e| session_error("create peer connection", e))?,
        );

        let tx = events.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let tx = tx.clone();
            Box::pin(async move {
                let candidate = match candidate.map(|c| c.to_json()).transpose() {
                    Ok(init) => init.map(|init| IceCandidate {
                        candidate: init.candidate,
                        sdp_mid: init.sdp_mid,
                        sdp_mline_index: init.sdp_mline_index,
                        username_fragment: init.username_fragment,
                    }),
                    Err(e) => {
                        tracing::debug!(error = %e, "Dropping unserializable local candidate");
                        return;
                    }
                };
                let _ = tx.send(PeerEvent::LocalCandidate(candidate));
            })
        }));

        let tx = events.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let state = match state {
                RTCPeerConnectionState::New | RTCPeerConnectionState::Unspecified => PeerState::New,
                RTCPeerConnectionState::Connecting => PeerState::Connecting,
                RTCPeerConnectionState::Connected => PeerState::Connected,
                RTCPeerConnectionState::Disconnected => PeerState::Disconnected,
                RTCPeerConnectionState::Failed => PeerState::Failed,
                RTCPeerConnectionState::Closed => PeerState::Closed,
            };
            let _ = tx.send(PeerEvent::StateChange(state));
            Box::pin(async {})
        }));

        let tx = events;
        pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let _ = tx.send(PeerEvent::Track(Arc::new(RtcTrack(track))));
                Box::pin(async {})
            },
        ));

        Ok(Arc::new(RtcSession { pc }))
    }
}

/// One `RTCPeerConnection`
pub struct RtcSession {
    pc: Arc<RTCPeerConnection>,
}

impl RtcSession {
    /// Underlying peer connection, e.g. for stats
    pub fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.pc
    }
}

#[async_trait]
impl PeerSession for RtcSession {
    async fn set_remote_description(&self, offer_sdp: &str) -> Result<()> {
        let offer = RTCSessionDescription::offer(offer_sdp.to_string())
            .map_err(|e| session_error("parse offer", e))?;
        self.pc
            .set_remote_description(offer)
            .await
            .map_err(|e| session_error("apply offer", e))
    }

    async fn create_answer(&self) -> Result<String> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| session_error("create answer", e))?;
        Ok(answer.sdp)
    }

    async fn set_local_description(&self, answer_sdp: &str) -> Result<()> {
        let answer = RTCSessionDescription::answer(answer_sdp.to_string())
            .map_err(|e| session_error("parse answer", e))?;
        self.pc
            .set_local_description(answer)
            .await
            .map_err(|e| session_error("apply answer", e))
    }

    async fn add_ice_candidate(&self, candidate: Option<IceCandidate>) -> Result<()> {
        // An empty candidate line is end-of-candidates
        let init = match candidate {
            Some(c) => RTCIceCandidateInit {
                candidate: c.candidate,
                sdp_mid: c.sdp_mid,
                sdp_mline_index: c.sdp_mline_index,
                username_fragment: c.username_fragment,
            },
            None => RTCIceCandidateInit::default(),
        };
        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| session_error("add candidate", e))
    }

    async fn close(&self) -> Result<()> {
        self.pc
            .close()
            .await
            .map_err(|e| session_error("close", e))
    }
}

/// Remote track received by an `RtcSession`
#[derive(Debug)]
pub struct RtcTrack(pub Arc<TrackRemote>);

impl RemoteTrack for RtcTrack {
    fn id(&self) -> String {
        self.0.id()
    }

    fn stream_id(&self) -> String {
        self.0.stream_id()
    }

    fn kind(&self) -> TrackKind {
        match self.0.kind() {
            RTPCodecType::Audio => TrackKind::Audio,
            _ => TrackKind::Video,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
