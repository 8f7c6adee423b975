//! Peer session adapter
//!
//! Wraps the external engine and enforces the negotiation contract: at most
//! one live session, remote offer before local answer, and benign handling of
//! late or duplicate remote candidates. It also folds received tracks into a
//! single outward media handle.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::registry::key::StreamKey;
use crate::session::config::IceServer;

use super::engine::{IceCandidate, PeerEngine, PeerEventSender, PeerSession, RemoteTrack, TrackKind};

/// Media received from the broadcaster for one session
///
/// Every track of a session is attached to the same handle. The handle is
/// cheap to clone; clones share the underlying tracks.
#[derive(Debug, Clone)]
pub struct MediaHandle {
    stream_id: String,
    tracks: Vec<Arc<dyn RemoteTrack>>,
}

impl MediaHandle {
    fn new(track: Arc<dyn RemoteTrack>) -> Self {
        Self {
            stream_id: track.stream_id(),
            tracks: vec![track],
        }
    }

    /// Attach a track, replacing one with the same id
    fn attach(&mut self, track: Arc<dyn RemoteTrack>) {
        let id = track.id();
        match self.tracks.iter_mut().find(|t| t.id() == id) {
            Some(existing) => {
                existing.stop();
                *existing = track;
            }
            None => self.tracks.push(track),
        }
    }

    /// Stream identity taken from the first track
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn tracks(&self) -> &[Arc<dyn RemoteTrack>] {
        &self.tracks
    }

    /// Look up a track by id
    pub fn track(&self, id: &str) -> Option<&Arc<dyn RemoteTrack>> {
        self.tracks.iter().find(|t| t.id() == id)
    }

    /// First video track, if any
    pub fn video(&self) -> Option<&Arc<dyn RemoteTrack>> {
        self.tracks.iter().find(|t| t.kind() == TrackKind::Video)
    }

    /// First audio track, if any
    pub fn audio(&self) -> Option<&Arc<dyn RemoteTrack>> {
        self.tracks.iter().find(|t| t.kind() == TrackKind::Audio)
    }

    fn stop(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

impl PartialEq for MediaHandle {
    fn eq(&self, other: &Self) -> bool {
        self.stream_id == other.stream_id
            && self.tracks.len() == other.tracks.len()
            && self
                .tracks
                .iter()
                .zip(&other.tracks)
                .all(|(a, b)| Arc::ptr_eq(a, b))
    }
}

impl Eq for MediaHandle {}

/// The only caller of the peer-session engine
pub struct PeerSessionAdapter {
    key: StreamKey,
    engine: Arc<dyn PeerEngine>,
    session: Option<Arc<dyn PeerSession>>,
    remote_offer_applied: bool,
    media: Option<MediaHandle>,
}

impl PeerSessionAdapter {
    pub fn new(key: StreamKey, engine: Arc<dyn PeerEngine>) -> Self {
        Self {
            key,
            engine,
            session: None,
            remote_offer_applied: false,
            media: None,
        }
    }

    /// Create a fresh session, closing the current one first
    pub async fn create(&mut self, ice_servers: &[IceServer], events: PeerEventSender) -> Result<()> {
        self.close().await;

        let session = self.engine.create_session(ice_servers, events).await?;
        self.session = Some(session);

        tracing::debug!(
            stream = %self.key,
            ice_servers = ice_servers.len(),
            "Peer session created"
        );
        Ok(())
    }

    /// Apply the broadcaster's offer
    pub async fn set_remote_offer(&mut self, sdp: &str) -> Result<()> {
        let session = self.active()?;
        session.set_remote_description(sdp).await?;
        self.remote_offer_applied = true;
        Ok(())
    }

    /// Create our answer and apply it locally. Returns the answer SDP.
    pub async fn create_and_set_local_answer(&mut self) -> Result<String> {
        if !self.remote_offer_applied {
            return Err(Error::Session(
                "answer requested before the remote offer was applied".into(),
            ));
        }

        let session = self.active()?;
        let answer = session.create_answer().await?;
        session.set_local_description(&answer).await?;
        Ok(answer)
    }

    /// Hand a remote candidate to the engine.
    ///
    /// Engine errors here are routine (duplicates, candidates for a torn-down
    /// generation) and are only logged.
    pub async fn add_remote_candidate(&self, candidate: Option<IceCandidate>) {
        let Some(session) = self.session.as_ref() else {
            tracing::debug!(stream = %self.key, "Dropping remote candidate, no session");
            return;
        };

        let end_of_candidates = candidate.is_none();
        if let Err(e) = session.add_ice_candidate(candidate).await {
            tracing::debug!(
                stream = %self.key,
                error = %e,
                end_of_candidates,
                "Ignoring remote candidate error"
            );
        }
    }

    /// Fold a newly received track into the session's media handle
    pub fn on_track(&mut self, track: Arc<dyn RemoteTrack>) {
        tracing::info!(
            stream = %self.key,
            track = %track.id(),
            media_stream = %track.stream_id(),
            kind = ?track.kind(),
            "Remote track received"
        );

        match &mut self.media {
            Some(media) => media.attach(track),
            slot @ None => *slot = Some(MediaHandle::new(track)),
        }
    }

    pub fn media(&self) -> Option<&MediaHandle> {
        self.media.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn has_remote_offer(&self) -> bool {
        self.remote_offer_applied
    }

    /// Stop all tracks and close the session
    pub async fn close(&mut self) {
        if let Some(media) = self.media.take() {
            media.stop();
        }
        self.remote_offer_applied = false;

        if let Some(session) = self.session.take() {
            if let Err(e) = session.close().await {
                tracing::debug!(stream = %self.key, error = %e, "Peer session close failed");
            }
            tracing::debug!(stream = %self.key, "Peer session closed");
        }
    }

    fn active(&self) -> Result<Arc<dyn PeerSession>> {
        self.session
            .clone()
            .ok_or_else(|| Error::Session("no active peer session".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeEngine, FakeTrack};
    use tokio::sync::mpsc;

    fn adapter(engine: &Arc<FakeEngine>) -> PeerSessionAdapter {
        PeerSessionAdapter::new(StreamKey::camera(1), engine.clone())
    }

    #[tokio::test]
    async fn test_answer_requires_remote_offer() {
        let (engine, _sessions) = FakeEngine::new();
        let mut adapter = adapter(&engine);
        let (tx, _rx) = mpsc::unbounded_channel();

        adapter.create(&[], tx).await.unwrap();
        let result = adapter.create_and_set_local_answer().await;
        assert!(matches!(result, Err(Error::Session(_))));

        adapter.set_remote_offer("offer-sdp").await.unwrap();
        let answer = adapter.create_and_set_local_answer().await.unwrap();
        assert_eq!(answer, "answer-to:offer-sdp");
        assert_eq!(
            engine.calls(),
            vec!["create#1", "remote#1:offer-sdp", "answer#1", "local#1:answer-to:offer-sdp"]
        );
    }

    #[tokio::test]
    async fn test_create_closes_previous_session() {
        let (engine, _sessions) = FakeEngine::new();
        let mut adapter = adapter(&engine);

        let (tx, _rx) = mpsc::unbounded_channel();
        adapter.create(&[], tx.clone()).await.unwrap();
        adapter.create(&[], tx).await.unwrap();

        assert_eq!(engine.calls(), vec!["create#1", "close#1", "create#2"]);
        assert_eq!(engine.live_sessions(), 1);

        adapter.close().await;
        assert_eq!(engine.live_sessions(), 0);
    }

    #[tokio::test]
    async fn test_remote_candidate_errors_are_swallowed() {
        let (engine, _sessions) = FakeEngine::new();
        engine.reject_candidates(true);
        let mut adapter = adapter(&engine);
        let (tx, _rx) = mpsc::unbounded_channel();

        adapter.create(&[], tx).await.unwrap();
        adapter.add_remote_candidate(Some(IceCandidate::new("candidate:dup"))).await;
        adapter.add_remote_candidate(None).await;
        assert!(adapter.is_active());
    }

    #[tokio::test]
    async fn test_tracks_merge_into_one_handle() {
        let (engine, _sessions) = FakeEngine::new();
        let mut adapter = adapter(&engine);

        let video = FakeTrack::video("v0", "cam");
        let audio = FakeTrack::audio("a0", "cam");

        adapter.on_track(video.clone());
        assert_eq!(adapter.media().unwrap().tracks().len(), 1);

        adapter.on_track(audio.clone());
        let merged = adapter.media().unwrap().clone();
        assert_eq!(merged.stream_id(), "cam");
        assert_eq!(merged.tracks().len(), 2);
        assert!(merged.video().is_some());
        assert!(merged.audio().is_some());

        // Same id replaces rather than duplicates
        let replacement = FakeTrack::video("v0", "cam");
        adapter.on_track(replacement.clone());
        assert_eq!(adapter.media().unwrap().tracks().len(), 2);
        assert!(video.is_stopped());
        assert_ne!(adapter.media(), Some(&merged));

        adapter.close().await;
        assert!(adapter.media().is_none());
        assert!(replacement.is_stopped());
        assert!(audio.is_stopped());
    }
}
