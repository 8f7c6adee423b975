//! Local ICE candidate buffering
//!
//! Candidates can be gathered before the broadcaster's identity is known, and
//! an `ice` message without a `to` cannot be routed. They are held here in
//! generation order and released the moment the remote id arrives.

use std::collections::VecDeque;

use crate::signaling::message::SignalMessage;

use super::engine::IceCandidate;

/// FIFO of local candidates awaiting a remote peer id
#[derive(Debug)]
pub struct CandidateBuffer {
    local_id: String,
    remote_id: Option<String>,
    queue: VecDeque<Option<IceCandidate>>,
}

impl CandidateBuffer {
    /// Create an empty buffer for the given local viewer id
    pub fn new(local_id: impl Into<String>) -> Self {
        Self {
            local_id: local_id.into(),
            remote_id: None,
            queue: VecDeque::new(),
        }
    }

    /// Offer a locally generated candidate (`None` = gathering complete).
    ///
    /// Returns the message to send right away, or `None` if it was queued.
    pub fn push(&mut self, candidate: Option<IceCandidate>) -> Option<SignalMessage> {
        match &self.remote_id {
            Some(remote) => Some(SignalMessage::ice(&self.local_id, remote, candidate)),
            None => {
                self.queue.push_back(candidate);
                None
            }
        }
    }

    /// Learn the remote peer id and drain everything queued so far, in order.
    ///
    /// Each drained message is stamped with `remote_id`. Draining happens once;
    /// later calls return nothing new.
    pub fn set_remote(&mut self, remote_id: &str) -> Vec<SignalMessage> {
        self.remote_id = Some(remote_id.to_string());
        self.queue
            .drain(..)
            .map(|candidate| SignalMessage::ice(&self.local_id, remote_id, candidate))
            .collect()
    }

    pub fn remote_id(&self) -> Option<&str> {
        self.remote_id.as_deref()
    }

    /// Number of queued candidates
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drop queued candidates and forget the remote id
    pub fn clear(&mut self) {
        self.queue.clear();
        self.remote_id = None;
    }
}
