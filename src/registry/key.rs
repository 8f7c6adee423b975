//! Stream keys
//!
//! A stream key partitions independent connection lifecycles. Two consumers
//! asking for the same key share one connection entry.

/// Unique identifier for a viewer connection (e.g. `camera-42`, `agent-7`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamKey(String);

impl StreamKey {
    /// Create a stream key from any identifier
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key for a plain camera stream
    pub fn camera(camera_id: impl std::fmt::Display) -> Self {
        Self(format!("camera-{}", camera_id))
    }

    /// Key for a camera stream annotated by an agent
    pub fn agent(agent_id: impl std::fmt::Display) -> Self {
        Self(format!("agent-{}", agent_id))
    }

    /// Get the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StreamKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for StreamKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}
