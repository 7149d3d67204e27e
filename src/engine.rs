use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::signaling::{CandidateInit, SdpKind};
use crate::stats::{LegacyStatsRecord, StatsSnapshot};

/// Engine-side configuration for a new session.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub ice_server: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// An outbound or inbound media track, identified well enough to be re-added
/// to a recreated session and routed to a renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTrack {
    pub id: String,
    pub kind: TrackKind,
    pub stream_id: String,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to create session engine: {0}")]
    Init(String),
    #[error("track setup failed: {0}")]
    Track(String),
    #[error("engine operation failed: {0}")]
    Operation(String),
}

/// Callbacks the engine raises while a session is alive. Delivered through a
/// plain closure the conductor installs at session creation; the closure posts
/// onto the conductor's serialized event channel.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    LocalDescriptionReady { kind: SdpKind, sdp: String },
    LocalCandidate(CandidateInit),
    RemoteTrackAdded(MediaTrack),
    RemoteTrackRemoved(MediaTrack),
    Failure(String),
}

pub type EngineEvents = Arc<dyn Fn(EngineEvent) + Send + Sync>;

/// Handle to one live media session. Valid while the owning session is
/// active; the conductor owns the only long-lived reference, the stats loops
/// hold clones that must tolerate the session ending underneath them.
#[async_trait]
pub trait EngineHandle: Send + Sync {
    async fn create_offer(&self) -> Result<(), EngineError>;
    async fn create_answer(&self) -> Result<(), EngineError>;
    async fn set_local_description(&self, kind: SdpKind, sdp: &str) -> Result<(), EngineError>;
    async fn set_remote_description(&self, kind: SdpKind, sdp: &str) -> Result<(), EngineError>;
    async fn add_ice_candidate(&self, candidate: &CandidateInit) -> Result<(), EngineError>;
    async fn add_track(&self, track: MediaTrack) -> Result<(), EngineError>;
    /// Currently attached outbound tracks.
    fn senders(&self) -> Vec<MediaTrack>;
    /// Synchronous standard-verbosity snapshot, one record per stats report.
    fn poll_legacy_stats(&self) -> Vec<LegacyStatsRecord>;
    /// Asynchronous attribute-bag snapshot.
    async fn poll_stats(&self) -> StatsSnapshot;
}

/// Factory for media sessions. `set_encryption` adjusts the transport
/// encryption policy for sessions created afterwards.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn create_session(
        &self,
        config: &EngineConfig,
        events: EngineEvents,
    ) -> Result<Arc<dyn EngineHandle>, EngineError>;
    fn create_audio_track(&self) -> Result<MediaTrack, EngineError>;
    /// `Ok(None)` when no capture device is available.
    fn create_video_track(&self) -> Result<Option<MediaTrack>, EngineError>;
    fn set_encryption(&self, enabled: bool);
}
