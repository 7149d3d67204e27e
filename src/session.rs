use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::engine::{EngineConfig, EngineError, EngineEvents, EngineFactory, EngineHandle, MediaTrack};
use crate::signaling::{CandidateInit, SdpKind};

/// Shared reference to the live engine handle. The stats loops read it from
/// other contexts and must tolerate it emptying between a presence check and
/// use.
pub type HandleSlot = Arc<RwLock<Option<Arc<dyn EngineHandle>>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Initializing,
    Negotiating,
    Active,
    Closing,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a session is already active")]
    AlreadyActive,
    #[error("no active session")]
    NoSession,
    #[error("session engine initialization failed: {0}")]
    EngineInit(EngineError),
    #[error("{0}")]
    Engine(EngineError),
}

/// What the conductor should do with a freshly set local description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalDescriptionOutcome {
    /// Encode and queue for the relay.
    Publish,
    /// Loopback reflected it as the remote answer; nothing leaves the process.
    Reflected,
}

/// Owns the single session engine handle and drives its lifecycle. All
/// mutation happens on the conductor's serialized context; the only
/// cross-thread access is the read-only [`HandleSlot`].
pub struct SessionController {
    factory: Arc<dyn EngineFactory>,
    engine_config: EngineConfig,
    events: EngineEvents,
    handle: HandleSlot,
    state: SessionState,
    remote_peer: Option<String>,
    loopback: bool,
    local_set: bool,
    remote_set: bool,
}

impl SessionController {
    pub fn new(factory: Arc<dyn EngineFactory>, engine_config: EngineConfig, events: EngineEvents) -> Self {
        Self {
            factory,
            engine_config,
            events,
            handle: Arc::new(RwLock::new(None)),
            state: SessionState::Idle,
            remote_peer: None,
            loopback: false,
            local_set: false,
            remote_set: false,
        }
    }

    pub fn handle_slot(&self) -> HandleSlot {
        Arc::clone(&self.handle)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn remote_peer(&self) -> Option<&str> {
        self.remote_peer.as_deref()
    }

    pub fn is_loopback(&self) -> bool {
        self.loopback
    }

    /// True while a session exists in any pre-`Closing` form.
    pub fn engaged(&self) -> bool {
        self.state != SessionState::Idle
    }

    /// `Idle -> Initializing -> Negotiating`. Creates the engine session,
    /// attaches outbound media, publishes the handle and, when this side
    /// initiated, requests an offer. Returns the video track for the local
    /// renderer when a capture device exists.
    pub async fn begin(
        &mut self,
        peer: String,
        offering: bool,
    ) -> Result<Option<MediaTrack>, SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::AlreadyActive);
        }
        info!(target: "conductor", peer = %peer, offering, "initializing session");
        self.state = SessionState::Initializing;
        self.remote_peer = Some(peer);

        let handle = match self
            .factory
            .create_session(&self.engine_config, Arc::clone(&self.events))
            .await
        {
            Ok(handle) => handle,
            Err(err) => {
                self.teardown();
                return Err(SessionError::EngineInit(err));
            }
        };
        let video = match self.attach_media(handle.as_ref()).await {
            Ok(video) => video,
            Err(err) => {
                self.teardown();
                return Err(SessionError::EngineInit(err));
            }
        };

        *self.handle.write() = Some(Arc::clone(&handle));
        self.state = SessionState::Negotiating;

        if offering {
            if let Err(err) = handle.create_offer().await {
                self.teardown();
                return Err(SessionError::Engine(err));
            }
        }
        Ok(video)
    }

    /// Destructive reinitialize for loopback: discard the current handle,
    /// recreate it with transport encryption disabled for the duration of the
    /// creation only, reattach the previously held outbound tracks and
    /// synthesize a fresh offer locally.
    pub async fn begin_loopback(&mut self) -> Result<(), SessionError> {
        let previous = self.current()?;
        let senders = previous.senders();
        *self.handle.write() = None;
        drop(previous);

        info!(target: "conductor", tracks = senders.len(), "reinitializing session for loopback");
        self.loopback = true;
        self.local_set = false;
        self.remote_set = false;
        self.state = SessionState::Initializing;

        self.factory.set_encryption(false);
        let created = self
            .factory
            .create_session(&self.engine_config, Arc::clone(&self.events))
            .await;
        // Encryption policy goes back to its default for subsequent sessions
        // regardless of how the loopback creation went.
        self.factory.set_encryption(true);

        let handle = match created {
            Ok(handle) => handle,
            Err(err) => {
                self.teardown();
                return Err(SessionError::EngineInit(err));
            }
        };
        for track in senders {
            if let Err(err) = handle.add_track(track).await {
                warn!(target: "conductor", error = %err, "failed to reattach track for loopback");
            }
        }

        *self.handle.write() = Some(Arc::clone(&handle));
        self.state = SessionState::Negotiating;

        if let Err(err) = handle.create_offer().await {
            self.teardown();
            return Err(SessionError::Engine(err));
        }
        Ok(())
    }

    /// Apply a remote description; a remote offer triggers local answer
    /// generation.
    pub async fn apply_remote_description(
        &mut self,
        kind: SdpKind,
        sdp: &str,
    ) -> Result<(), SessionError> {
        let handle = self.current()?;
        handle
            .set_remote_description(kind, sdp)
            .await
            .map_err(SessionError::Engine)?;
        self.remote_set = true;
        self.maybe_activate();
        if kind == SdpKind::Offer {
            handle.create_answer().await.map_err(SessionError::Engine)?;
        }
        Ok(())
    }

    /// Apply a locally generated description. In loopback mode the same SDP
    /// is immediately re-applied as the remote answer, skipping the relay.
    pub async fn handle_local_description(
        &mut self,
        kind: SdpKind,
        sdp: &str,
    ) -> Result<LocalDescriptionOutcome, SessionError> {
        let handle = self.current()?;
        handle
            .set_local_description(kind, sdp)
            .await
            .map_err(SessionError::Engine)?;
        self.local_set = true;
        self.maybe_activate();

        if self.loopback {
            handle
                .set_remote_description(SdpKind::Answer, sdp)
                .await
                .map_err(SessionError::Engine)?;
            self.remote_set = true;
            self.maybe_activate();
            return Ok(LocalDescriptionOutcome::Reflected);
        }
        Ok(LocalDescriptionOutcome::Publish)
    }

    /// Apply a trickled candidate. Arrival order relative to descriptions is
    /// not guaranteed; the engine buffers internally. Failures are logged and
    /// non-fatal.
    pub async fn apply_candidate(&mut self, candidate: &CandidateInit) {
        let handle = { self.handle.read().clone() };
        let Some(handle) = handle else {
            warn!(target: "conductor", "dropping candidate: no active session");
            return;
        };
        if let Err(err) = handle.add_ice_candidate(candidate).await {
            warn!(target: "conductor", error = %err, "failed to apply the received candidate");
        }
    }

    /// `-> Closing -> Idle`. Releases the engine handle and resets the bound
    /// peer and loopback flag.
    pub fn teardown(&mut self) {
        if self.state != SessionState::Idle {
            debug!(target: "conductor", state = ?self.state, "tearing down session");
        }
        self.state = SessionState::Closing;
        *self.handle.write() = None;
        self.remote_peer = None;
        self.loopback = false;
        self.local_set = false;
        self.remote_set = false;
        self.state = SessionState::Idle;
    }

    fn current(&self) -> Result<Arc<dyn EngineHandle>, SessionError> {
        self.handle.read().clone().ok_or(SessionError::NoSession)
    }

    fn maybe_activate(&mut self) {
        if self.state == SessionState::Negotiating && self.local_set && self.remote_set {
            self.state = SessionState::Active;
            info!(target: "conductor", "session active, candidates may still trickle");
        }
    }

    async fn attach_media(&self, handle: &dyn EngineHandle) -> Result<Option<MediaTrack>, EngineError> {
        let audio = self.factory.create_audio_track()?;
        handle.add_track(audio).await?;
        match self.factory.create_video_track()? {
            Some(video) => {
                handle.add_track(video.clone()).await?;
                Ok(Some(video))
            }
            None => {
                warn!(target: "conductor", "no video capture device, continuing without video");
                Ok(None)
            }
        }
    }
}
