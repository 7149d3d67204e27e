use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::ConductorConfig;
use crate::engine::{EngineConfig, EngineEvent, EngineEvents, EngineFactory, TrackKind, MediaTrack};
use crate::queue::OutboundQueue;
use crate::relay::{RelayClient, RelayEvent};
use crate::session::{LocalDescriptionOutcome, SessionController, SessionState};
use crate::signaling::SignalingMessage;
use crate::stats::{SinkError, StatsPoller};
use crate::ui::UiHandle;

/// Everything the conductor reacts to, serialized onto one channel so no two
/// handlers ever run concurrently.
#[derive(Debug, Clone)]
pub enum ConductorEvent {
    Relay(RelayEvent),
    Engine(EngineEvent),
    /// Sign in to the relay (original "start login").
    SignIn { host: String, port: u16 },
    /// Offer a session to a listed peer.
    ConnectToPeer { peer: String },
    /// Leave the relay and drop any session.
    SignOut,
    /// A payload was queued; try to drain.
    SendPending,
    /// The bound peer went away; finish teardown and restore the UI.
    SessionClosed,
    /// Stop the loops and exit the event loop.
    Shutdown,
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    StatsSink(#[from] SinkError),
}

/// Orchestrates the signaling exchange: relay events and engine callbacks in,
/// session lifecycle transitions and ordered relay sends out.
pub struct Conductor {
    relay: Arc<dyn RelayClient>,
    ui: Arc<dyn UiHandle>,
    session: SessionController,
    queue: OutboundQueue,
    stats: StatsPoller,
    config: ConductorConfig,
    tx: mpsc::UnboundedSender<ConductorEvent>,
    rx: mpsc::UnboundedReceiver<ConductorEvent>,
}

impl Conductor {
    /// Build the conductor, truncate both stats sinks and start the legacy
    /// stats worker. The modern loop is armed per session.
    pub fn new(
        relay: Arc<dyn RelayClient>,
        factory: Arc<dyn EngineFactory>,
        ui: Arc<dyn UiHandle>,
        config: ConductorConfig,
    ) -> Result<Self, SetupError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine_events: EngineEvents = {
            let tx = tx.clone();
            Arc::new(move |event| {
                let _ = tx.send(ConductorEvent::Engine(event));
            })
        };
        let session = SessionController::new(
            factory,
            EngineConfig {
                ice_server: config.ice_server.clone(),
            },
            engine_events,
        );
        let mut stats = StatsPoller::new(session.handle_slot(), &config)?;
        stats.start_legacy();
        Ok(Self {
            relay,
            ui,
            session,
            queue: OutboundQueue::new(),
            stats,
            config,
            tx,
            rx,
        })
    }

    /// Posting side of the event channel, handed to the relay client wiring
    /// and to callers issuing commands.
    pub fn sender(&self) -> mpsc::UnboundedSender<ConductorEvent> {
        self.tx.clone()
    }

    pub fn connection_active(&self) -> bool {
        self.session.engaged()
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn bound_peer(&self) -> Option<String> {
        self.session.remote_peer().map(str::to_string)
    }

    pub fn queued_payloads(&self) -> usize {
        self.queue.len()
    }

    /// Consume events until shutdown. All handlers run here, strictly in
    /// arrival order.
    pub async fn run(mut self) {
        while let Some(event) = self.rx.recv().await {
            if !self.process(event).await {
                break;
            }
        }
    }

    pub(crate) async fn process(&mut self, event: ConductorEvent) -> bool {
        match event {
            ConductorEvent::Relay(event) => self.on_relay_event(event).await,
            ConductorEvent::Engine(event) => self.on_engine_event(event).await,
            ConductorEvent::SignIn { host, port } => {
                if !self.relay.is_connected() {
                    self.relay.connect(&host, port, &self.config.display_name);
                }
            }
            ConductorEvent::ConnectToPeer { peer } => self.on_connect_request(peer).await,
            ConductorEvent::SignOut => {
                self.relay.sign_out();
                self.close_session();
            }
            ConductorEvent::SendPending => self.drain_outbound(),
            ConductorEvent::SessionClosed => {
                self.close_session();
                if self.relay.is_connected() {
                    self.ui.switch_to_peer_list(&self.relay.peers());
                } else {
                    self.ui.switch_to_connect_view();
                }
            }
            ConductorEvent::Shutdown => {
                info!(target: "conductor", "shutting down");
                self.relay.sign_out();
                // Both stats loops must be fully stopped before the session
                // handle is released.
                self.stats.stop();
                self.close_session();
                return false;
            }
        }
        true
    }

    async fn on_relay_event(&mut self, event: RelayEvent) {
        match event {
            RelayEvent::SignedIn => {
                self.ui.switch_to_peer_list(&self.relay.peers());
            }
            RelayEvent::Disconnected => {
                self.close_session();
                self.ui.switch_to_connect_view();
            }
            RelayEvent::PeerListChanged => {
                self.ui.switch_to_peer_list(&self.relay.peers());
            }
            RelayEvent::PeerConnected { id, name } => {
                debug!(target: "conductor", peer = %id, name = %name, "peer joined the relay");
                self.ui.switch_to_peer_list(&self.relay.peers());
            }
            RelayEvent::PeerDisconnected { id } => {
                if self.session.remote_peer() == Some(id.as_str()) {
                    info!(target: "conductor", peer = %id, "our peer disconnected");
                    let _ = self.tx.send(ConductorEvent::SessionClosed);
                } else {
                    self.ui.switch_to_peer_list(&self.relay.peers());
                }
            }
            RelayEvent::MessageReceived { from, payload } => {
                self.on_peer_message(from, payload).await;
            }
            RelayEvent::SendCompleted => self.drain_outbound(),
            RelayEvent::ConnectionFailed => {
                self.ui.alert("Error", "Failed to connect to the relay server");
            }
        }
    }

    async fn on_peer_message(&mut self, from: String, payload: String) {
        if let Some(bound) = self.session.remote_peer() {
            // Sign of life from a third peer while already in a conversation:
            // log and drop, never fatal.
            if bound != from {
                warn!(target: "conductor", from = %from, bound = %bound,
                    "message from unknown peer while in a conversation, dropping");
                return;
            }
        }

        if !self.session.engaged() {
            match self.session.begin(from.clone(), false).await {
                Ok(video) => self.on_session_started(video),
                Err(err) => {
                    error!(target: "conductor", error = %err, "failed to initialize session engine");
                    self.ui.alert("Error", "Failed to initialize session engine");
                    self.relay.sign_out();
                    return;
                }
            }
        }

        match SignalingMessage::decode(&payload) {
            Err(err) => {
                warn!(target: "conductor", error = %err, "dropping undecodable relay message");
            }
            Ok(SignalingMessage::LoopbackOffer) => {
                if let Err(err) = self.session.begin_loopback().await {
                    error!(target: "conductor", error = %err, "loopback reinitialization failed");
                    self.close_session();
                    self.relay.sign_out();
                }
            }
            Ok(SignalingMessage::Description { kind, sdp }) => {
                if let Err(err) = self.session.apply_remote_description(kind, &sdp).await {
                    warn!(target: "conductor", error = %err, "failed to apply remote description");
                }
            }
            Ok(SignalingMessage::Candidate(candidate)) => {
                self.session.apply_candidate(&candidate).await;
            }
        }
    }

    async fn on_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::LocalDescriptionReady { kind, sdp } => {
                match self.session.handle_local_description(kind, &sdp).await {
                    Ok(LocalDescriptionOutcome::Reflected) => {}
                    Ok(LocalDescriptionOutcome::Publish) => {
                        self.publish(SignalingMessage::Description { kind, sdp });
                    }
                    Err(err) => {
                        warn!(target: "conductor", error = %err, "failed to handle local description");
                    }
                }
            }
            EngineEvent::LocalCandidate(candidate) => {
                if self.session.is_loopback() {
                    // Saves the relay round trip for loopback sessions.
                    self.session.apply_candidate(&candidate).await;
                } else {
                    self.publish(SignalingMessage::Candidate(candidate));
                    self.stats.log_snapshot_once();
                }
            }
            EngineEvent::RemoteTrackAdded(track) => self.on_remote_track(track),
            EngineEvent::RemoteTrackRemoved(track) => {
                debug!(target: "conductor", track = %track.id, "remote track removed");
            }
            EngineEvent::Failure(message) => {
                error!(target: "conductor", "engine failure: {message}");
            }
        }
    }

    async fn on_connect_request(&mut self, peer: String) {
        if self.session.engaged() {
            warn!(target: "conductor", peer = %peer, "connect rejected, a session is already active");
            self.ui
                .alert("Error", "We only support connecting to one peer at a time");
            return;
        }
        match self.session.begin(peer, true).await {
            Ok(video) => self.on_session_started(video),
            Err(err) => {
                error!(target: "conductor", error = %err, "failed to initialize session engine");
                self.ui.alert("Error", "Failed to initialize session engine");
            }
        }
    }

    fn on_session_started(&mut self, video: Option<MediaTrack>) {
        if let Some(track) = &video {
            self.ui.start_local_renderer(track);
        }
        self.ui.switch_to_streaming_view();
        self.stats.start_modern();
    }

    fn on_remote_track(&mut self, track: MediaTrack) {
        if track.kind == TrackKind::Video {
            self.ui.start_remote_renderer(&track);
        }
    }

    fn publish(&mut self, message: SignalingMessage) {
        let Some(wire) = message.to_wire() else {
            debug!(target: "conductor", "message has no wire encoding, not queued");
            return;
        };
        self.queue.enqueue(wire);
        let _ = self.tx.send(ConductorEvent::SendPending);
    }

    /// Hand the head payload to the relay when it is idle. Single-flight: the
    /// next payload goes out only after the send-completed event.
    fn drain_outbound(&mut self) {
        if self.relay.is_send_in_flight() {
            return;
        }
        let Some(payload) = self.queue.front() else {
            return;
        };
        let Some(peer) = self.session.remote_peer() else {
            // No bound peer: transient, the queue keeps its position for the
            // next drain trigger.
            debug!(target: "conductor", "no bound peer, leaving outbound queue untouched");
            return;
        };
        if self.relay.send_to_peer(peer, payload) {
            self.queue.pop();
        } else {
            error!(target: "conductor", peer = %peer, "relay send failed, signing out");
            self.relay.sign_out();
            self.close_session();
        }
    }

    fn close_session(&mut self) {
        if !self.session.engaged() {
            return;
        }
        self.ui.stop_local_renderer();
        self.ui.stop_remote_renderer();
        self.session.teardown();
        self.queue.clear();
    }

    #[cfg(test)]
    pub(crate) fn queue_raw(&mut self, payload: String) {
        self.queue.enqueue(payload);
    }

    #[cfg(test)]
    pub(crate) async fn pump(&mut self) {
        while let Ok(event) = self.rx.try_recv() {
            self.process(event).await;
        }
    }

    #[cfg(test)]
    pub(crate) fn post(&self, event: ConductorEvent) {
        let _ = self.tx.send(event);
    }
}
