/// A peer visible on the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub id: String,
    pub name: String,
}

/// Events delivered by the relay transport client. The client performs the
/// actual network I/O; the conductor only sees this stream, serialized on its
/// own event channel.
#[derive(Debug, Clone)]
pub enum RelayEvent {
    SignedIn,
    Disconnected,
    /// The roster changed in some way not covered by the peer events below.
    PeerListChanged,
    PeerConnected { id: String, name: String },
    PeerDisconnected { id: String },
    MessageReceived { from: String, payload: String },
    /// The previous `send_to_peer` hand-off finished; the next queued payload
    /// may be drained.
    SendCompleted,
    ConnectionFailed,
}

/// Capability surface of the relay transport client.
pub trait RelayClient: Send + Sync {
    fn connect(&self, host: &str, port: u16, display_name: &str);
    fn sign_out(&self);
    /// Hand one payload to the transport. Returns false when the transport
    /// refused it; completion of an accepted send is reported asynchronously
    /// via [`RelayEvent::SendCompleted`].
    fn send_to_peer(&self, peer: &str, payload: &str) -> bool;
    fn is_connected(&self) -> bool;
    fn is_send_in_flight(&self) -> bool;
    fn peers(&self) -> Vec<PeerInfo>;
}
