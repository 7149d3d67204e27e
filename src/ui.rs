use crate::engine::MediaTrack;
use crate::relay::PeerInfo;

/// Capability surface of the presentation layer. Implementations decide what
/// a "view" or a "renderer" actually is; a headless harness may record calls
/// and nothing more.
pub trait UiHandle: Send + Sync {
    fn switch_to_connect_view(&self);
    fn switch_to_peer_list(&self, peers: &[PeerInfo]);
    fn switch_to_streaming_view(&self);
    fn start_local_renderer(&self, track: &MediaTrack);
    fn stop_local_renderer(&self);
    fn start_remote_renderer(&self, track: &MediaTrack);
    fn stop_remote_renderer(&self);
    fn alert(&self, title: &str, message: &str);
}
