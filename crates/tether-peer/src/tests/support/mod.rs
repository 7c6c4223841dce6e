//! Shared fixtures and helpers for engine tests.

mod recording_transport;

use serde_json::{Value, json};

pub use recording_transport::{RecordingTransport, TransportLog};

use crate::config::{PeerConfig, PeerHooks};
use crate::connection::Peer;

/// Builds an open peer over a recording transport.
pub fn open_peer() -> (Peer, TransportLog) {
    peer_with(PeerConfig::default(), PeerHooks::default())
}

/// Builds an open peer with the given configuration and hooks.
pub fn peer_with(config: PeerConfig, hooks: PeerHooks) -> (Peer, TransportLog) {
    let (transport, log) = RecordingTransport::new();
    let mut peer = Peer::new(Box::new(transport), config, hooks);
    peer.handle_open().expect("open handshake failed");
    (peer, log)
}

/// Feeds one JSON message to the peer as a wire frame.
pub fn deliver(peer: &mut Peer, message: Value) {
    let raw = serde_json::to_vec(&message).expect("test frame failed to encode");
    peer.handle_frame(&raw);
}

/// Answers the request with the given id successfully.
pub fn respond_result(peer: &mut Peer, id: u64, result: Value) {
    deliver(peer, json!({ "id": id, "result": result }));
}

/// Answers the request with the given id with an error object.
pub fn respond_error(peer: &mut Peer, id: u64, error: Value) {
    deliver(peer, json!({ "id": id, "error": error }));
}
