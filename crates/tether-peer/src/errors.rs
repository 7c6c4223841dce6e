//! Error types surfaced by the peer engine.

use thiserror::Error;

use tether_proto::CodecError;

use crate::transport::TransportError;

/// Errors returned by [`Peer`](crate::Peer) operations.
#[derive(Debug, Error)]
pub enum PeerError {
    /// The connection is closing or closed; no further requests are
    /// accepted.
    #[error("connection is closed")]
    ConnectionClosed,

    /// The transport rejected a frame or the close request.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A frame could not be encoded in the negotiated encoding.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The dispatch key (a path or fetcher id) is already registered on
    /// this connection.
    #[error("'{path}' is already registered on this connection")]
    AlreadyRegistered {
        /// The conflicting dispatch key.
        path: String,
    },

    /// A fetch expression and its notification callback disagree about
    /// sorting.
    #[error("fetch expression and notification callback disagree about sorting")]
    FetchModeMismatch,
}
