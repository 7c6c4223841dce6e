//! Transport seam between the engine and the host-owned socket.
//!
//! The engine never opens sockets itself. The host connects whatever
//! message channel it likes, hands the sending half to [`Peer::new`],
//! and drives the engine by forwarding channel events to
//! [`Peer::handle_open`], [`Peer::handle_frame`], [`Peer::handle_error`]
//! and [`Peer::handle_close`].
//!
//! [`Peer::new`]: crate::Peer::new
//! [`Peer::handle_open`]: crate::Peer::handle_open
//! [`Peer::handle_frame`]: crate::Peer::handle_frame
//! [`Peer::handle_error`]: crate::Peer::handle_error
//! [`Peer::handle_close`]: crate::Peer::handle_close

use std::io;

use thiserror::Error;

/// Sending half of a message-oriented connection.
pub trait Transport {
    /// Sends one complete wire frame.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the frame cannot be handed to the
    /// channel; the engine treats any send failure as fatal for the
    /// connection.
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError>;

    /// Asks the channel to close.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the close could not be initiated.
    fn close(&mut self) -> Result<(), TransportError>;
}

/// Transport-layer errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O error while sending or closing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The channel is not open yet.
    #[error("transport is not open")]
    NotOpen,

    /// The channel has already closed.
    #[error("transport is closed")]
    Closed,
}
