//! Peer-side engine for the tether state-synchronization protocol.
//!
//! The crate turns one message-oriented connection into a peer that can
//! register observable states and callable methods under daemon-wide
//! paths, invoke remote ones, and subscribe to changes matching a
//! predicate. The engine guarantees exactly-once response delivery per
//! request, contains failures raised by user handlers, and coalesces the
//! messages of one synchronous turn into a single wire frame.
//!
//! The host owns the socket: it hands the sending half to [`Peer::new`]
//! behind the [`Transport`] trait and forwards connection events to the
//! `handle_*` methods. Everything is single-threaded and cooperative;
//! see [`Peer`] for the details.

mod config;
mod connection;
mod correlation;
mod dispatch;
mod errors;
mod fetch;
mod queue;
mod resource;
#[cfg(test)]
mod tests;
mod transport;

pub use tether_proto as proto;

pub use config::{DEFAULT_DAEMON_URL, PeerConfig, PeerHooks};
pub use connection::{ConnectionState, Peer};
pub use correlation::Callbacks;
pub use errors::PeerError;
pub use fetch::FetchHandle;
pub use resource::{
    CallArgs, MethodDescriptor, MethodHandle, MethodReply, MethodResponse, SetOptions, SetOutcome,
    StateDescriptor, StateHandle, StateReply, StateResponse,
};
pub use transport::{Transport, TransportError};
