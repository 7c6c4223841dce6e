//! Wire-level types for the tether state-synchronization protocol.
//!
//! The crate defines the message model shared by peers and the daemon:
//! request/response objects, the single-or-batch frame shape, the
//! reserved error vocabulary, fetch match expressions, and the codec that
//! turns frames into bytes (JSON by default, MessagePack once
//! negotiated). It carries no connection state; the engine lives in
//! `tether-peer`.

mod codec;
mod error;
mod expr;
mod message;

pub use codec::{CodecError, Encoding};
pub use error::{
    CONNECTION_CLOSED, ErrorObject, HandlerError, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST,
    METHOD_NOT_FOUND, PARSE_ERROR, RESPONSE_TIMEOUT,
};
pub use expr::{
    FetchEvent, FetchExpr, FetchUpdate, PathMatcher, SortSpec, SortedEntry, SortedUpdate,
};
pub use message::{Frame, Inbound, Request, Response};
