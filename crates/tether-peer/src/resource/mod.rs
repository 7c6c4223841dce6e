//! State and method resources: registration lifecycle and remote access.

mod method;
mod state;

use serde_json::{Map, Value, json};
use tracing::warn;

use tether_proto::{ErrorObject, HandlerError, Response};

use crate::connection::{DISPATCH_TARGET, Peer};
use crate::correlation::{Callbacks, Completion};
use crate::dispatch::Dispatcher;
use crate::errors::PeerError;

pub use method::{CallArgs, MethodDescriptor, MethodHandle, MethodReply, MethodResponse};
pub use state::{SetOutcome, StateDescriptor, StateHandle, StateReply, StateResponse};

/// Options for a remote [`Peer::set`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SetOptions {
    /// Ask the daemon to answer with the resulting value instead of
    /// `true`, so the setter observes overrides applied by the owner.
    pub value_as_result: bool,
}

impl SetOptions {
    /// Options requesting the resulting value as the response.
    #[must_use]
    pub fn value_as_result() -> Self {
        Self {
            value_as_result: true,
        }
    }
}

impl Peer {
    /// Registers a state and returns its handle.
    ///
    /// Issues an `add` request carrying the path and the initial value;
    /// the setter goes live once the daemon confirms (immediately and
    /// optimistically when no callbacks are given, since no response will
    /// come for a notification).
    ///
    /// # Errors
    ///
    /// Returns [`PeerError`] when the connection is closed or the request
    /// cannot be flushed. Path conflicts are the daemon's verdict and
    /// arrive through the error callback.
    pub fn state(
        &mut self,
        descriptor: StateDescriptor,
        callbacks: Option<Callbacks>,
    ) -> Result<StateHandle, PeerError> {
        let handle = state::build_handle(descriptor);
        handle.register(self, callbacks)?;
        Ok(handle)
    }

    /// Registers a callable method and returns its handle.
    ///
    /// # Errors
    ///
    /// Returns [`PeerError`] when the connection is closed or the request
    /// cannot be flushed.
    pub fn method(
        &mut self,
        descriptor: MethodDescriptor,
        callbacks: Option<Callbacks>,
    ) -> Result<MethodHandle, PeerError> {
        let handle = method::build_handle(descriptor);
        handle.register(self, callbacks)?;
        Ok(handle)
    }

    /// Asks the daemon to set a remote state to the given value.
    ///
    /// # Errors
    ///
    /// Returns [`PeerError`] when the connection is closed or the request
    /// cannot be flushed.
    pub fn set(
        &mut self,
        path: &str,
        value: Value,
        options: SetOptions,
        callbacks: Option<Callbacks>,
    ) -> Result<(), PeerError> {
        let mut params = Map::new();
        params.insert("path".to_owned(), Value::String(path.to_owned()));
        params.insert("value".to_owned(), value);
        if options.value_as_result {
            params.insert("valueAsResult".to_owned(), Value::Bool(true));
        }
        self.service("set", Value::Object(params), Completion::None, callbacks)?;
        self.flush_if_idle()
    }

    /// Invokes a remote method with the given arguments.
    ///
    /// `Value::Null` stands for "no arguments" and goes out as an empty
    /// array.
    ///
    /// # Errors
    ///
    /// Returns [`PeerError`] when the connection is closed or the request
    /// cannot be flushed.
    pub fn call(
        &mut self,
        path: &str,
        args: Value,
        callbacks: Option<Callbacks>,
    ) -> Result<(), PeerError> {
        let args = if args.is_null() { json!([]) } else { args };
        self.service(
            "call",
            json!({ "path": path, "args": args }),
            Completion::None,
            callbacks,
        )?;
        self.flush_if_idle()
    }

    /// Issues the `add` request for a resource and schedules dispatcher
    /// installation on success.
    pub(crate) fn register_resource(
        &mut self,
        path: String,
        value: Option<Value>,
        dispatcher: Dispatcher,
        callbacks: Option<Callbacks>,
    ) -> Result<(), PeerError> {
        let mut params = Map::new();
        params.insert("path".to_owned(), Value::String(path.clone()));
        if let Some(value) = value {
            params.insert("value".to_owned(), value);
        }
        self.service(
            "add",
            Value::Object(params),
            Completion::Install {
                key: path,
                dispatcher,
            },
            callbacks,
        )?;
        self.flush_if_idle()
    }

    /// Issues the `remove` request for a resource and schedules dispatcher
    /// removal on success.
    pub(crate) fn remove_resource(
        &mut self,
        path: &str,
        callbacks: Option<Callbacks>,
    ) -> Result<(), PeerError> {
        self.service(
            "remove",
            json!({ "path": path }),
            Completion::Uninstall {
                key: path.to_owned(),
            },
            callbacks,
        )?;
        self.flush_if_idle()
    }

    /// Resolves callbacks successfully without any round trip, for
    /// operations that are already satisfied locally.
    pub(crate) fn resolve_locally(&mut self, callbacks: Option<Callbacks>) {
        if let Some(callbacks) = callbacks {
            if let Some(callback) = callbacks.success {
                callback(self, Value::Bool(true));
            }
        }
    }
}

/// Error answered when an asynchronous handler replies with neither a
/// result nor an error.
pub(crate) fn invalid_async_response(kind: &str, path: &str) -> ErrorObject {
    ErrorObject::internal_error(Some(json!({
        "message": format!("invalid asynchronous {kind} response for '{path}'"),
    })))
}

/// Answers a failed handler, or logs the failure when the request was a
/// notification and no response may be produced.
pub(super) fn answer_failure(peer: &mut Peer, id: Option<Value>, path: &str, failure: &HandlerError) {
    match id {
        Some(id) => {
            peer.queue_response(Response::error(id, ErrorObject::from(failure.clone())));
        }
        None => {
            warn!(
                target: DISPATCH_TARGET,
                path,
                error = %failure,
                "handler failed on a notification"
            );
        }
    }
}
