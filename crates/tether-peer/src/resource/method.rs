//! Callable methods: argument shaping, handler dispatch and replies.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::{Value, json};
use tracing::warn;

use tether_proto::{HandlerError, Request, Response};

use crate::connection::{DISPATCH_TARGET, Peer};
use crate::correlation::Callbacks;
use crate::dispatch::{Dispatch, Dispatcher};
use crate::errors::PeerError;
use crate::resource::{answer_failure, invalid_async_response};

/// Arguments an inbound call delivers to a handler.
///
/// A non-empty array arrives as positional arguments; anything else is
/// the params value itself, as a single argument.
#[derive(Debug, Clone, PartialEq)]
pub enum CallArgs {
    /// Positional arguments taken from an args array.
    Positional(Vec<Value>),
    /// The params value as the sole argument.
    Single(Value),
}

impl CallArgs {
    pub(crate) fn from_params(params: Value) -> Self {
        match params {
            Value::Array(items) if !items.is_empty() => Self::Positional(items),
            other => Self::Single(other),
        }
    }

    /// Returns the argument at the given position.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        match self {
            Self::Positional(items) => items.get(index),
            Self::Single(value) => (index == 0).then_some(value),
        }
    }

    /// Number of arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Positional(items) => items.len(),
            Self::Single(_) => 1,
        }
    }

    /// Whether there are no arguments at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

type SyncCallFn = Box<dyn FnMut(CallArgs) -> Result<Value, HandlerError>>;
type AsyncCallFn = Box<dyn FnMut(&mut Peer, CallArgs, MethodReply) -> Result<(), HandlerError>>;

pub(crate) enum MethodHandler {
    Call(SyncCallFn),
    CallAsync(AsyncCallFn),
}

/// Everything needed to register a callable method.
pub struct MethodDescriptor {
    path: String,
    handler: MethodHandler,
}

impl MethodDescriptor {
    /// A method answered synchronously, within the dispatch cycle.
    ///
    /// A `Value::Null` return answers an empty object, so handlers
    /// without a meaningful result still produce a well-formed response.
    #[must_use]
    pub fn call(
        path: impl Into<String>,
        handler: impl FnMut(CallArgs) -> Result<Value, HandlerError> + 'static,
    ) -> Self {
        Self {
            path: path.into(),
            handler: MethodHandler::Call(Box::new(handler)),
        }
    }

    /// A method answered later through a [`MethodReply`] token.
    ///
    /// Failing before the token is used answers an error; once the token
    /// is consumed the returned failure is only logged.
    #[must_use]
    pub fn call_async(
        path: impl Into<String>,
        handler: impl FnMut(&mut Peer, CallArgs, MethodReply) -> Result<(), HandlerError> + 'static,
    ) -> Self {
        Self {
            path: path.into(),
            handler: MethodHandler::CallAsync(Box::new(handler)),
        }
    }
}

struct MethodInner {
    path: String,
    // None only while the handler is running; dispatch is not reentrant.
    handler: Option<MethodHandler>,
}

pub(crate) struct MethodEntry {
    inner: RefCell<MethodInner>,
}

impl MethodEntry {
    fn path(&self) -> String {
        self.inner.borrow().path.clone()
    }

    fn restore(&self, handler: MethodHandler) {
        self.inner.borrow_mut().handler = Some(handler);
    }
}

/// Client-side handle to a registered method.
#[derive(Clone)]
pub struct MethodHandle {
    entry: Rc<MethodEntry>,
}

pub(super) fn build_handle(descriptor: MethodDescriptor) -> MethodHandle {
    let MethodDescriptor { path, handler } = descriptor;
    MethodHandle {
        entry: Rc::new(MethodEntry {
            inner: RefCell::new(MethodInner {
                path,
                handler: Some(handler),
            }),
        }),
    }
}

impl MethodHandle {
    /// Path the method is registered under.
    #[must_use]
    pub fn path(&self) -> String {
        self.entry.path()
    }

    /// Whether the method is currently registered on the connection.
    #[must_use]
    pub fn is_added(&self, peer: &Peer) -> bool {
        peer.is_dispatching(&self.path())
    }

    /// Re-registers the method after a removal.
    ///
    /// # Errors
    ///
    /// Returns [`PeerError::AlreadyRegistered`] without any round trip
    /// when the handle is still registered.
    pub fn add(&self, peer: &mut Peer, callbacks: Option<Callbacks>) -> Result<(), PeerError> {
        if self.is_added(peer) {
            return Err(PeerError::AlreadyRegistered { path: self.path() });
        }
        self.register(peer, callbacks)
    }

    /// Unregisters the method.
    ///
    /// Removing a method that is not registered succeeds immediately with
    /// no round trip.
    ///
    /// # Errors
    ///
    /// Returns [`PeerError`] when the connection is closed or the request
    /// cannot be flushed.
    pub fn remove(&self, peer: &mut Peer, callbacks: Option<Callbacks>) -> Result<(), PeerError> {
        if !self.is_added(peer) {
            peer.resolve_locally(callbacks);
            return Ok(());
        }
        peer.remove_resource(&self.path(), callbacks)
    }

    pub(super) fn register(
        &self,
        peer: &mut Peer,
        callbacks: Option<Callbacks>,
    ) -> Result<(), PeerError> {
        let dispatcher: Dispatcher = Rc::clone(&self.entry) as Dispatcher;
        peer.register_resource(self.path(), None, dispatcher, callbacks)
    }
}

impl Dispatch for MethodEntry {
    fn dispatch(self: Rc<Self>, peer: &mut Peer, request: Request) {
        let args = CallArgs::from_params(request.params);
        let Some(handler) = self.inner.borrow_mut().handler.take() else {
            warn!(target: DISPATCH_TARGET, path = %self.path(), "method dispatch re-entered");
            return;
        };
        match handler {
            MethodHandler::Call(mut call) => {
                let outcome = call(args);
                self.restore(MethodHandler::Call(call));
                match outcome {
                    Ok(result) => {
                        if let Some(id) = request.id {
                            let result = if result.is_null() { json!({}) } else { result };
                            peer.queue_response(Response::result(id, result));
                        }
                    }
                    Err(failure) => answer_failure(peer, request.id, &self.path(), &failure),
                }
            }
            MethodHandler::CallAsync(mut call) => {
                let answered = Rc::new(Cell::new(false));
                let reply = MethodReply {
                    request_id: request.id.clone(),
                    path: self.path(),
                    answered: Rc::clone(&answered),
                };
                let run = call(peer, args, reply);
                self.restore(MethodHandler::CallAsync(call));
                if let Err(failure) = run {
                    if answered.get() {
                        warn!(
                            target: DISPATCH_TARGET,
                            path = %self.path(),
                            error = %failure,
                            "handler failed after replying"
                        );
                    } else {
                        answer_failure(peer, request.id, &self.path(), &failure);
                    }
                }
            }
        }
    }
}

/// Response sent through a [`MethodReply`] token.
///
/// The default response carries neither result nor error and is answered
/// as an invalid-async-response internal error.
#[derive(Debug, Default)]
pub struct MethodResponse {
    result: Option<Value>,
    error: Option<HandlerError>,
    dont_flush: bool,
}

impl MethodResponse {
    /// The call succeeded with the given result.
    #[must_use]
    pub fn returning(result: Value) -> Self {
        Self {
            result: Some(result),
            ..Self::default()
        }
    }

    /// The call failed with the given failure.
    #[must_use]
    pub fn rejecting(failure: impl Into<HandlerError>) -> Self {
        Self {
            error: Some(failure.into()),
            ..Self::default()
        }
    }

    /// Suppress the implicit flush this reply would otherwise trigger.
    #[must_use]
    pub fn without_flush(mut self) -> Self {
        self.dont_flush = true;
        self
    }
}

/// Single-shot completion token handed to asynchronous method handlers.
///
/// Consuming the token answers the pending call; dropping it without
/// sending leaves the call permanently unanswered from this peer.
pub struct MethodReply {
    request_id: Option<Value>,
    path: String,
    answered: Rc<Cell<bool>>,
}

impl MethodReply {
    /// Answers the pending call.
    ///
    /// # Errors
    ///
    /// Returns [`PeerError`] when the implicit flush fails.
    pub fn send(self, peer: &mut Peer, response: MethodResponse) -> Result<(), PeerError> {
        let Self {
            request_id,
            path,
            answered,
        } = self;
        answered.set(true);
        let MethodResponse {
            result,
            error,
            dont_flush,
        } = response;
        if let Some(id) = request_id {
            let wire = match (result, error) {
                (Some(result), None) => Response::result(id, result),
                (_, Some(failure)) => Response::error(id, failure.into()),
                (None, None) => Response::error(id, invalid_async_response("method", &path)),
            };
            peer.queue_response(wire);
        }
        if dont_flush { Ok(()) } else { peer.flush_if_idle() }
    }
}
