//! Observable states: cached value, setter dispatch and change pushes.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::{Value, json};
use tracing::warn;

use tether_proto::{ErrorObject, HandlerError, Request, Response};

use crate::connection::{DISPATCH_TARGET, Peer};
use crate::correlation::Callbacks;
use crate::dispatch::{Dispatch, Dispatcher};
use crate::errors::PeerError;
use crate::resource::{answer_failure, invalid_async_response};

type SyncSetFn = Box<dyn FnMut(&Value) -> Result<SetOutcome, HandlerError>>;
type AsyncSetFn = Box<dyn FnMut(&mut Peer, Value, StateReply) -> Result<(), HandlerError>>;

/// How inbound set requests reach the state's owner.
pub(crate) enum StateAccess {
    /// No setter: every inbound set answers Invalid-Params.
    ReadOnly,
    /// Synchronous setter, answered within the dispatch cycle.
    Write(SyncSetFn),
    /// Asynchronous setter, answered through a [`StateReply`] token.
    WriteAsync(AsyncSetFn),
}

/// Everything needed to register a state.
pub struct StateDescriptor {
    path: String,
    value: Value,
    access: StateAccess,
}

impl StateDescriptor {
    /// A state remote peers cannot set.
    #[must_use]
    pub fn read_only(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            value,
            access: StateAccess::ReadOnly,
        }
    }

    /// A state with a synchronous setter.
    ///
    /// The setter validates (and may transform) the incoming value; the
    /// engine answers the daemon and notifies fetchers according to the
    /// returned [`SetOutcome`].
    #[must_use]
    pub fn writable(
        path: impl Into<String>,
        value: Value,
        set: impl FnMut(&Value) -> Result<SetOutcome, HandlerError> + 'static,
    ) -> Self {
        Self {
            path: path.into(),
            value,
            access: StateAccess::Write(Box::new(set)),
        }
    }

    /// A state whose setter answers later through a [`StateReply`] token.
    ///
    /// Failing before the token is used answers an error; once the token
    /// is consumed the returned failure is only logged.
    #[must_use]
    pub fn writable_async(
        path: impl Into<String>,
        value: Value,
        set: impl FnMut(&mut Peer, Value, StateReply) -> Result<(), HandlerError> + 'static,
    ) -> Self {
        Self {
            path: path.into(),
            value,
            access: StateAccess::WriteAsync(Box::new(set)),
        }
    }
}

/// What a successful synchronous setter decided.
#[derive(Debug, Clone, PartialEq)]
pub struct SetOutcome {
    value: Option<Value>,
    notify: bool,
}

impl SetOutcome {
    /// Accept the incoming value as-is and notify fetchers.
    #[must_use]
    pub fn accepted() -> Self {
        Self {
            value: None,
            notify: true,
        }
    }

    /// Accept but store this value instead of the incoming one.
    #[must_use]
    pub fn with_value(value: Value) -> Self {
        Self {
            value: Some(value),
            notify: true,
        }
    }

    /// Suppress the `change` notification for this mutation.
    #[must_use]
    pub fn silent(mut self) -> Self {
        self.notify = false;
        self
    }
}

impl Default for SetOutcome {
    fn default() -> Self {
        Self::accepted()
    }
}

struct StateInner {
    path: String,
    value: Value,
    // None only while the setter is running; dispatch is not reentrant.
    access: Option<StateAccess>,
}

pub(crate) struct StateEntry {
    inner: RefCell<StateInner>,
}

impl StateEntry {
    fn path(&self) -> String {
        self.inner.borrow().path.clone()
    }

    fn cached(&self) -> Value {
        self.inner.borrow().value.clone()
    }

    fn set_cached(&self, value: Value) {
        self.inner.borrow_mut().value = value;
    }

    fn restore(&self, access: StateAccess) {
        self.inner.borrow_mut().access = Some(access);
    }
}

/// Client-side handle to a registered state.
#[derive(Clone)]
pub struct StateHandle {
    entry: Rc<StateEntry>,
}

pub(super) fn build_handle(descriptor: StateDescriptor) -> StateHandle {
    let StateDescriptor {
        path,
        value,
        access,
    } = descriptor;
    StateHandle {
        entry: Rc::new(StateEntry {
            inner: RefCell::new(StateInner {
                path,
                value,
                access: Some(access),
            }),
        }),
    }
}

impl StateHandle {
    /// Path the state is registered under.
    #[must_use]
    pub fn path(&self) -> String {
        self.entry.path()
    }

    /// The locally cached value.
    #[must_use]
    pub fn value(&self) -> Value {
        self.entry.cached()
    }

    /// Whether the state is currently registered on the connection.
    #[must_use]
    pub fn is_added(&self, peer: &Peer) -> bool {
        peer.is_dispatching(&self.path())
    }

    /// Pushes a new value: updates the cache, notifies matching fetchers
    /// with a `change` event and schedules a flush.
    ///
    /// This is the path for mutations originating on this peer rather
    /// than from an inbound set.
    ///
    /// # Errors
    ///
    /// Returns [`PeerError`] when the flush fails.
    pub fn set_value(&self, peer: &mut Peer, value: Value) -> Result<(), PeerError> {
        self.entry.set_cached(value.clone());
        queue_change(peer, &self.path(), value);
        peer.flush_if_idle()
    }

    /// Re-registers the state after a removal, optionally replacing the
    /// cached value first.
    ///
    /// # Errors
    ///
    /// Returns [`PeerError::AlreadyRegistered`] without any round trip
    /// when the handle is still registered.
    pub fn add(
        &self,
        peer: &mut Peer,
        value: Option<Value>,
        callbacks: Option<Callbacks>,
    ) -> Result<(), PeerError> {
        if self.is_added(peer) {
            return Err(PeerError::AlreadyRegistered { path: self.path() });
        }
        if let Some(value) = value {
            self.entry.set_cached(value);
        }
        self.register(peer, callbacks)
    }

    /// Unregisters the state.
    ///
    /// Removing a state that is not registered succeeds immediately with
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
        peer.register_resource(self.path(), Some(self.entry.cached()), dispatcher, callbacks)
    }
}

impl Dispatch for StateEntry {
    fn dispatch(self: Rc<Self>, peer: &mut Peer, request: Request) {
        let incoming = request
            .params
            .get("value")
            .cloned()
            .unwrap_or(Value::Null);
        let Some(access) = self.inner.borrow_mut().access.take() else {
            warn!(target: DISPATCH_TARGET, path = %self.path(), "state dispatch re-entered");
            return;
        };
        match access {
            StateAccess::ReadOnly => {
                self.restore(StateAccess::ReadOnly);
                if let Some(id) = request.id {
                    peer.queue_response(Response::error(id, ErrorObject::invalid_params(None)));
                }
            }
            StateAccess::Write(mut set) => {
                let outcome = set(&incoming);
                self.restore(StateAccess::Write(set));
                match outcome {
                    Ok(outcome) => {
                        let stored = outcome.value.unwrap_or(incoming);
                        self.set_cached(stored.clone());
                        if let Some(id) = request.id {
                            peer.queue_response(Response::result(id, Value::Bool(true)));
                        }
                        if outcome.notify {
                            queue_change(peer, &self.path(), stored);
                        }
                    }
                    Err(failure) => answer_failure(peer, request.id, &self.path(), &failure),
                }
            }
            StateAccess::WriteAsync(mut set) => {
                let answered = Rc::new(Cell::new(false));
                let reply = StateReply {
                    request_id: request.id.clone(),
                    entry: Rc::clone(&self),
                    requested: incoming.clone(),
                    answered: Rc::clone(&answered),
                };
                let run = set(peer, incoming, reply);
                self.restore(StateAccess::WriteAsync(set));
                if let Err(failure) = run {
                    if answered.get() {
                        warn!(
                            target: DISPATCH_TARGET,
                            path = %self.path(),
                            error = %failure,
                            "setter failed after replying"
                        );
                    } else {
                        answer_failure(peer, request.id, &self.path(), &failure);
                    }
                }
            }
        }
    }
}

/// Response sent through a [`StateReply`] token.
///
/// The default response carries neither result nor error and is answered
/// as an invalid-async-response internal error, mirroring how an empty
/// reply is treated.
#[derive(Debug, Default)]
pub struct StateResponse {
    result: Option<Value>,
    error: Option<HandlerError>,
    value: Option<Value>,
    dont_notify: bool,
    dont_flush: bool,
}

impl StateResponse {
    /// The set was applied; answer `true` and notify fetchers.
    #[must_use]
    pub fn accepted() -> Self {
        Self {
            result: Some(Value::Bool(true)),
            ..Self::default()
        }
    }

    /// The set was rejected with the given failure.
    #[must_use]
    pub fn rejected(failure: impl Into<HandlerError>) -> Self {
        Self {
            error: Some(failure.into()),
            ..Self::default()
        }
    }

    /// Store this value instead of the one the daemon sent.
    #[must_use]
    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    /// Suppress the `change` notification for this mutation.
    #[must_use]
    pub fn without_notification(mut self) -> Self {
        self.dont_notify = true;
        self
    }

    /// Suppress the implicit flush this reply would otherwise trigger.
    #[must_use]
    pub fn without_flush(mut self) -> Self {
        self.dont_flush = true;
        self
    }
}

/// Single-shot completion token handed to asynchronous state setters.
///
/// Consuming the token answers the pending set request; dropping it
/// without sending leaves the request permanently unanswered from this
/// peer.
pub struct StateReply {
    request_id: Option<Value>,
    entry: Rc<StateEntry>,
    requested: Value,
    answered: Rc<Cell<bool>>,
}

impl StateReply {
    /// Answers the pending set request.
    ///
    /// On an accepted response the cached value updates to the response's
    /// override or the requested value, and matching fetchers observe a
    /// `change` notification unless the response opted out.
    ///
    /// # Errors
    ///
    /// Returns [`PeerError`] when the implicit flush fails.
    pub fn send(self, peer: &mut Peer, response: StateResponse) -> Result<(), PeerError> {
        let Self {
            request_id,
            entry,
            requested,
            answered,
        } = self;
        answered.set(true);
        let StateResponse {
            result,
            error,
            value,
            dont_notify,
            dont_flush,
        } = response;
        let path = entry.path();
        let accepted = result.is_some() && error.is_none();
        if let Some(id) = request_id {
            let wire = match (result, error) {
                (Some(result), None) => Response::result(id, result),
                (_, Some(failure)) => Response::error(id, failure.into()),
                (None, None) => Response::error(id, invalid_async_response("state", &path)),
            };
            peer.queue_response(wire);
        }
        if accepted && !dont_notify {
            let stored = value.unwrap_or(requested);
            entry.set_cached(stored.clone());
            queue_change(peer, &path, stored);
        }
        if dont_flush { Ok(()) } else { peer.flush_if_idle() }
    }
}

fn queue_change(peer: &mut Peer, path: &str, value: Value) {
    peer.queue_message(
        Request::notification("change", json!({ "path": path, "value": value })).into(),
    );
}
