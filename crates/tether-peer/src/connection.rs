//! Connection core: lifecycle, request correlation, inbound dispatch and
//! outbound flushing.

use serde_json::{Value, json};
use tracing::{debug, warn};

use tether_proto::{Encoding, ErrorObject, Inbound, Request, Response};

use crate::config::{PeerConfig, PeerHooks};
use crate::correlation::{Callbacks, Completion, CorrelationTable, PendingRequest};
use crate::dispatch::DispatchTable;
use crate::errors::PeerError;
use crate::queue::OutboundQueue;
use crate::transport::{Transport, TransportError};

pub(crate) const CONNECTION_TARGET: &str = "tether_peer::connection";
pub(crate) const DISPATCH_TARGET: &str = "tether_peer::dispatch";

/// Fetcher ids live in a keyspace of their own; the prefix keeps them
/// disjoint from daemon-wide paths inside the dispatch table.
pub(crate) const FETCH_ID_PREFIX: &str = "__f__";

/// Lifecycle of the connection a peer is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// The transport has not reported open yet; outbound traffic queues.
    Connecting,
    /// The connection is ready; flushes reach the wire.
    Open,
    /// This peer asked the transport to close.
    Closing,
    /// The connection is gone; requests fail fast.
    Closed,
}

/// One peer connection: the engine behind states, methods and fetchers.
///
/// A peer owns its outbound queue, correlation table and dispatch table;
/// nothing is shared between connections. The host owns the socket and
/// drives the engine by forwarding transport events to the `handle_*`
/// methods; everything else happens through the public façade (states,
/// methods, fetchers, `set`/`call`).
///
/// The engine is single-threaded and cooperative. Handlers and callbacks
/// run on the host's thread, never reentrantly; the only suspension
/// points are the asynchronous handler boundaries, whose reply tokens
/// may be invoked from any later turn.
pub struct Peer {
    state: ConnectionState,
    transport: Box<dyn Transport>,
    config: PeerConfig,
    hooks: PeerHooks,
    encoding: Encoding,
    queue: OutboundQueue,
    correlation: CorrelationTable,
    dispatch: DispatchTable,
    fetch_counter: u64,
    flush_guards: u32,
}

impl Peer {
    /// Binds a new peer to the sending half of a connection.
    ///
    /// The peer starts in [`ConnectionState::Connecting`]; traffic queues
    /// until the host reports [`Peer::handle_open`].
    #[must_use]
    pub fn new(transport: Box<dyn Transport>, config: PeerConfig, hooks: PeerHooks) -> Self {
        Self {
            state: ConnectionState::Connecting,
            transport,
            config,
            hooks,
            encoding: Encoding::default(),
            queue: OutboundQueue::default(),
            correlation: CorrelationTable::default(),
            dispatch: DispatchTable::default(),
            fetch_counter: 0,
            flush_guards: 0,
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    /// Encoding currently used in both directions.
    #[must_use]
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// The configuration this peer was constructed with.
    #[must_use]
    pub fn config(&self) -> &PeerConfig {
        &self.config
    }

    /// The transport reported open: run the name handshake and flush
    /// whatever queued while connecting.
    ///
    /// # Errors
    ///
    /// Returns [`PeerError`] when the handshake or the flush cannot reach
    /// the transport.
    pub fn handle_open(&mut self) -> Result<(), PeerError> {
        self.state = ConnectionState::Open;
        if let Some(name) = self.config.name.clone() {
            let callbacks = Callbacks::new()
                .on_success(|peer, _result| {
                    peer.flush_and_log();
                    peer.fire_open();
                })
                .on_error(|peer, error| {
                    warn!(
                        target: CONNECTION_TARGET,
                        code = error.code,
                        message = %error.message,
                        "name handshake rejected"
                    );
                    if let Err(close_error) = peer.close() {
                        warn!(
                            target: CONNECTION_TARGET,
                            error = %close_error,
                            "closing after rejected handshake failed"
                        );
                    }
                });
            self.service(
                "config",
                json!({ "name": name }),
                Completion::None,
                Some(callbacks),
            )?;
        } else {
            self.fire_open();
        }
        self.flush()
    }

    /// The transport delivered one wire frame.
    ///
    /// Messages inside the frame dispatch in order; responses produced by
    /// their handlers coalesce into a single outbound frame flushed at
    /// the end of the cycle. Undecodable frames and unroutable messages
    /// are protocol errors: logged and dropped, the connection stays
    /// open.
    pub fn handle_frame(&mut self, raw: &[u8]) {
        self.tap_receive(raw);
        self.flush_guards += 1;
        match self.encoding.decode(raw) {
            Ok(frame) => {
                for message in frame.into_messages() {
                    self.dispatch_message(message);
                }
            }
            Err(error) => {
                warn!(target: CONNECTION_TARGET, %error, "dropping undecodable frame");
            }
        }
        self.flush_guards -= 1;
        self.flush_and_log();
    }

    /// The transport reported a failure: the connection is done for.
    ///
    /// Pending requests resolve with a synthesized connection-closed
    /// error before the `on_error` hook fires.
    pub fn handle_error(&mut self, error: &TransportError) {
        self.state = ConnectionState::Closed;
        self.abandon_pending();
        self.fire_error(error);
    }

    /// The transport reported close.
    ///
    /// Pending requests resolve with a synthesized connection-closed
    /// error before the `on_close` hook fires.
    pub fn handle_close(&mut self) {
        self.state = ConnectionState::Closed;
        self.abandon_pending();
        self.fire_close();
    }

    /// Flushes pending traffic and asks the transport to close.
    ///
    /// # Errors
    ///
    /// Returns [`PeerError`] when the final flush or the close request
    /// fails.
    pub fn close(&mut self) -> Result<(), PeerError> {
        if self.state == ConnectionState::Closed {
            return Ok(());
        }
        self.flush()?;
        self.state = ConnectionState::Closing;
        self.transport.close()?;
        Ok(())
    }

    /// Runs `actions` with auto-flush suspended, then flushes once.
    ///
    /// Every message queued inside `actions` leaves as a single wire
    /// frame, in call order. Nested batches flush once, at the end of the
    /// outermost one.
    ///
    /// # Errors
    ///
    /// Returns [`PeerError`] when the final flush fails.
    pub fn batch(&mut self, actions: impl FnOnce(&mut Self)) -> Result<(), PeerError> {
        self.flush_guards += 1;
        actions(self);
        self.flush_guards -= 1;
        self.flush_if_idle()
    }

    /// Announces an alternate wire encoding to the daemon.
    ///
    /// The switch applies to both directions atomically once the daemon
    /// acknowledges, before the caller's success callback runs; frames
    /// sent or received in between stay in the old encoding.
    ///
    /// # Errors
    ///
    /// Returns [`PeerError`] when the connection is closed or the request
    /// cannot be flushed.
    pub fn set_encoding(
        &mut self,
        encoding: Encoding,
        callbacks: Option<Callbacks>,
    ) -> Result<(), PeerError> {
        // Always correlated: switching before the daemon agrees would
        // desynchronize the two directions.
        let callbacks = callbacks.unwrap_or_default();
        self.service(
            "config",
            json!({ "encoding": encoding.to_string() }),
            Completion::SwitchEncoding(encoding),
            Some(callbacks),
        )?;
        self.flush_if_idle()
    }

    /// Issues a request, or a notification when no callbacks are given.
    ///
    /// With callbacks the request gets the next id and the completion is
    /// finalized when the response is correlated. Without callbacks no
    /// response will ever come, so the completion is applied immediately
    /// and optimistically.
    pub(crate) fn service(
        &mut self,
        method: &str,
        mut params: Value,
        completion: Completion,
        callbacks: Option<Callbacks>,
    ) -> Result<(), PeerError> {
        if matches!(self.state, ConnectionState::Closing | ConnectionState::Closed) {
            return Err(PeerError::ConnectionClosed);
        }
        match callbacks {
            Some(callbacks) => {
                if let (Some(timeout), Value::Object(map)) = (callbacks.timeout, &mut params) {
                    map.insert("timeout".to_owned(), Value::from(timeout.as_secs_f64()));
                }
                let id = self.correlation.allocate();
                self.correlation.insert(
                    id,
                    PendingRequest {
                        completion,
                        callbacks,
                    },
                );
                self.queue.push(Request::with_id(id, method, params).into());
            }
            None => {
                self.apply_completion(completion, true);
                self.queue.push(Request::notification(method, params).into());
            }
        }
        Ok(())
    }

    /// Appends an already-shaped message to the outbound queue.
    pub(crate) fn queue_message(&mut self, message: Value) {
        self.queue.push(message);
    }

    /// Appends a response to the outbound queue.
    pub(crate) fn queue_response(&mut self, response: Response) {
        self.queue.push(response.into());
    }

    /// Sends everything queued as one frame; a no-op while connecting or
    /// on an empty queue. A transport failure closes the connection.
    pub(crate) fn flush(&mut self) -> Result<(), PeerError> {
        if self.state != ConnectionState::Open {
            return Ok(());
        }
        let Some(frame) = self.queue.drain() else {
            return Ok(());
        };
        let raw = self.encoding.encode(&frame)?;
        self.tap_send(&raw);
        if let Err(error) = self.transport.send(&raw) {
            self.state = ConnectionState::Closed;
            self.abandon_pending();
            self.fire_error(&error);
            return Err(PeerError::Transport(error));
        }
        Ok(())
    }

    /// Flushes unless a dispatch cycle or batch is in progress.
    pub(crate) fn flush_if_idle(&mut self) -> Result<(), PeerError> {
        if self.flush_guards == 0 {
            self.flush()
        } else {
            Ok(())
        }
    }

    /// Flush variant for contexts that cannot propagate the error.
    pub(crate) fn flush_and_log(&mut self) {
        if let Err(error) = self.flush() {
            warn!(target: CONNECTION_TARGET, %error, "flush failed");
        }
    }

    /// Whether a dispatcher is registered under the key right now.
    pub(crate) fn is_dispatching(&self, key: &str) -> bool {
        self.dispatch.contains(key)
    }

    /// Allocates the next fetcher id.
    pub(crate) fn allocate_fetch_id(&mut self) -> String {
        let id = format!("{FETCH_ID_PREFIX}{}", self.fetch_counter);
        self.fetch_counter += 1;
        id
    }

    fn dispatch_message(&mut self, message: Value) {
        match Inbound::from_value(message) {
            Inbound::Request(request) => self.dispatch_request(request),
            Inbound::Response(response) => self.dispatch_response(response),
            Inbound::Other(value) => {
                warn!(target: CONNECTION_TARGET, message = %value, "dropping unroutable message");
            }
        }
    }

    fn dispatch_request(&mut self, request: Request) {
        if let Some(dispatcher) = self.dispatch.get(&request.method) {
            debug!(target: DISPATCH_TARGET, method = %request.method, "dispatching request");
            dispatcher.dispatch(self, request);
            return;
        }
        warn!(target: DISPATCH_TARGET, method = %request.method, "no dispatcher registered");
        self.fire_no_dispatcher(&request);
        if let Some(id) = request.id {
            self.queue_response(Response::error(
                id,
                ErrorObject::method_not_found(request.method),
            ));
        }
    }

    fn dispatch_response(&mut self, response: Response) {
        let Some(id) = response.id.as_ref().and_then(Value::as_u64) else {
            warn!(target: CONNECTION_TARGET, "dropping response without usable id");
            return;
        };
        // Remove before firing anything, so the entry cannot resolve twice.
        let Some(pending) = self.correlation.remove(id) else {
            warn!(target: CONNECTION_TARGET, id, "dropping response with unmatched id");
            return;
        };
        let PendingRequest {
            completion,
            callbacks,
        } = pending;
        match (response.result, response.error) {
            (Some(result), _) => {
                self.apply_completion(completion, true);
                if let Some(callback) = callbacks.success {
                    callback(self, result);
                }
            }
            (None, Some(error)) => {
                self.apply_completion(completion, false);
                if let Some(callback) = callbacks.error {
                    callback(self, error);
                }
            }
            (None, None) => {
                warn!(
                    target: CONNECTION_TARGET,
                    id, "dropping response carrying neither result nor error"
                );
            }
        }
    }

    fn apply_completion(&mut self, completion: Completion, success: bool) {
        if !success {
            return;
        }
        match completion {
            Completion::None => {}
            Completion::Install { key, dispatcher } => {
                self.dispatch.insert(key, dispatcher);
            }
            Completion::Uninstall { key } => {
                self.dispatch.remove(&key);
            }
            Completion::SwitchEncoding(encoding) => {
                debug!(target: CONNECTION_TARGET, %encoding, "switching wire encoding");
                self.encoding = encoding;
            }
        }
    }

    fn abandon_pending(&mut self) {
        for (id, pending) in self.correlation.drain() {
            debug!(target: CONNECTION_TARGET, id, "abandoning pending request");
            let PendingRequest {
                completion,
                callbacks,
            } = pending;
            self.apply_completion(completion, false);
            if let Some(callback) = callbacks.error {
                callback(self, ErrorObject::connection_closed());
            }
        }
    }

    pub(crate) fn fire_open(&mut self) {
        if let Some(mut hook) = self.hooks.on_open.take() {
            hook(self);
            self.hooks.on_open = Some(hook);
        }
    }

    fn fire_close(&mut self) {
        if let Some(mut hook) = self.hooks.on_close.take() {
            hook(self);
            self.hooks.on_close = Some(hook);
        }
    }

    fn fire_error(&mut self, error: &TransportError) {
        if let Some(mut hook) = self.hooks.on_error.take() {
            hook(self, error);
            self.hooks.on_error = Some(hook);
        }
    }

    fn fire_no_dispatcher(&mut self, request: &Request) {
        if let Some(mut hook) = self.hooks.on_no_dispatcher.take() {
            hook(self, request);
            self.hooks.on_no_dispatcher = Some(hook);
        }
    }

    fn tap_send(&mut self, raw: &[u8]) {
        if let Some(tap) = &mut self.hooks.on_send {
            tap(raw);
        }
    }

    fn tap_receive(&mut self, raw: &[u8]) {
        if let Some(tap) = &mut self.hooks.on_receive {
            tap(raw);
        }
    }
}
