//! Correlation of outgoing requests with their eventual single response.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde_json::Value;
use tether_proto::{Encoding, ErrorObject};

use crate::connection::Peer;
use crate::dispatch::Dispatcher;

type SuccessFn = Box<dyn FnOnce(&mut Peer, Value)>;
type ErrorFn = Box<dyn FnOnce(&mut Peer, ErrorObject)>;

/// Caller callbacks bound to one request id.
///
/// Exactly one of the two callbacks fires, exactly once, when the
/// response arrives; both receive the peer so follow-up calls can be
/// issued from inside the callback. Passing callbacks is what turns a
/// service call into an id-bearing request; without them the engine
/// sends a notification and expects no response.
#[derive(Default)]
pub struct Callbacks {
    pub(crate) success: Option<SuccessFn>,
    pub(crate) error: Option<ErrorFn>,
    pub(crate) timeout: Option<Duration>,
}

impl Callbacks {
    /// Empty callback set; the request is still id-bearing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Invoked with the response result.
    #[must_use]
    pub fn on_success(mut self, callback: impl FnOnce(&mut Peer, Value) + 'static) -> Self {
        self.success = Some(Box::new(callback));
        self
    }

    /// Invoked with the response error.
    #[must_use]
    pub fn on_error(mut self, callback: impl FnOnce(&mut Peer, ErrorObject) + 'static) -> Self {
        self.error = Some(Box::new(callback));
        self
    }

    /// Asks the daemon to answer with Response Timeout after the given
    /// duration. The engine itself never times requests out.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Callbacks")
            .field("success", &self.success.is_some())
            .field("error", &self.error.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Engine-internal bookkeeping finalized when a response is correlated,
/// before the caller's own callback runs.
pub(crate) enum Completion {
    /// Nothing to finalize.
    None,
    /// Install a dispatcher under the given key on success.
    Install {
        key: String,
        dispatcher: Dispatcher,
    },
    /// Remove the dispatcher under the given key on success.
    Uninstall { key: String },
    /// Switch both directions to the given encoding on success.
    SwitchEncoding(Encoding),
}

pub(crate) struct PendingRequest {
    pub(crate) completion: Completion,
    pub(crate) callbacks: Callbacks,
}

/// Table of requests awaiting their response, keyed by id.
///
/// Ids increase monotonically for the lifetime of the connection and are
/// therefore never reused while in flight. Entries are removed before
/// their callbacks fire, so a duplicated response cannot fire twice.
#[derive(Default)]
pub(crate) struct CorrelationTable {
    next_id: u64,
    pending: BTreeMap<u64, PendingRequest>,
}

impl CorrelationTable {
    /// Allocates the next request id.
    pub(crate) fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Stores the pending request under its id.
    pub(crate) fn insert(&mut self, id: u64, pending: PendingRequest) {
        self.pending.insert(id, pending);
    }

    /// Removes and returns the pending request for the id, if any.
    pub(crate) fn remove(&mut self, id: u64) -> Option<PendingRequest> {
        self.pending.remove(&id)
    }

    /// Takes every pending request, in ascending id order.
    pub(crate) fn drain(&mut self) -> Vec<(u64, PendingRequest)> {
        std::mem::take(&mut self.pending).into_iter().collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}
