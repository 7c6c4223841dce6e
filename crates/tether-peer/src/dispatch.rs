//! Routing of inbound requests to registered dispatchers.

use std::collections::HashMap;
use std::rc::Rc;

use tether_proto::Request;

use crate::connection::Peer;

/// Capability interface for anything that can answer inbound requests:
/// state setters, method handlers and fetcher demultiplexers.
///
/// Dispatchers receive the peer mutably so they can queue responses and
/// notifications; the `Rc` receiver lets a dispatcher hand out handles
/// to itself (and lets user code unregister it mid-call without
/// invalidating the running dispatch).
pub(crate) trait Dispatch {
    fn dispatch(self: Rc<Self>, peer: &mut Peer, request: Request);
}

pub(crate) type Dispatcher = Rc<dyn Dispatch>;

/// Table of dispatchers keyed by path or fetcher id.
///
/// Fetcher ids carry a reserved prefix, so the two keyspaces cannot
/// collide inside the one map.
#[derive(Default)]
pub(crate) struct DispatchTable {
    entries: HashMap<String, Dispatcher>,
}

impl DispatchTable {
    /// Registers a dispatcher under the given key, replacing any previous
    /// registration.
    pub(crate) fn insert(&mut self, key: String, dispatcher: Dispatcher) {
        self.entries.insert(key, dispatcher);
    }

    /// Unregisters the dispatcher under the given key.
    pub(crate) fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }

    /// Whether a dispatcher is registered under the key.
    pub(crate) fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns the dispatcher registered under the key, if any.
    pub(crate) fn get(&self, key: &str) -> Option<Dispatcher> {
        self.entries.get(key).cloned()
    }
}
