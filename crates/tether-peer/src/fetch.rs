//! Fetchers: standing subscriptions to daemon-pushed notifications.
//!
//! Match evaluation and sort computation happen on the daemon; this side
//! only demultiplexes notifications by fetcher id and forwards them to
//! the registered callback.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{Value, json};
use tracing::warn;

use tether_proto::{FetchExpr, FetchUpdate, Request, SortedUpdate};

use crate::connection::{DISPATCH_TARGET, Peer};
use crate::correlation::{Callbacks, Completion};
use crate::dispatch::{Dispatch, Dispatcher};
use crate::errors::PeerError;

type UpdateFn = Box<dyn FnMut(&mut Peer, FetchUpdate, &FetchHandle)>;
type SortedFn = Box<dyn FnMut(&mut Peer, SortedUpdate, &FetchHandle)>;

pub(crate) enum FetchNotify {
    Updates(UpdateFn),
    Sorted(SortedFn),
}

struct FetchInner {
    id: String,
    expr: FetchExpr,
    // None only while a notification is being delivered.
    notify: Option<FetchNotify>,
}

pub(crate) struct FetchEntry {
    inner: RefCell<FetchInner>,
}

impl FetchEntry {
    fn id(&self) -> String {
        self.inner.borrow().id.clone()
    }

    fn expr(&self) -> FetchExpr {
        self.inner.borrow().expr.clone()
    }
}

/// Client-side handle to a fetcher.
#[derive(Clone)]
pub struct FetchHandle {
    entry: Rc<FetchEntry>,
}

impl FetchHandle {
    /// The locally allocated fetcher id.
    #[must_use]
    pub fn id(&self) -> String {
        self.entry.id()
    }

    /// Whether the fetcher is currently subscribed.
    #[must_use]
    pub fn is_fetching(&self, peer: &Peer) -> bool {
        peer.is_dispatching(&self.entry.id())
    }

    /// Re-subscribes with the original expression after an unfetch.
    ///
    /// # Errors
    ///
    /// Returns [`PeerError::AlreadyRegistered`] without any round trip
    /// when the fetcher is still subscribed.
    pub fn fetch(&self, peer: &mut Peer, callbacks: Option<Callbacks>) -> Result<(), PeerError> {
        if self.is_fetching(peer) {
            return Err(PeerError::AlreadyRegistered {
                path: self.entry.id(),
            });
        }
        self.subscribe(peer, callbacks)
    }

    /// Cancels the subscription.
    ///
    /// No notification is delivered once the daemon acknowledges.
    /// Unfetching a fetcher that is not subscribed succeeds immediately
    /// with no round trip.
    ///
    /// # Errors
    ///
    /// Returns [`PeerError`] when the connection is closed or the request
    /// cannot be flushed.
    pub fn unfetch(&self, peer: &mut Peer, callbacks: Option<Callbacks>) -> Result<(), PeerError> {
        if !self.is_fetching(peer) {
            peer.resolve_locally(callbacks);
            return Ok(());
        }
        let id = self.entry.id();
        peer.service(
            "unfetch",
            json!({ "id": id.clone() }),
            Completion::Uninstall { key: id },
            callbacks,
        )?;
        peer.flush_if_idle()
    }

    fn subscribe(&self, peer: &mut Peer, callbacks: Option<Callbacks>) -> Result<(), PeerError> {
        let id = self.entry.id();
        let mut params =
            serde_json::to_value(self.entry.expr()).map_err(tether_proto::CodecError::Json)?;
        if let Value::Object(map) = &mut params {
            map.insert("id".to_owned(), Value::String(id.clone()));
        }
        let dispatcher: Dispatcher = Rc::clone(&self.entry) as Dispatcher;
        peer.service(
            "fetch",
            params,
            Completion::Install {
                key: id,
                dispatcher,
            },
            callbacks,
        )?;
        peer.flush_if_idle()
    }
}

impl Dispatch for FetchEntry {
    fn dispatch(self: Rc<Self>, peer: &mut Peer, request: Request) {
        let Some(mut notify) = self.inner.borrow_mut().notify.take() else {
            warn!(target: DISPATCH_TARGET, id = %self.id(), "fetch dispatch re-entered");
            return;
        };
        let handle = FetchHandle {
            entry: Rc::clone(&self),
        };
        match &mut notify {
            FetchNotify::Updates(callback) => {
                match serde_json::from_value::<FetchUpdate>(request.params) {
                    Ok(update) => callback(peer, update, &handle),
                    Err(error) => {
                        warn!(
                            target: DISPATCH_TARGET,
                            id = %self.id(),
                            %error,
                            "dropping malformed fetch notification"
                        );
                    }
                }
            }
            FetchNotify::Sorted(callback) => {
                match serde_json::from_value::<SortedUpdate>(request.params) {
                    Ok(update) => callback(peer, update, &handle),
                    Err(error) => {
                        warn!(
                            target: DISPATCH_TARGET,
                            id = %self.id(),
                            %error,
                            "dropping malformed sorted fetch notification"
                        );
                    }
                }
            }
        }
        self.inner.borrow_mut().notify = Some(notify);
    }
}

impl Peer {
    /// Subscribes to per-path events for every path matching the
    /// expression.
    ///
    /// A bare string subscribes to every path containing it. The callback
    /// receives one [`FetchUpdate`] per add/change/remove, the peer for
    /// follow-up calls, and the fetcher's own handle.
    ///
    /// # Errors
    ///
    /// Returns [`PeerError::FetchModeMismatch`] when the expression
    /// requests sorting; sorted fetchers deliver batches and belong to
    /// [`Peer::fetch_sorted`].
    pub fn fetch<F>(
        &mut self,
        expr: impl Into<FetchExpr>,
        notify: F,
        callbacks: Option<Callbacks>,
    ) -> Result<FetchHandle, PeerError>
    where
        F: FnMut(&mut Peer, FetchUpdate, &FetchHandle) + 'static,
    {
        let expr = expr.into();
        if expr.is_sorted() {
            return Err(PeerError::FetchModeMismatch);
        }
        self.fetch_with(expr, FetchNotify::Updates(Box::new(notify)), callbacks)
    }

    /// Subscribes to an ordered window over the matching paths.
    ///
    /// The callback receives one [`SortedUpdate`] batch per daemon
    /// recomputation.
    ///
    /// # Errors
    ///
    /// Returns [`PeerError::FetchModeMismatch`] when the expression does
    /// not request sorting.
    pub fn fetch_sorted<F>(
        &mut self,
        expr: FetchExpr,
        notify: F,
        callbacks: Option<Callbacks>,
    ) -> Result<FetchHandle, PeerError>
    where
        F: FnMut(&mut Peer, SortedUpdate, &FetchHandle) + 'static,
    {
        if !expr.is_sorted() {
            return Err(PeerError::FetchModeMismatch);
        }
        self.fetch_with(expr, FetchNotify::Sorted(Box::new(notify)), callbacks)
    }

    fn fetch_with(
        &mut self,
        expr: FetchExpr,
        notify: FetchNotify,
        callbacks: Option<Callbacks>,
    ) -> Result<FetchHandle, PeerError> {
        let id = self.allocate_fetch_id();
        let handle = FetchHandle {
            entry: Rc::new(FetchEntry {
                inner: RefCell::new(FetchInner {
                    id,
                    expr,
                    notify: Some(notify),
                }),
            }),
        };
        handle.subscribe(self, callbacks)?;
        Ok(handle)
    }
}
