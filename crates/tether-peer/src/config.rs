//! Construction-time configuration and host hooks.

use std::fmt;

use tether_proto::Request;
use url::Url;

use crate::connection::Peer;
use crate::transport::TransportError;

/// Daemon endpoint assumed when the host does not configure one.
pub const DEFAULT_DAEMON_URL: &str = "ws://127.0.0.1:11123";

/// Static configuration captured when the peer is constructed.
#[derive(Debug, Clone, Default)]
pub struct PeerConfig {
    /// Daemon endpoint; informational for the engine, which never opens
    /// the socket itself. `None` means [`DEFAULT_DAEMON_URL`].
    pub url: Option<Url>,
    /// Peer name announced to the daemon via a `config` request during
    /// the open handshake.
    pub name: Option<String>,
}

impl PeerConfig {
    /// Configuration announcing the given peer name on connect.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            url: None,
            name: Some(name.into()),
        }
    }
}

type OpenHook = Box<dyn FnMut(&mut Peer)>;
type CloseHook = Box<dyn FnMut(&mut Peer)>;
type ErrorHook = Box<dyn FnMut(&mut Peer, &TransportError)>;
type WireTap = Box<dyn FnMut(&[u8])>;
type NoDispatcherHook = Box<dyn FnMut(&mut Peer, &Request)>;

/// Callbacks through which the engine reports connection events.
///
/// Every hook is optional; an empty set is the default. The wire taps
/// observe raw frames in the negotiated encoding, before decoding on the
/// inbound side and after encoding on the outbound side.
#[derive(Default)]
pub struct PeerHooks {
    pub(crate) on_open: Option<OpenHook>,
    pub(crate) on_close: Option<CloseHook>,
    pub(crate) on_error: Option<ErrorHook>,
    pub(crate) on_send: Option<WireTap>,
    pub(crate) on_receive: Option<WireTap>,
    pub(crate) on_no_dispatcher: Option<NoDispatcherHook>,
}

impl PeerHooks {
    /// Empty hook set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once the connection is ready, after the name handshake when
    /// one is configured.
    #[must_use]
    pub fn on_open(mut self, hook: impl FnMut(&mut Peer) + 'static) -> Self {
        self.on_open = Some(Box::new(hook));
        self
    }

    /// Called when the connection has closed.
    #[must_use]
    pub fn on_close(mut self, hook: impl FnMut(&mut Peer) + 'static) -> Self {
        self.on_close = Some(Box::new(hook));
        self
    }

    /// Called when the transport reports a failure.
    #[must_use]
    pub fn on_error(mut self, hook: impl FnMut(&mut Peer, &TransportError) + 'static) -> Self {
        self.on_error = Some(Box::new(hook));
        self
    }

    /// Observes every outbound frame after encoding.
    #[must_use]
    pub fn on_send(mut self, tap: impl FnMut(&[u8]) + 'static) -> Self {
        self.on_send = Some(Box::new(tap));
        self
    }

    /// Observes every inbound frame before decoding.
    #[must_use]
    pub fn on_receive(mut self, tap: impl FnMut(&[u8]) + 'static) -> Self {
        self.on_receive = Some(Box::new(tap));
        self
    }

    /// Called for inbound requests no dispatcher is registered for.
    #[must_use]
    pub fn on_no_dispatcher(mut self, hook: impl FnMut(&mut Peer, &Request) + 'static) -> Self {
        self.on_no_dispatcher = Some(Box::new(hook));
        self
    }
}

impl fmt::Debug for PeerHooks {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("PeerHooks")
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_send", &self.on_send.is_some())
            .field("on_receive", &self.on_receive.is_some())
            .field("on_no_dispatcher", &self.on_no_dispatcher.is_some())
            .finish()
    }
}
