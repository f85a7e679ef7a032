//! Server handler trait
//!
//! Application hook points for the server core: an authorization predicate
//! evaluated before a connection is registered, and connect/disconnect
//! notifications. Message semantics stay inside the router; the handler
//! never sees individual envelopes.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Instant;

use crate::registry::ClientId;

/// Context describing one accepted client
#[derive(Debug, Clone)]
pub struct ClientCtx {
    /// Unique client identifier
    pub id: ClientId,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// When the connection was accepted
    pub connected_at: Instant,
}

impl ClientCtx {
    /// Create a new context
    pub fn new(id: ClientId, peer_addr: SocketAddr) -> Self {
        Self {
            id,
            peer_addr,
            connected_at: Instant::now(),
        }
    }
}

/// Application callbacks for the server core
///
/// All methods have default implementations; implement only what you need.
pub trait ServerHandler: Send + Sync + 'static {
    /// Authorization predicate, evaluated after the upgrade handshake and
    /// before registration. Returning false closes the transport without
    /// registering the connection.
    fn authorize(&self, peer_addr: SocketAddr) -> impl Future<Output = bool> + Send {
        let _ = peer_addr;
        async { true }
    }

    /// Called once the connection is registered and its read loop is live
    fn on_connect(&self, ctx: &ClientCtx) -> impl Future<Output = ()> + Send {
        let _ = ctx;
        async {}
    }

    /// Called after the connection is unregistered and torn down
    fn on_disconnect(&self, ctx: &ClientCtx) -> impl Future<Output = ()> + Send {
        let _ = ctx;
        async {}
    }
}

/// Handler that admits every connection and ignores lifecycle events
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl ServerHandler for AcceptAll {}
