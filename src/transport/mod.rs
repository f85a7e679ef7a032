//! Transport abstraction
//!
//! The server core is written against this trait; the RFC 6455 framing and
//! handshake live behind it (`ws::WsTransport`). Ping/pong frames surface
//! here for the liveness monitor but never reach application handlers.

pub mod ws;

use bytes::Bytes;
use std::future::Future;

pub use ws::WsTransport;

/// One inbound event from the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A complete application frame
    Frame(Bytes),
    /// Liveness probe response
    Pong,
    /// Peer closed the session
    Closed,
}

/// Error type for transport operations
#[derive(Debug, Clone)]
pub enum TransportError {
    /// Underlying socket failure
    Io(String),
    /// Protocol violation (bad frame, failed handshake, invalid payload)
    Protocol(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Io(msg) => write!(f, "Transport I/O error: {}", msg),
            TransportError::Protocol(msg) => write!(f, "Transport protocol error: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

/// An accepted, upgraded bidirectional session
///
/// The connection task is the sole owner of the transport, so `&mut self`
/// methods serialize all wire access per connection by construction.
/// A peer-initiated close is `Ok(Inbound::Closed)`; an error is `Err`.
pub trait Transport: Send + 'static {
    /// Send one application frame
    fn send(&mut self, data: Bytes) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receive the next inbound event
    fn receive(&mut self) -> impl Future<Output = Result<Inbound, TransportError>> + Send;

    /// Send a transport-level liveness probe
    fn ping(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Close the session; closing an already-closed session is a no-op
    fn close(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;
}
