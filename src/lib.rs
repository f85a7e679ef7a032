//! WebSocket fan-out server with liveness detection and typed routing
//!
//! A server core for real-time applications: it manages a concurrent set of
//! long-lived bidirectional connections, detects silent failures with a
//! ping/pong sweep, and routes typed JSON envelopes: `chat` broadcast,
//! `notification` acks and directed sends, structured `error` replies.
//!
//! # Architecture
//!
//! ```text
//!   accept loop ──► upgrade ──► authorize ──► register ──► connection task
//!                                                │              │
//!                                        ClientRegistry    read loop:
//!                                                ▲          decode ──► Router
//!                                                │                       │
//!   LivenessMonitor ── ping / evict ─────────────┘      snapshot fan-out ┘
//! ```
//!
//! Each connection task is the sole owner of its transport; every wire
//! write for a client flows through that client's bounded outbound queue.
//! The registry is the only state shared across tasks.
//!
//! # Example
//!
//! ```no_run
//! use ws_fanout::{ServerConfig, WsServer, AcceptAll};
//!
//! #[tokio::main]
//! async fn main() -> ws_fanout::Result<()> {
//!     let config = ServerConfig::with_addr("127.0.0.1:9001".parse().unwrap());
//!     let server = WsServer::new(config, AcceptAll);
//!     server.run().await
//! }
//! ```

pub mod error;
pub mod monitor;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod server;
pub mod stats;
pub mod transport;

pub use error::{Error, Result};
pub use monitor::LivenessMonitor;
pub use protocol::{Envelope, ErrorCode, MessageKind};
pub use registry::{ClientId, ClientRegistry};
pub use router::Router;
pub use server::{AcceptAll, ClientCtx, ServerConfig, ServerHandler, WsServer};
pub use stats::{ServerStats, StatsSnapshot};
pub use transport::{Inbound, Transport, TransportError, WsTransport};
