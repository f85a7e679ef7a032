//! Server core
//!
//! Accepts transport sessions, registers them, runs one actor per
//! connection, and wires teardown back into the registry.

pub mod config;
pub(crate) mod connection;
pub mod handler;
pub mod listener;

pub use config::ServerConfig;
pub use handler::{AcceptAll, ClientCtx, ServerHandler};
pub use listener::WsServer;
