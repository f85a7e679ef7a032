//! Connection registry
//!
//! The registry is the single piece of state shared across the server: a
//! synchronized map from client identifier to connection entry. The accept
//! path inserts, the teardown path removes, the router iterates a snapshot
//! for fan-out, and the liveness monitor mutates per-entry liveness state.
//!
//! # Architecture
//!
//! ```text
//!                       Arc<ClientRegistry>
//!                  ┌───────────────────────────┐
//!                  │ clients: HashMap<ClientId,│
//!                  │   Arc<ClientEntry {       │
//!                  │     outbound: mpsc::Tx,   │
//!                  │     liveness: AtomicU8,   │
//!                  │     cancel: Token,        │
//!                  │   }>                      │
//!                  │ >                         │
//!                  └────────────┬──────────────┘
//!                               │
//!          ┌────────────────────┼────────────────────┐
//!          │                    │                    │
//!          ▼                    ▼                    ▼
//!     [Accept path]        [Router]         [Liveness monitor]
//!     register()           snapshot()       sweep(): ping/evict
//!     unregister()         try_enqueue() ──► writer task ──► wire
//! ```
//!
//! Each entry's transport handle is owned by exactly one connection task;
//! every wire write for a client goes through that entry's bounded outbound
//! queue, so writes are serialized without a per-socket lock.

pub mod client;
pub mod error;
pub mod store;

pub use client::{ClientEntry, ClientId, EnqueueError, Liveness, OutboundFrame};
pub use error::RegistryError;
pub use store::ClientRegistry;
