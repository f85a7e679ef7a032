//! Client entry and liveness types
//!
//! This module defines the per-connection state stored in the registry.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Unique identifier for a registered client
///
/// Opaque to callers; minted from a process-wide counter at accept time and
/// collision-free within the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    /// Create an identifier from its raw value
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw value of the identifier
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Liveness state of a client
///
/// Two-state machine driven by the liveness monitor: a sweep moves `Alive`
/// entries to `PendingPong` and evicts entries still `PendingPong` from the
/// previous sweep; the pong-receipt path moves entries back to `Alive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Responded to the last probe
    Alive,
    /// Probed, pong not yet received
    PendingPong,
}

const LIVENESS_ALIVE: u8 = 0;
const LIVENESS_PENDING: u8 = 1;

/// Command consumed by a connection's writer path
///
/// All wire writes for one client are performed by its connection task,
/// which serializes the socket without a per-frame lock. Data frames
/// arrive through the bounded outbound queue; probes through the
/// single-slot probe channel.
#[derive(Debug, Clone)]
pub enum OutboundFrame {
    /// Serialized envelope, sent as a text frame
    Message(String),
    /// Transport-level liveness probe (never visible to handlers)
    Ping,
}

/// Error type for enqueueing onto a client's outbound queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// Queue is full (slow consumer); that one delivery is dropped
    QueueFull,
    /// Connection task has stopped consuming (mid-teardown)
    Closed,
}

impl std::fmt::Display for EnqueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnqueueError::QueueFull => write!(f, "Outbound queue full"),
            EnqueueError::Closed => write!(f, "Outbound queue closed"),
        }
    }
}

impl std::error::Error for EnqueueError {}

/// Entry for a single client in the registry
pub struct ClientEntry {
    /// Unique client identifier
    id: ClientId,

    /// Remote peer address
    peer_addr: SocketAddr,

    /// When the connection was accepted
    connected_at: Instant,

    /// Sender half of the connection's outbound queue
    outbound: mpsc::Sender<OutboundFrame>,

    /// Single-slot channel for liveness probes, separate from the data queue
    ping: mpsc::Sender<()>,

    /// Cancelled to force teardown (eviction, shutdown)
    cancel: CancellationToken,

    /// Current liveness state
    liveness: AtomicU8,

    /// Last inbound activity (frame or pong)
    last_activity: Mutex<Instant>,
}

impl ClientEntry {
    /// Create a new entry in the `Alive` state
    pub fn new(
        id: ClientId,
        peer_addr: SocketAddr,
        outbound: mpsc::Sender<OutboundFrame>,
        ping: mpsc::Sender<()>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            peer_addr,
            connected_at: Instant::now(),
            outbound,
            ping,
            cancel,
            liveness: AtomicU8::new(LIVENESS_ALIVE),
            last_activity: Mutex::new(Instant::now()),
        }
    }

    /// Client identifier
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Remote peer address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// When the connection was accepted
    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// Current liveness state
    pub fn liveness(&self) -> Liveness {
        match self.liveness.load(Ordering::Acquire) {
            LIVENESS_ALIVE => Liveness::Alive,
            _ => Liveness::PendingPong,
        }
    }

    /// Transition to `PendingPong` for a new probe round
    ///
    /// Returns the state the entry was in before the transition, which the
    /// sweep uses to detect entries that missed the previous round-trip.
    pub fn mark_probed(&self) -> Liveness {
        match self.liveness.swap(LIVENESS_PENDING, Ordering::AcqRel) {
            LIVENESS_ALIVE => Liveness::Alive,
            _ => Liveness::PendingPong,
        }
    }

    /// Record a pong receipt, transitioning `PendingPong` back to `Alive`
    ///
    /// Returns false when the entry was not awaiting a pong.
    pub fn mark_pong(&self) -> bool {
        self.touch();
        self.liveness
            .compare_exchange(
                LIVENESS_PENDING,
                LIVENESS_ALIVE,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Record inbound activity
    pub fn touch(&self) {
        if let Ok(mut at) = self.last_activity.lock() {
            *at = Instant::now();
        }
    }

    /// Time of the last inbound activity
    pub fn last_activity(&self) -> Instant {
        self.last_activity
            .lock()
            .map(|at| *at)
            .unwrap_or(self.connected_at)
    }

    /// Enqueue a frame for delivery, without blocking
    ///
    /// A full queue means a slow consumer; the caller drops that one
    /// delivery rather than stalling delivery to other clients.
    pub fn try_enqueue(&self, frame: OutboundFrame) -> Result<(), EnqueueError> {
        self.outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EnqueueError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    /// Enqueue a liveness probe on the dedicated probe slot
    ///
    /// Probes bypass the data queue, so fan-out congestion can never
    /// swallow one and read as client death. At most one probe can be
    /// outstanding; a second enqueue while it waits reports `QueueFull`.
    pub fn try_ping(&self) -> Result<(), EnqueueError> {
        self.ping.try_send(()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EnqueueError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    /// Force teardown of the connection task
    ///
    /// Idempotent; the task drops the transport without a close handshake.
    pub fn force_close(&self) {
        self.cancel.cancel();
    }

    /// Whether teardown has been requested
    pub fn is_closing(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl std::fmt::Debug for ClientEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientEntry")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("liveness", &self.liveness())
            .field("closing", &self.is_closing())
            .finish()
    }
}
