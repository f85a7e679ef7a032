//! Server-wide statistics
//!
//! Plain atomic counters shared by the listener, router, and liveness
//! monitor. Cheap to update on hot paths; read out as a snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

/// Server-wide counters
#[derive(Debug, Default)]
pub struct ServerStats {
    /// Connections accepted over the server lifetime
    pub total_connections: AtomicU64,
    /// Currently registered connections
    pub active_connections: AtomicU64,
    /// Connections rejected (limit reached or authorization denied)
    pub rejected_connections: AtomicU64,
    /// Envelopes successfully dispatched
    pub messages_routed: AtomicU64,
    /// Fan-out deliveries attempted
    pub deliveries: AtomicU64,
    /// Deliveries dropped (slow consumer or send timeout)
    pub dropped_deliveries: AtomicU64,
    /// Inbound frames that failed to decode
    pub decode_errors: AtomicU64,
    /// Clients evicted by the liveness monitor
    pub evictions: AtomicU64,
}

impl ServerStats {
    /// Create zeroed stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            rejected_connections: self.rejected_connections.load(Ordering::Relaxed),
            messages_routed: self.messages_routed.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            dropped_deliveries: self.dropped_deliveries.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connection_closed(&self) {
        // Saturating: closed without a matching open only happens on
        // shutdown races, never underflow the gauge.
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                n.checked_sub(1)
            });
    }
}

/// Point-in-time view of the server counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub total_connections: u64,
    pub active_connections: u64,
    pub rejected_connections: u64,
    pub messages_routed: u64,
    pub deliveries: u64,
    pub dropped_deliveries: u64,
    pub decode_errors: u64,
    pub evictions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_close_gauge() {
        let stats = ServerStats::new();

        stats.connection_opened();
        stats.connection_opened();
        stats.connection_closed();

        let snap = stats.snapshot();
        assert_eq!(snap.total_connections, 2);
        assert_eq!(snap.active_connections, 1);
    }

    #[test]
    fn test_close_never_underflows() {
        let stats = ServerStats::new();

        stats.connection_closed();

        assert_eq!(stats.snapshot().active_connections, 0);
    }

    #[test]
    fn test_snapshot_copies() {
        let stats = ServerStats::new();
        stats.messages_routed.fetch_add(3, Ordering::Relaxed);

        let snap = stats.snapshot();
        stats.messages_routed.fetch_add(1, Ordering::Relaxed);

        assert_eq!(snap.messages_routed, 3);
        assert_eq!(stats.snapshot().messages_routed, 4);
    }
}
