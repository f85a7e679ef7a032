//! Liveness monitoring
//!
//! Periodic sweep that probes every registered client with a transport ping
//! and evicts the ones that missed the previous round-trip. This bounds the
//! reclaim time for a half-open connection (peer vanished without a close
//! frame) to at most two sweep intervals, and never evicts a client earlier
//! than one full interval after its last pong.
//!
//! The per-client state machine has two states, kept on the registry entry:
//!
//! ```text
//!            sweep: probe                sweep: still pending
//!   Alive ───────────────► PendingPong ──────────────────────► evicted
//!     ▲                        │
//!     └────────────────────────┘
//!            pong received
//! ```

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::registry::{ClientRegistry, Liveness};
use crate::stats::ServerStats;

/// Periodic liveness sweeper
pub struct LivenessMonitor {
    registry: Arc<ClientRegistry>,
    stats: Arc<ServerStats>,
    interval: Duration,
}

impl LivenessMonitor {
    /// Create a monitor sweeping at the given interval
    pub fn new(registry: Arc<ClientRegistry>, stats: Arc<ServerStats>, interval: Duration) -> Self {
        Self {
            registry,
            stats,
            interval,
        }
    }

    /// Run one sweep over the current registry snapshot
    ///
    /// Entries still `PendingPong` from the previous sweep are evicted:
    /// forced close (no close handshake) and unregistered. Everything else
    /// gets a ping enqueued and moves to `PendingPong`.
    pub async fn sweep(&self) {
        let entries = self.registry.snapshot().await;

        let mut probed = 0usize;
        let mut evicted = 0usize;

        for entry in entries {
            if entry.is_closing() {
                continue;
            }

            match entry.mark_probed() {
                Liveness::PendingPong => {
                    // Missed a full round-trip interval
                    tracing::info!(
                        client = %entry.id(),
                        peer = %entry.peer_addr(),
                        "Evicting unresponsive client"
                    );
                    entry.force_close();
                    self.registry.unregister(entry.id()).await;
                    self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                    evicted += 1;
                }
                Liveness::Alive => {
                    // The probe has its own single slot, so a data queue
                    // kept full by fan-out traffic cannot swallow it; a
                    // congested but responsive client is never evicted.
                    if let Err(e) = entry.try_ping() {
                        tracing::debug!(client = %entry.id(), error = %e, "Ping not enqueued");
                    }
                    probed += 1;
                }
            }
        }

        tracing::trace!(probed = probed, evicted = evicted, "Liveness sweep");
    }

    /// Spawn the sweep loop as a background task
    ///
    /// The first sweep fires one full interval after spawn. The task stops
    /// when `cancel` is cancelled.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + self.interval;
            let mut ticker = tokio::time::interval_at(start, self.interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => self.sweep().await,
                    _ = cancel.cancelled() => {
                        tracing::debug!("Liveness monitor stopped");
                        return;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ClientEntry, ClientId, EnqueueError, OutboundFrame};
    use tokio::sync::mpsc;

    fn monitor(interval: Duration) -> (Arc<ClientRegistry>, Arc<LivenessMonitor>) {
        let registry = Arc::new(ClientRegistry::new());
        let stats = Arc::new(ServerStats::new());
        let monitor = Arc::new(LivenessMonitor::new(
            Arc::clone(&registry),
            stats,
            interval,
        ));
        (registry, monitor)
    }

    async fn add_client(
        registry: &ClientRegistry,
        id: u64,
    ) -> (Arc<ClientEntry>, mpsc::Receiver<()>) {
        let (tx, _rx) = mpsc::channel(8);
        let (ping_tx, ping_rx) = mpsc::channel(1);
        let entry = Arc::new(ClientEntry::new(
            ClientId::new(id),
            "127.0.0.1:9000".parse().unwrap(),
            tx,
            ping_tx,
            CancellationToken::new(),
        ));
        registry.register(Arc::clone(&entry)).await.unwrap();
        (entry, ping_rx)
    }

    #[tokio::test]
    async fn test_first_sweep_probes_not_evicts() {
        let (registry, monitor) = monitor(Duration::from_secs(30));
        let (_entry, mut ping_rx) = add_client(&registry, 1).await;

        monitor.sweep().await;

        // Probed but still registered: never evicted before one full interval
        assert!(ping_rx.try_recv().is_ok());
        assert!(registry.get(ClientId::new(1)).await.is_some());
    }

    #[tokio::test]
    async fn test_silent_client_evicted_on_second_sweep() {
        let (registry, monitor) = monitor(Duration::from_secs(30));
        let (entry, _ping) = add_client(&registry, 1).await;

        monitor.sweep().await;
        monitor.sweep().await;

        assert!(registry.get(ClientId::new(1)).await.is_none());
        assert!(entry.is_closing());
    }

    #[tokio::test]
    async fn test_responsive_client_survives() {
        let (registry, monitor) = monitor(Duration::from_secs(30));
        let (entry, _ping) = add_client(&registry, 1).await;

        for _ in 0..5 {
            monitor.sweep().await;
            assert!(entry.mark_pong());
        }

        assert!(registry.get(ClientId::new(1)).await.is_some());
        assert!(!entry.is_closing());
    }

    #[tokio::test]
    async fn test_pong_after_eviction_is_noop() {
        let (registry, monitor) = monitor(Duration::from_secs(30));
        let (entry, _ping) = add_client(&registry, 1).await;

        monitor.sweep().await;
        monitor.sweep().await;
        assert!(registry.get(ClientId::new(1)).await.is_none());

        // Late pong: no crash, no resurrection
        entry.mark_pong();
        assert!(registry.get(ClientId::new(1)).await.is_none());
    }

    #[tokio::test]
    async fn test_mixed_sweep_evicts_only_silent() {
        let (registry, monitor) = monitor(Duration::from_secs(30));
        let (alive, _ping_a) = add_client(&registry, 1).await;
        let (_silent, _ping_b) = add_client(&registry, 2).await;

        monitor.sweep().await;
        alive.mark_pong();
        monitor.sweep().await;

        assert!(registry.get(ClientId::new(1)).await.is_some());
        assert!(registry.get(ClientId::new(2)).await.is_none());
    }

    #[tokio::test]
    async fn test_congested_client_still_probed() {
        let (registry, monitor) = monitor(Duration::from_secs(30));

        let (tx, _data_rx) = mpsc::channel(1);
        let (ping_tx, mut ping_rx) = mpsc::channel(1);
        let entry = Arc::new(ClientEntry::new(
            ClientId::new(1),
            "127.0.0.1:9000".parse().unwrap(),
            tx,
            ping_tx,
            CancellationToken::new(),
        ));
        registry.register(Arc::clone(&entry)).await.unwrap();

        // Fan-out backlog keeps the data queue full
        entry
            .try_enqueue(OutboundFrame::Message("backlog".into()))
            .unwrap();
        assert_eq!(
            entry.try_enqueue(OutboundFrame::Message("dropped".into())),
            Err(EnqueueError::QueueFull)
        );

        // The probe lands anyway; a client answering it survives the
        // next sweep, so congestion alone cannot manufacture an eviction
        monitor.sweep().await;
        assert!(ping_rx.try_recv().is_ok());
        assert!(entry.mark_pong());

        monitor.sweep().await;
        assert!(registry.get(ClientId::new(1)).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_sweep_eviction_bounds() {
        let (registry, monitor) = monitor(Duration::from_secs(30));
        let (_entry, _ping) = add_client(&registry, 1).await;

        let cancel = CancellationToken::new();
        let handle = Arc::clone(&monitor).spawn(cancel.clone());

        // One interval in: probed, still registered
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(registry.get(ClientId::new(1)).await.is_some());

        // Two intervals in: evicted
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(registry.get(ClientId::new(1)).await.is_none());

        cancel.cancel();
        handle.await.unwrap();
    }
}
