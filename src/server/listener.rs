//! WebSocket server listener
//!
//! Owns the accept loop and the shared pieces every connection task needs:
//! registry, router, stats, liveness monitor, and the shutdown token.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::monitor::LivenessMonitor;
use crate::registry::{ClientEntry, ClientId, ClientRegistry};
use crate::router::Router;
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;
use crate::server::handler::{ClientCtx, ServerHandler};
use crate::stats::{ServerStats, StatsSnapshot};
use crate::transport::{Transport, WsTransport};

/// WebSocket fan-out server
pub struct WsServer<H: ServerHandler> {
    config: ServerConfig,
    shared: ConnShared<H>,
    connection_semaphore: Option<Arc<Semaphore>>,
    shutdown: CancellationToken,
}

/// Everything a connection task needs, cheaply cloneable
pub(crate) struct ConnShared<H> {
    pub(crate) config: ServerConfig,
    pub(crate) handler: Arc<H>,
    pub(crate) registry: Arc<ClientRegistry>,
    pub(crate) router: Arc<Router>,
    pub(crate) stats: Arc<ServerStats>,
    pub(crate) next_client_id: Arc<AtomicU64>,
    pub(crate) shutdown: CancellationToken,
}

impl<H> Clone for ConnShared<H> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            handler: Arc::clone(&self.handler),
            registry: Arc::clone(&self.registry),
            router: Arc::clone(&self.router),
            stats: Arc::clone(&self.stats),
            next_client_id: Arc::clone(&self.next_client_id),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<H: ServerHandler> WsServer<H> {
    /// Create a new server with the given configuration and handler
    pub fn new(config: ServerConfig, handler: H) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        let registry = Arc::new(ClientRegistry::new());
        let stats = Arc::new(ServerStats::new());
        let router = Arc::new(Router::new(Arc::clone(&registry), Arc::clone(&stats)));
        let shutdown = CancellationToken::new();

        let shared = ConnShared {
            config: config.clone(),
            handler: Arc::new(handler),
            registry,
            router,
            stats,
            next_client_id: Arc::new(AtomicU64::new(1)),
            shutdown: shutdown.clone(),
        };

        Self {
            config,
            shared,
            connection_semaphore,
            shutdown,
        }
    }

    /// Get a reference to the client registry
    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.shared.registry
    }

    /// Point-in-time server counters
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Run the server
    ///
    /// This method blocks until the process is stopped externally.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Run the server with graceful shutdown
    ///
    /// When `shutdown` resolves: stop accepting, signal every connection
    /// task and the liveness monitor, then wait for the tasks bounded by
    /// `drain_timeout`. Stragglers are aborted; this never hangs on a stuck
    /// socket.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "WebSocket server listening");

        let monitor = Arc::new(LivenessMonitor::new(
            Arc::clone(&self.shared.registry),
            Arc::clone(&self.shared.stats),
            self.config.ping_interval,
        ));
        let monitor_handle = monitor.spawn(self.shutdown.child_token());

        let mut tasks = JoinSet::new();

        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
            }
            _ = self.accept_loop(&listener, &mut tasks) => {}
        }

        // Stop accepting, then signal every connection task and the monitor
        drop(listener);
        self.shutdown.cancel();
        self.shared.registry.clear_and_close().await;

        let drained = tokio::time::timeout(self.config.drain_timeout, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                remaining = tasks.len(),
                "Drain deadline exceeded, aborting remaining connections"
            );
            tasks.shutdown().await;
        }

        let _ = monitor_handle.await;
        tracing::info!("Server stopped");

        Ok(())
    }

    async fn accept_loop(&self, listener: &TcpListener, tasks: &mut JoinSet<()>) {
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((socket, peer_addr)) => self.handle_accept(socket, peer_addr, tasks),
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to accept connection");
                    }
                },
                // Reap finished connection tasks as we go
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }
    }

    fn handle_accept(&self, socket: TcpStream, peer_addr: SocketAddr, tasks: &mut JoinSet<()>) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match Arc::clone(sem).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    self.shared
                        .stats
                        .rejected_connections
                        .fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::debug!(peer = %peer_addr, error = %e, "Failed to set TCP_NODELAY");
            }
        }

        let shared = self.shared.clone();
        tasks.spawn(async move {
            let _permit = permit;
            serve_socket(socket, peer_addr, shared).await;
        });
    }
}

/// Upgrade one accepted socket and hand it to the connection path
async fn serve_socket<H: ServerHandler>(
    socket: TcpStream,
    peer_addr: SocketAddr,
    shared: ConnShared<H>,
) {
    let handshake = WsTransport::accept(socket, shared.config.max_frame_bytes);
    let transport = match tokio::time::timeout(shared.config.handshake_timeout, handshake).await {
        Ok(Ok(transport)) => transport,
        Ok(Err(e)) => {
            tracing::debug!(peer = %peer_addr, error = %e, "Upgrade handshake failed");
            return;
        }
        Err(_) => {
            tracing::debug!(peer = %peer_addr, "Upgrade handshake timed out");
            return;
        }
    };

    register_and_run(transport, peer_addr, shared).await;
}

/// Authorize, register, and run one upgraded connection to completion
pub(crate) async fn register_and_run<T: Transport, H: ServerHandler>(
    mut transport: T,
    peer_addr: SocketAddr,
    shared: ConnShared<H>,
) {
    if !shared.handler.authorize(peer_addr).await {
        shared
            .stats
            .rejected_connections
            .fetch_add(1, Ordering::Relaxed);
        tracing::debug!(peer = %peer_addr, "Connection rejected by authorization predicate");
        let _ = transport.close().await;
        return;
    }

    // Identifiers are minted from a process-wide counter, so a duplicate is
    // a registry invariant violation; retry the accept with a fresh one.
    let mut registered = None;
    for _ in 0..3 {
        let id = ClientId::new(shared.next_client_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(shared.config.outbound_queue);
        let (ping_tx, ping_rx) = mpsc::channel(1);
        let cancel = shared.shutdown.child_token();
        let entry = Arc::new(ClientEntry::new(id, peer_addr, tx, ping_tx, cancel.clone()));

        match shared.registry.register(Arc::clone(&entry)).await {
            Ok(()) => {
                registered = Some((id, entry, rx, ping_rx, cancel));
                break;
            }
            Err(e) => {
                tracing::error!(error = %e, "Registration failed, retrying with fresh identifier");
            }
        }
    }

    let Some((id, entry, rx, ping_rx, cancel)) = registered else {
        let _ = transport.close().await;
        return;
    };

    shared.stats.connection_opened();
    let ctx = ClientCtx::new(id, peer_addr);
    shared.handler.on_connect(&ctx).await;
    tracing::info!(client = %id, peer = %peer_addr, "Client connected");

    Connection::new(
        ctx,
        transport,
        entry,
        rx,
        ping_rx,
        Arc::clone(&shared.registry),
        Arc::clone(&shared.router),
        Arc::clone(&shared.handler),
        Arc::clone(&shared.stats),
        cancel,
        &shared.config,
    )
    .run()
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::connection::tests::MemoryTransport;
    use crate::server::handler::AcceptAll;
    use std::time::Duration;

    fn shared<H: ServerHandler>(handler: H) -> ConnShared<H> {
        let registry = Arc::new(ClientRegistry::new());
        let stats = Arc::new(ServerStats::new());
        let router = Arc::new(Router::new(Arc::clone(&registry), Arc::clone(&stats)));

        ConnShared {
            config: ServerConfig::default(),
            handler: Arc::new(handler),
            registry,
            router,
            stats,
            next_client_id: Arc::new(AtomicU64::new(1)),
            shutdown: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn test_rejected_connection_is_not_registered() {
        struct DenyAll;
        impl ServerHandler for DenyAll {
            async fn authorize(&self, _peer: SocketAddr) -> bool {
                false
            }
        }

        let shared = shared(DenyAll);
        let (transport, _in_tx, _sent_rx, _pings) = MemoryTransport::new();

        register_and_run(transport, "10.0.0.1:1234".parse().unwrap(), shared.clone()).await;

        assert!(shared.registry.is_empty().await);
        assert_eq!(shared.stats.snapshot().rejected_connections, 1);
        assert_eq!(shared.stats.snapshot().total_connections, 0);
    }

    #[tokio::test]
    async fn test_shutdown_drains_all_connections() {
        let shared = shared(AcceptAll);
        let mut tasks = JoinSet::new();

        for i in 0..3 {
            let (transport, in_tx, _sent_rx, _pings) = MemoryTransport::new();
            // Keep each inbound channel open so the tasks only exit on cancel
            std::mem::forget(in_tx);
            let addr: SocketAddr = format!("127.0.0.1:{}", 9100 + i).parse().unwrap();
            tasks.spawn(register_and_run(transport, addr, shared.clone()));
        }

        // Wait until all three are registered
        tokio::time::timeout(Duration::from_secs(1), async {
            while shared.registry.len().await < 3 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("connections not registered");

        shared.shutdown.cancel();
        shared.registry.clear_and_close().await;

        tokio::time::timeout(Duration::from_secs(1), async {
            while tasks.join_next().await.is_some() {}
        })
        .await
        .expect("connections did not drain");

        assert!(shared.registry.is_empty().await);
        assert_eq!(shared.stats.snapshot().active_connections, 0);
    }

    #[tokio::test]
    async fn test_run_until_stops_on_signal() {
        let config = ServerConfig::with_addr("127.0.0.1:0".parse().unwrap())
            .drain_timeout(Duration::from_millis(500));
        let server = WsServer::new(config, AcceptAll);

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        tx.send(()).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), server.run_until(async {
            let _ = rx.await;
        }))
        .await
        .expect("run_until did not return");

        assert!(result.is_ok());
        assert!(server.registry().is_empty().await);
    }
}
