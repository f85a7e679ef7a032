//! Per-connection actor
//!
//! One task owns the transport for one client and multiplexes its inputs:
//! inbound transport events, the client's outbound queue, the liveness
//! probe slot, and the cancel token. Inbound frames are decoded and
//! dispatched in receipt order, so
//! per-sender FIFO holds end-to-end; all wire writes flow through this task,
//! so they are serialized without a per-socket lock.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::protocol::{self, ErrorCode};
use crate::registry::{ClientEntry, ClientRegistry, OutboundFrame};
use crate::router::Router;
use crate::server::config::ServerConfig;
use crate::server::handler::{ClientCtx, ServerHandler};
use crate::stats::ServerStats;
use crate::transport::{Inbound, Transport};

/// Why the connection loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    /// Peer sent a close frame or the stream ended cleanly
    PeerClosed,
    /// Read or write failed at the transport level
    TransportFailed,
    /// Cancelled: liveness eviction or server shutdown
    Forced,
}

/// Actor owning one client's transport
pub(crate) struct Connection<T: Transport, H: ServerHandler> {
    ctx: ClientCtx,
    transport: T,
    entry: Arc<ClientEntry>,
    outbound_rx: mpsc::Receiver<OutboundFrame>,
    ping_rx: mpsc::Receiver<()>,
    registry: Arc<ClientRegistry>,
    router: Arc<Router>,
    handler: Arc<H>,
    stats: Arc<ServerStats>,
    cancel: CancellationToken,
    send_timeout: Duration,
    max_frame_bytes: usize,
}

impl<T: Transport, H: ServerHandler> Connection<T, H> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        ctx: ClientCtx,
        transport: T,
        entry: Arc<ClientEntry>,
        outbound_rx: mpsc::Receiver<OutboundFrame>,
        ping_rx: mpsc::Receiver<()>,
        registry: Arc<ClientRegistry>,
        router: Arc<Router>,
        handler: Arc<H>,
        stats: Arc<ServerStats>,
        cancel: CancellationToken,
        config: &ServerConfig,
    ) -> Self {
        Self {
            ctx,
            transport,
            entry,
            outbound_rx,
            ping_rx,
            registry,
            router,
            handler,
            stats,
            cancel,
            send_timeout: config.send_timeout,
            max_frame_bytes: config.max_frame_bytes,
        }
    }

    /// Run the connection until teardown
    pub(crate) async fn run(mut self) {
        let reason = self.serve().await;
        self.teardown(reason).await;
    }

    async fn serve(&mut self) -> CloseReason {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return CloseReason::Forced,

                cmd = self.outbound_rx.recv() => {
                    match cmd {
                        Some(frame) => {
                            if !self.write(frame).await {
                                return CloseReason::TransportFailed;
                            }
                        }
                        // Sender side dropped: entry discarded, stop
                        None => return CloseReason::Forced,
                    }
                }

                probe = self.ping_rx.recv() => {
                    match probe {
                        Some(()) => {
                            if !self.write(OutboundFrame::Ping).await {
                                return CloseReason::TransportFailed;
                            }
                        }
                        None => return CloseReason::Forced,
                    }
                }

                inbound = self.transport.receive() => {
                    match inbound {
                        Ok(Inbound::Frame(frame)) => self.on_frame(frame).await,
                        Ok(Inbound::Pong) => {
                            self.entry.mark_pong();
                        }
                        Ok(Inbound::Closed) => return CloseReason::PeerClosed,
                        Err(e) => {
                            tracing::debug!(
                                client = %self.ctx.id,
                                error = %e,
                                "Transport failure"
                            );
                            return CloseReason::TransportFailed;
                        }
                    }
                }
            }
        }
    }

    /// Decode and dispatch one inbound frame
    ///
    /// A malformed frame gets an `error` reply and the connection stays
    /// open; a single bad frame is not grounds for disconnection.
    async fn on_frame(&mut self, frame: Bytes) {
        self.entry.touch();

        match protocol::decode(&frame, self.max_frame_bytes) {
            Ok(envelope) => self.router.dispatch(envelope, self.ctx.id).await,
            Err(e) => {
                self.stats.decode_errors.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(client = %self.ctx.id, error = %e, "Frame rejected");
                self.router
                    .reply_error(self.ctx.id, ErrorCode::DecodeError, e.to_string())
                    .await;
            }
        }
    }

    /// Write one frame to the wire, bounded by the send timeout
    ///
    /// Returns false when the transport failed and the connection must be
    /// torn down. A timed-out write drops that one delivery and keeps the
    /// connection; eviction is the liveness monitor's call, not the
    /// writer's.
    async fn write(&mut self, frame: OutboundFrame) -> bool {
        let deadline = self.send_timeout;
        let write = async {
            match frame {
                OutboundFrame::Message(text) => self.transport.send(Bytes::from(text)).await,
                OutboundFrame::Ping => self.transport.ping().await,
            }
        };

        match tokio::time::timeout(deadline, write).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::debug!(client = %self.ctx.id, error = %e, "Write failed");
                false
            }
            Err(_) => {
                self.stats.dropped_deliveries.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(client = %self.ctx.id, "Write timed out, delivery dropped");
                true
            }
        }
    }

    /// Unregister and close; safe to race with liveness eviction
    async fn teardown(mut self, reason: CloseReason) {
        self.entry.force_close();
        self.registry.unregister(self.ctx.id).await;

        // Forced teardown skips the close handshake and just drops the
        // transport; a graceful close attempt is still time-bounded.
        if reason != CloseReason::Forced {
            let _ = tokio::time::timeout(self.send_timeout, self.transport.close()).await;
        }

        self.stats.connection_closed();
        self.handler.on_disconnect(&self.ctx).await;

        tracing::info!(client = %self.ctx.id, reason = ?reason, "Client disconnected");
    }
}
