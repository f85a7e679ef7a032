//! Typed message routing
//!
//! Decoded envelopes are dispatched by their `type` tag: `chat` fans out to
//! every registered client except the sender, `notification` acknowledges
//! the sender or targets one client, and `error` is server-originated only.
//! Routing failures never propagate to the read loop; they are converted
//! into an `error` envelope enqueued back to the sender.
//!
//! Per-recipient delivery is a non-blocking enqueue onto that client's
//! bounded outbound queue. A full queue drops that single delivery, so one
//! slow consumer never stalls fan-out to the rest.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::protocol::{Envelope, ErrorCode, MessageKind};
use crate::registry::{ClientEntry, ClientId, ClientRegistry, EnqueueError, OutboundFrame};
use crate::stats::ServerStats;

/// Error type for routing decisions
#[derive(Debug, Clone)]
pub enum RouteError {
    /// Envelope `type` is not a routable kind (includes spoofed `error`)
    UnknownType(String),
    /// Directed-send target is not registered
    TargetNotFound(String),
}

impl RouteError {
    fn error_code(&self) -> ErrorCode {
        match self {
            RouteError::UnknownType(_) => ErrorCode::UnknownType,
            RouteError::TargetNotFound(_) => ErrorCode::NotFound,
        }
    }
}

impl std::fmt::Display for RouteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteError::UnknownType(tag) => write!(f, "unhandled message type: {}", tag),
            RouteError::TargetNotFound(target) => write!(f, "no such client: {}", target),
        }
    }
}

impl std::error::Error for RouteError {}

/// Routes decoded envelopes to their recipients
pub struct Router {
    registry: Arc<ClientRegistry>,
    stats: Arc<ServerStats>,
}

impl Router {
    /// Create a router over the given registry
    pub fn new(registry: Arc<ClientRegistry>, stats: Arc<ServerStats>) -> Self {
        Self { registry, stats }
    }

    /// Dispatch one envelope on behalf of `sender`
    ///
    /// Runs inline in the sender's read loop, so per-sender ordering is
    /// preserved end-to-end. Never returns an error: routing failures are
    /// reported to the sender as `error` envelopes.
    pub async fn dispatch(&self, envelope: Envelope, sender: ClientId) {
        match self.route(envelope, sender).await {
            Ok(()) => {
                self.stats.messages_routed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::debug!(client = %sender, error = %e, "Envelope rejected");
                self.reply_error(sender, e.error_code(), e.to_string()).await;
            }
        }
    }

    /// Send a structured `error` envelope back to a client
    ///
    /// Used for routing rejections and for decode failures from the read
    /// loop. A missing sender means the connection is mid-teardown; the
    /// reply is dropped silently.
    pub async fn reply_error(&self, to: ClientId, code: ErrorCode, message: String) {
        let envelope = Envelope::error(code, message);
        let Some(entry) = self.registry.get(to).await else {
            tracing::debug!(client = %to, "Error reply dropped, client gone");
            return;
        };
        self.deliver(&entry, &envelope);
    }

    async fn route(&self, envelope: Envelope, sender: ClientId) -> Result<(), RouteError> {
        match envelope.message_kind() {
            Some(MessageKind::Chat) => {
                self.broadcast(envelope, sender).await;
                Ok(())
            }
            Some(MessageKind::Notification) => self.notify(envelope, sender).await,
            // Reserved for the server; inbound claims are spoofing
            Some(MessageKind::Error) | None => Err(RouteError::UnknownType(envelope.kind)),
        }
    }

    /// Fan out a `chat` envelope to every registered client except the sender
    async fn broadcast(&self, envelope: Envelope, sender: ClientId) {
        let envelope = envelope.with_sender(sender.to_string());
        let recipients = self.registry.snapshot().await;

        let mut delivered = 0usize;
        for entry in recipients.iter().filter(|e| e.id() != sender) {
            if self.deliver(entry, &envelope) {
                delivered += 1;
            }
        }

        tracing::trace!(
            client = %sender,
            recipients = recipients.len().saturating_sub(1),
            delivered = delivered,
            "Chat broadcast"
        );
    }

    /// Deliver a `notification`: ack the sender, or target one client
    async fn notify(&self, envelope: Envelope, sender: ClientId) -> Result<(), RouteError> {
        let target = match envelope.target_id.as_deref() {
            Some(raw) => {
                let id = raw
                    .parse::<u64>()
                    .map(ClientId::new)
                    .map_err(|_| RouteError::TargetNotFound(raw.to_string()))?;
                self.registry
                    .get(id)
                    .await
                    .ok_or_else(|| RouteError::TargetNotFound(raw.to_string()))?
            }
            None => {
                // Direct acknowledgment pattern: echo back to the sender
                self.registry
                    .get(sender)
                    .await
                    .ok_or_else(|| RouteError::TargetNotFound(sender.to_string()))?
            }
        };

        let envelope = envelope.with_sender(sender.to_string());
        self.deliver(&target, &envelope);
        Ok(())
    }

    /// Non-blocking enqueue of one envelope onto one client's queue
    fn deliver(&self, entry: &Arc<ClientEntry>, envelope: &Envelope) -> bool {
        let text = match envelope.to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Envelope serialization failed");
                return false;
            }
        };

        self.stats.deliveries.fetch_add(1, Ordering::Relaxed);
        match entry.try_enqueue(OutboundFrame::Message(text)) {
            Ok(()) => true,
            Err(EnqueueError::QueueFull) => {
                self.stats.dropped_deliveries.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(client = %entry.id(), "Delivery dropped, outbound queue full");
                false
            }
            Err(EnqueueError::Closed) => {
                tracing::debug!(client = %entry.id(), "Delivery dropped, client mid-teardown");
                false
            }
        }
    }
}
