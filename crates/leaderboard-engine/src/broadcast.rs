//! Notification fan-out to live connections.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use leaderboard_core::{ConnectionId, Notification};
use leaderboard_telemetry::MetricsRecorder;

use crate::error::BroadcastError;
use crate::registry::{ConnectionRegistry, Outbound};

/// Recipients of a broadcast.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    All,
    Room(String),
}

impl Target {
    fn label(&self) -> &str {
        match self {
            Self::All => "all",
            Self::Room(room) => room,
        }
    }
}

/// Per-call delivery counts. `attempted == delivered + failed`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Sink for notifications produced after a committed submission.
///
/// Errors mean the notification could not be sent at all; per-connection
/// failures are absorbed by the implementation.
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, target: &Target, notification: &Notification)
        -> Result<DeliveryReport, BroadcastError>;
}

/// Fans notifications out through the connection registry.
pub struct BroadcastEngine {
    registry: Arc<ConnectionRegistry>,
    metrics: Arc<MetricsRecorder>,
}

impl BroadcastEngine {
    pub fn new(registry: Arc<ConnectionRegistry>, metrics: Arc<MetricsRecorder>) -> Self {
        Self { registry, metrics }
    }

    /// Deliver to every connection registered before the call.
    pub fn broadcast_all(&self, notification: &Notification) -> DeliveryReport {
        self.broadcast(&Target::All, notification)
    }

    /// Deliver to the room's members as of the call.
    pub fn broadcast_to_room(&self, room: &str, notification: &Notification) -> DeliveryReport {
        self.broadcast(&Target::Room(room.to_string()), notification)
    }

    /// Never fails: encode errors are logged and reported as zero deliveries.
    pub fn broadcast(&self, target: &Target, notification: &Notification) -> DeliveryReport {
        self.try_broadcast(target, notification).unwrap_or_else(|e| {
            warn!(kind = %notification.kind(), target = target.label(), error = %e, "dropping notification");
            DeliveryReport::default()
        })
    }

    /// Send raw text to a single connection. Returns false if it is gone or
    /// its queue is full.
    pub fn send_to(&self, id: &ConnectionId, text: impl Into<Outbound>) -> bool {
        match self.registry.sender(id) {
            Some(tx) => self.deliver(id, &tx, text.into(), "direct"),
            None => false,
        }
    }

    fn try_broadcast(
        &self,
        target: &Target,
        notification: &Notification,
    ) -> Result<DeliveryReport, BroadcastError> {
        let payload: Outbound = notification.to_json()?.into();

        // Recipient set is fixed under the registry lock; delivery happens after it is released.
        let recipients = match target {
            Target::All => self.registry.senders_all(),
            Target::Room(room) => self.registry.senders_in(room),
        };

        let label = target.label();
        let mut report = DeliveryReport {
            attempted: recipients.len(),
            ..Default::default()
        };
        for (id, tx) in &recipients {
            if self.deliver(id, tx, Arc::clone(&payload), label) {
                report.delivered += 1;
            } else {
                report.failed += 1;
            }
        }

        let kind = notification.kind();
        self.metrics
            .counter_inc("notifications_broadcast_total", &[("kind", kind.as_str())], 1);
        self.metrics
            .histogram_observe("broadcast_fanout", &[], recipients.len() as f64);
        debug!(
            kind = %kind,
            target = label,
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failed,
            "broadcast notification"
        );
        Ok(report)
    }

    /// Non-blocking enqueue. A closed queue means the socket is gone, so the
    /// connection is dropped from the registry.
    fn deliver(
        &self,
        id: &ConnectionId,
        tx: &mpsc::Sender<Outbound>,
        payload: Outbound,
        label: &str,
    ) -> bool {
        match tx.try_send(payload) {
            Ok(()) => {
                self.metrics.counter_inc("deliveries_total", &[], 1);
                true
            }
            Err(mpsc::error::TrySendError::Full(msg)) => {
                self.metrics
                    .counter_inc("delivery_failures_total", &[("reason", "queue_full")], 1);
                warn!(
                    connection_id = %id,
                    target = label,
                    msg_len = msg.len(),
                    "send queue full, dropping message"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.metrics
                    .counter_inc("delivery_failures_total", &[("reason", "closed")], 1);
                debug!(connection_id = %id, target = label, "send queue closed, unregistering");
                self.registry.unregister(id);
                false
            }
        }
    }
}

impl NotificationPublisher for BroadcastEngine {
    fn publish(
        &self,
        target: &Target,
        notification: &Notification,
    ) -> Result<DeliveryReport, BroadcastError> {
        self.try_broadcast(target, notification)
    }
}
