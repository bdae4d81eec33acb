//! Facade wiring the gate, registry and broadcaster together. The transport
//! layer only talks to this type.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use leaderboard_core::score::rank_entries;
use leaderboard_core::{
    ConnectionId, LeaderboardEntry, Notification, SubmissionOutcome, UserId,
};
use leaderboard_store::{ScoreStore, StoreError};
use leaderboard_telemetry::MetricsRecorder;

use crate::broadcast::{BroadcastEngine, DeliveryReport};
use crate::config::LeaderboardConfig;
use crate::error::RegistryError;
use crate::gate::SubmissionGate;
use crate::registry::{ConnectionRegistry, Outbound};

/// Live connection counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub connected_clients: usize,
    pub rooms: usize,
}

pub struct LeaderboardService {
    store: Arc<dyn ScoreStore>,
    registry: Arc<ConnectionRegistry>,
    broadcaster: Arc<BroadcastEngine>,
    gate: SubmissionGate,
    metrics: Arc<MetricsRecorder>,
}

impl LeaderboardService {
    pub fn new(
        store: Arc<dyn ScoreStore>,
        config: LeaderboardConfig,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::with_metrics(
            config.max_send_queue,
            Arc::clone(&metrics),
        ));
        let broadcaster = Arc::new(BroadcastEngine::new(
            Arc::clone(&registry),
            Arc::clone(&metrics),
        ));
        let gate = SubmissionGate::new(
            Arc::clone(&store),
            broadcaster.clone(),
            config,
            Arc::clone(&metrics),
        );
        Self {
            store,
            registry,
            broadcaster,
            gate,
            metrics,
        }
    }

    pub fn config(&self) -> &LeaderboardConfig {
        self.gate.config()
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.metrics
    }

    /// Blocking: runs store I/O and the post-commit broadcast inline.
    pub fn submit_score(&self, user_id: &UserId, username: &str, score: i64) -> SubmissionOutcome {
        self.gate.submit(user_id, username, score)
    }

    pub fn on_connect(&self) -> (ConnectionId, mpsc::Receiver<Outbound>) {
        self.registry.register()
    }

    pub fn on_disconnect(&self, id: &ConnectionId) -> bool {
        self.registry.unregister(id)
    }

    /// Join a room. Joining the leaderboard room also sends the current
    /// standings to the new member, so it does not wait for the next
    /// accepted score to render anything.
    pub fn on_join_room(&self, id: &ConnectionId, room: &str) -> Result<bool, RegistryError> {
        let changed = self.registry.join(id, room)?;
        if room == self.config().leaderboard_room {
            self.send_snapshot(id);
        }
        Ok(changed)
    }

    pub fn on_leave_room(&self, id: &ConnectionId, room: &str) -> Result<bool, RegistryError> {
        self.registry.leave(id, room)
    }

    /// Refresh a connection's liveness.
    pub fn touch(&self, id: &ConnectionId) -> bool {
        self.registry.touch(id)
    }

    /// Drop connections idle for at least `timeout`.
    pub fn reap_idle(&self, timeout: Duration) -> usize {
        self.registry.reap_idle(timeout)
    }

    pub fn get_stats(&self) -> Stats {
        Stats {
            connected_clients: self.registry.count(),
            rooms: self.registry.room_count(),
        }
    }

    /// Push an arbitrary payload to every connection.
    pub fn push_custom(&self, payload: serde_json::Value) -> DeliveryReport {
        self.broadcaster.broadcast_all(&Notification::custom(payload))
    }

    /// Send a control reply to one connection.
    pub fn reply(&self, id: &ConnectionId, text: impl Into<Outbound>) -> bool {
        self.broadcaster.send_to(id, text)
    }

    /// Current standings, best first.
    pub fn leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, StoreError> {
        Ok(rank_entries(&self.store.top_n(limit)?))
    }

    fn send_snapshot(&self, id: &ConnectionId) {
        let entries = match self.leaderboard(self.config().top_n) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(connection_id = %id, error = %e, "could not read standings for new member");
                return;
            }
        };
        match Notification::leaderboard_snapshot(entries).to_json() {
            Ok(json) => {
                if !self.broadcaster.send_to(id, json) {
                    debug!(connection_id = %id, "initial snapshot not delivered");
                }
            }
            Err(e) => warn!(connection_id = %id, error = %e, "failed to encode snapshot"),
        }
    }
}
