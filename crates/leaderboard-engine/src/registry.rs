//! Live subscriber connections and their room memberships.
//!
//! Two indices, room -> connections and connection -> rooms, are kept behind
//! a single lock and always mutated together. The `connected_clients` gauge
//! is written under the same lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info};

use leaderboard_core::ConnectionId;
use leaderboard_telemetry::MetricsRecorder;

use crate::error::RegistryError;

/// One encoded message on a connection's outbound queue.
pub type Outbound = Arc<str>;

struct ConnectionEntry {
    tx: mpsc::Sender<Outbound>,
    rooms: HashSet<String>,
    last_seen: Instant,
}

#[derive(Default)]
struct Indices {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    rooms: HashMap<String, HashSet<ConnectionId>>,
}

impl Indices {
    fn entry_mut(&mut self, id: &ConnectionId) -> Result<&mut ConnectionEntry, RegistryError> {
        self.connections
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownConnection(id.clone()))
    }

    /// Drop a connection from both indices.
    fn remove(&mut self, id: &ConnectionId) -> Option<ConnectionEntry> {
        let entry = self.connections.remove(id)?;
        for room in &entry.rooms {
            if let Some(members) = self.rooms.get_mut(room) {
                members.remove(id);
                if members.is_empty() {
                    self.rooms.remove(room);
                }
            }
        }
        Some(entry)
    }
}

/// Registry of all live connections.
pub struct ConnectionRegistry {
    inner: Mutex<Indices>,
    max_send_queue: usize,
    metrics: Arc<MetricsRecorder>,
}

impl ConnectionRegistry {
    /// Registry with a private metrics recorder.
    pub fn new(max_send_queue: usize) -> Self {
        Self::with_metrics(max_send_queue, Arc::new(MetricsRecorder::new()))
    }

    pub fn with_metrics(max_send_queue: usize, metrics: Arc<MetricsRecorder>) -> Self {
        Self {
            inner: Mutex::new(Indices::default()),
            max_send_queue: max_send_queue.max(1),
            metrics,
        }
    }

    fn set_gauge(&self, inner: &Indices) {
        self.metrics
            .gauge_set("connected_clients", &[], inner.connections.len() as f64);
    }

    /// Register a new connection with no rooms. Returns its id and the
    /// receiving end of its outbound queue.
    pub fn register(&self) -> (ConnectionId, mpsc::Receiver<Outbound>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        let entry = ConnectionEntry {
            tx,
            rooms: HashSet::new(),
            last_seen: Instant::now(),
        };
        let mut inner = self.inner.lock();
        inner.connections.insert(id.clone(), entry);
        self.set_gauge(&inner);
        let count = inner.connections.len();
        drop(inner);
        debug!(connection_id = %id, connected_clients = count, "connection registered");
        (id, rx)
    }

    /// Remove a connection and every membership it holds.
    /// Unknown ids are a no-op. Returns whether anything was removed.
    pub fn unregister(&self, id: &ConnectionId) -> bool {
        let mut inner = self.inner.lock();
        let Some(entry) = inner.remove(id) else {
            return false;
        };
        self.set_gauge(&inner);
        let count = inner.connections.len();
        drop(inner);
        debug!(
            connection_id = %id,
            rooms = entry.rooms.len(),
            connected_clients = count,
            "connection unregistered"
        );
        true
    }

    /// Add a connection to a room. Returns `Ok(false)` if it was already a member.
    pub fn join(&self, id: &ConnectionId, room: &str) -> Result<bool, RegistryError> {
        validate_room(room)?;
        let mut inner = self.inner.lock();
        let entry = inner.entry_mut(id)?;
        if !entry.rooms.insert(room.to_string()) {
            return Ok(false);
        }
        inner
            .rooms
            .entry(room.to_string())
            .or_default()
            .insert(id.clone());
        Ok(true)
    }

    /// Remove a connection from a room. Returns `Ok(false)` if it was not a member.
    pub fn leave(&self, id: &ConnectionId, room: &str) -> Result<bool, RegistryError> {
        validate_room(room)?;
        let mut inner = self.inner.lock();
        let entry = inner.entry_mut(id)?;
        if !entry.rooms.remove(room) {
            return Ok(false);
        }
        if let Some(members) = inner.rooms.get_mut(room) {
            members.remove(id);
            if members.is_empty() {
                inner.rooms.remove(room);
            }
        }
        Ok(true)
    }

    /// Snapshot of a room's members.
    pub fn members_of(&self, room: &str) -> HashSet<ConnectionId> {
        self.inner.lock().rooms.get(room).cloned().unwrap_or_default()
    }

    /// Snapshot of a connection's rooms, `None` if it is not registered.
    pub fn rooms_of(&self, id: &ConnectionId) -> Option<HashSet<String>> {
        self.inner.lock().connections.get(id).map(|e| e.rooms.clone())
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.inner.lock().connections.contains_key(id)
    }

    /// Number of live connections.
    pub fn count(&self) -> usize {
        self.inner.lock().connections.len()
    }

    /// Number of non-empty rooms.
    pub fn room_count(&self) -> usize {
        self.inner.lock().rooms.len()
    }

    /// Record activity on a connection. Returns false for unknown ids.
    pub fn touch(&self, id: &ConnectionId) -> bool {
        match self.inner.lock().connections.get_mut(id) {
            Some(entry) => {
                entry.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Unregister every connection idle for at least `timeout`. Selection
    /// and removal happen under one lock, so a concurrent `touch` either
    /// lands first and saves the connection or finds it already gone.
    pub fn reap_idle(&self, timeout: Duration) -> usize {
        let mut inner = self.inner.lock();
        let idle: Vec<ConnectionId> = inner
            .connections
            .iter()
            .filter(|(_, e)| e.last_seen.elapsed() >= timeout)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &idle {
            inner.remove(id);
        }
        if !idle.is_empty() {
            self.set_gauge(&inner);
        }
        drop(inner);

        for id in &idle {
            info!(connection_id = %id, "reaped idle connection");
        }
        idle.len()
    }

    /// Outbound senders of every live connection, taken under one lock.
    pub(crate) fn senders_all(&self) -> Vec<(ConnectionId, mpsc::Sender<Outbound>)> {
        self.inner
            .lock()
            .connections
            .iter()
            .map(|(id, e)| (id.clone(), e.tx.clone()))
            .collect()
    }

    /// Outbound senders of a room's members, taken under one lock.
    pub(crate) fn senders_in(&self, room: &str) -> Vec<(ConnectionId, mpsc::Sender<Outbound>)> {
        let inner = self.inner.lock();
        let Some(members) = inner.rooms.get(room) else {
            return Vec::new();
        };
        members
            .iter()
            .filter_map(|id| inner.connections.get(id).map(|e| (id.clone(), e.tx.clone())))
            .collect()
    }

    pub(crate) fn sender(&self, id: &ConnectionId) -> Option<mpsc::Sender<Outbound>> {
        self.inner.lock().connections.get(id).map(|e| e.tx.clone())
    }

    /// Every membership appears in both indices and no room is empty.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        let inner = self.inner.lock();
        for (id, entry) in &inner.connections {
            for room in &entry.rooms {
                assert!(
                    inner.rooms.get(room).is_some_and(|m| m.contains(id)),
                    "{id} lists {room} but the room index does not"
                );
            }
        }
        for (room, members) in &inner.rooms {
            assert!(!members.is_empty(), "empty room {room} left in index");
            for id in members {
                assert!(
                    inner.connections.get(id).is_some_and(|e| e.rooms.contains(room)),
                    "room {room} lists {id} but the connection does not"
                );
            }
        }
    }
}

fn validate_room(room: &str) -> Result<(), RegistryError> {
    if room.trim().is_empty() || room.len() > 64 {
        return Err(RegistryError::InvalidRoom(room.to_string()));
    }
    Ok(())
}
