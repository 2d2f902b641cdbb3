//! Transport-level bookkeeping: which connections exist, which rooms each
//! one joined, and frame emission. Each connection registers an outbound
//! channel; its socket task owns the actual sink. Delivery failures to
//! individual recipients are logged and never abort a broadcast.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use tokio::sync::mpsc;

/// Sender half of a connection's outbound frame channel.
pub type FrameSender = mpsc::UnboundedSender<String>;

/// One serialized wire frame: `{"event": ..., "data": ...}`.
pub fn frame(event: &str, payload: &serde_json::Value) -> String {
    serde_json::json!({ "event": event, "data": payload }).to_string()
}

#[derive(Default)]
struct Inner {
    connections: HashMap<String, FrameSender>,
    rooms: HashMap<String, HashSet<String>>,
}

#[derive(Default)]
pub struct Transport {
    inner: RwLock<Inner>,
}

impl Transport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, connection_id: &str, sender: FrameSender) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.connections.insert(connection_id.to_string(), sender);
    }

    /// Drop a connection and clear it out of every room it joined.
    pub fn unregister(&self, connection_id: &str) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.connections.remove(connection_id);
        inner.rooms.retain(|_, members| {
            members.remove(connection_id);
            !members.is_empty()
        });
    }

    pub fn join_room(&self, room_id: &str, connection_id: &str) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner
            .rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(connection_id.to_string());
    }

    pub fn leave_room(&self, room_id: &str, connection_id: &str) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if let Some(members) = inner.rooms.get_mut(room_id) {
            members.remove(connection_id);
            if members.is_empty() {
                inner.rooms.remove(room_id);
            }
        }
    }

    pub fn room_connections(&self, room_id: &str) -> Vec<String> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .rooms
            .get(room_id)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Deliver one event to one connection.
    pub fn emit_to(&self, connection_id: &str, event: &str, payload: &serde_json::Value) {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        if let Some(sender) = inner.connections.get(connection_id)
            && sender.send(frame(event, payload)).is_err()
        {
            eprintln!("emit {event} to {connection_id} failed: connection gone");
        }
    }

    /// Deliver to every connection in a room, optionally skipping the
    /// originating socket. A user's other connections still receive the
    /// event.
    pub fn broadcast_room(
        &self,
        room_id: &str,
        event: &str,
        payload: &serde_json::Value,
        skip_connection: Option<&str>,
    ) {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let Some(members) = inner.rooms.get(room_id) else {
            return;
        };
        let text = frame(event, payload);
        for connection_id in members {
            if skip_connection == Some(connection_id.as_str()) {
                continue;
            }
            if let Some(sender) = inner.connections.get(connection_id)
                && sender.send(text.clone()).is_err()
            {
                eprintln!("broadcast {event} to {connection_id} failed: connection gone");
            }
        }
    }

    /// Deliver to every live connection on this hub instance.
    pub fn broadcast_all(&self, event: &str, payload: &serde_json::Value, skip_connection: Option<&str>) {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let text = frame(event, payload);
        for (connection_id, sender) in &inner.connections {
            if skip_connection == Some(connection_id.as_str()) {
                continue;
            }
            if sender.send(text.clone()).is_err() {
                eprintln!("broadcast {event} to {connection_id} failed: connection gone");
            }
        }
    }
}
