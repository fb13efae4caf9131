//! Connection registry and snapshot fan-out
//!
//! Every viewer connection owns a bounded outbound queue. Broadcasts use
//! `try_send`, so a viewer that stops reading loses updates instead of
//! stalling everyone else. Payloads are serialized once and shared.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Default per-connection queue depth
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Interval between heartbeat pings
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Frame queued for one connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Pre-serialized JSON text frame
    Text(Arc<str>),
    Ping,
    Close,
}

struct Connection {
    sender: mpsc::Sender<Outbound>,
    connected_at: DateTime<Utc>,
}

/// All open viewer connections
pub struct BroadcastHub {
    connections: RwLock<HashMap<String, Connection>>,
    capacity: usize,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Register a connection and return its outbound queue
    pub fn add(&self, conn_id: String) -> mpsc::Receiver<Outbound> {
        let (sender, rx) = mpsc::channel(self.capacity);
        let conn = Connection {
            sender,
            connected_at: Utc::now(),
        };
        self.connections.write().insert(conn_id, conn);
        rx
    }

    pub fn remove(&self, conn_id: &str) {
        if let Some(conn) = self.connections.write().remove(conn_id) {
            let secs = (Utc::now() - conn.connected_at).num_seconds();
            debug!(conn_id, connected_secs = secs, "Connection removed");
        }
    }

    /// Queue `text` for every connection; returns how many accepted it
    ///
    /// Connections with a full queue are skipped. Closed ones are dropped.
    pub fn broadcast(&self, text: Arc<str>) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();

        {
            let conns = self.connections.read();
            for (id, conn) in conns.iter() {
                match conn.sender.try_send(Outbound::Text(text.clone())) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        debug!(conn_id = %id, "Outbound queue full, skipping update");
                    }
                    Err(TrySendError::Closed(_)) => closed.push(id.clone()),
                }
            }
        }

        if !closed.is_empty() {
            let mut conns = self.connections.write();
            for id in &closed {
                conns.remove(id);
            }
            debug!(count = closed.len(), "Dropped closed connections");
        }

        delivered
    }

    /// Queue `text` for one connection; false if it is gone or saturated
    pub fn send_to(&self, conn_id: &str, text: Arc<str>) -> bool {
        let conns = self.connections.read();
        match conns.get(conn_id) {
            Some(conn) => conn.sender.try_send(Outbound::Text(text)).is_ok(),
            None => false,
        }
    }

    pub fn contains(&self, conn_id: &str) -> bool {
        self.connections.read().contains_key(conn_id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    pub fn ping_all(&self) {
        let conns = self.connections.read();
        for conn in conns.values() {
            let _ = conn.sender.try_send(Outbound::Ping);
        }
    }

    /// Send a close frame to every connection, then forget them all
    pub fn shutdown_all(&self) {
        let mut conns = self.connections.write();
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.try_send(Outbound::Close);
        }
        conns.clear();
        info!(count, "Closed all viewer connections");
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Ping every connection on a fixed interval
pub fn start_heartbeat(hub: Arc<BroadcastHub>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // First tick completes immediately
        interval.tick().await;

        loop {
            interval.tick().await;
            let count = hub.connection_count();
            debug!(count, "Viewer heartbeat ping");
            hub.ping_all();
        }
    })
}
