/// Push connection registry
///
/// Tracks live push connections keyed by user and routes encoded frames to
/// them. Supports:
/// - Multiple concurrent connections per user (multi-device)
/// - Targeted, broadcast, admin-only and complement-of-set delivery
/// - Precise cleanup of a single connection by handle
/// - Non-blocking delivery: a full queue drops the frame for that connection
use crate::metrics;
use bytes::Bytes;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::messages::heartbeat_frame;

/// Unique identifier for one push connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything needed to remove exactly one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionHandle {
    pub user_id: Uuid,
    pub id: ConnectionId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

struct Connection {
    id: ConnectionId,
    role: Role,
    sender: mpsc::Sender<Bytes>,
}

/// Outcome of one fan-out call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Frames queued on a connection
    pub delivered: usize,
    /// Frames discarded because the connection's queue was full
    pub dropped: usize,
    /// Connections found closed and removed during this call
    pub closed: usize,
}

impl DeliveryReport {
    fn merge(&mut self, other: DeliveryReport) {
        self.delivered += other.delivered;
        self.dropped += other.dropped;
        self.closed += other.closed;
    }
}

/// Connection registry for push subscribers
///
/// Connections live in a sharded concurrent map, so broadcasts only hold a
/// shard's read lock while enqueueing, and subscribe/unsubscribe on other
/// shards proceed in parallel. Enqueueing uses `try_send` and never awaits.
#[derive(Clone)]
pub struct ConnectionRegistry {
    // user_id -> live connections
    connections: Arc<DashMap<Uuid, Vec<Connection>>>,
    channel_capacity: usize,
}

impl ConnectionRegistry {
    pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

    pub fn new(channel_capacity: usize) -> Self {
        Self {
            connections: Arc::new(DashMap::new()),
            channel_capacity: channel_capacity.max(1),
        }
    }

    /// Register a new live connection for a user
    ///
    /// Returns the handle used for cleanup and the receiving end of the
    /// connection's bounded outbound queue.
    pub fn subscribe(
        &self,
        user_id: Uuid,
        role: Role,
    ) -> (ConnectionHandle, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let handle = ConnectionHandle {
            user_id,
            id: ConnectionId::new(),
        };

        let count = {
            let mut entry = self.connections.entry(user_id).or_default();
            entry.push(Connection {
                id: handle.id,
                role,
                sender: tx,
            });
            entry.len()
        };
        metrics::connection_opened();

        tracing::debug!(
            user_id = %user_id,
            connection_id = %handle.id.as_uuid(),
            connections_for_user = count,
            "push connection registered"
        );

        (handle, rx)
    }

    /// Remove exactly one connection. Idempotent.
    pub fn unsubscribe(&self, handle: ConnectionHandle) -> bool {
        let mut removed = false;
        let mut now_empty = false;

        if let Some(mut conns) = self.connections.get_mut(&handle.user_id) {
            let before = conns.len();
            conns.retain(|c| c.id != handle.id);
            removed = conns.len() != before;
            now_empty = conns.is_empty();
        }

        if now_empty {
            self.connections
                .remove_if(&handle.user_id, |_, conns| conns.is_empty());
        }

        if removed {
            metrics::connection_closed();
            tracing::debug!(
                user_id = %handle.user_id,
                connection_id = %handle.id.as_uuid(),
                "push connection removed"
            );
        }

        removed
    }

    /// Deliver to every connection of one user. Unknown users are a no-op.
    pub fn send_to(&self, user_id: Uuid, frame: &Bytes) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        let mut closed = Vec::new();

        if let Some(conns) = self.connections.get(&user_id) {
            for conn in conns.iter() {
                Self::enqueue(user_id, conn, frame, &mut report, &mut closed);
            }
        }

        report.merge(self.prune(closed));
        report
    }

    /// Deliver to every live connection
    pub fn send_to_all(&self, frame: &Bytes) -> DeliveryReport {
        self.deliver_where(frame, |_, _| true)
    }

    /// Deliver to every connection opened with the admin role
    pub fn send_to_admins(&self, frame: &Bytes) -> DeliveryReport {
        self.deliver_where(frame, |_, role| role == Role::Admin)
    }

    /// Deliver to every connection whose user is not in `excluded`
    pub fn send_to_complement(&self, excluded: &BTreeSet<Uuid>, frame: &Bytes) -> DeliveryReport {
        self.deliver_where(frame, |user_id, _| !excluded.contains(&user_id))
    }

    fn deliver_where<F>(&self, frame: &Bytes, select: F) -> DeliveryReport
    where
        F: Fn(Uuid, Role) -> bool,
    {
        let mut report = DeliveryReport::default();
        let mut closed = Vec::new();

        for entry in self.connections.iter() {
            let user_id = *entry.key();
            for conn in entry.value().iter().filter(|c| select(user_id, c.role)) {
                Self::enqueue(user_id, conn, frame, &mut report, &mut closed);
            }
        }

        report.merge(self.prune(closed));
        report
    }

    fn enqueue(
        user_id: Uuid,
        conn: &Connection,
        frame: &Bytes,
        report: &mut DeliveryReport,
        closed: &mut Vec<ConnectionHandle>,
    ) {
        match conn.sender.try_send(frame.clone()) {
            Ok(()) => report.delivered += 1,
            Err(TrySendError::Full(_)) => {
                report.dropped += 1;
                metrics::frame_dropped("queue_full");
                tracing::warn!(
                    user_id = %user_id,
                    connection_id = %conn.id.as_uuid(),
                    "push queue full, dropping frame"
                );
            }
            Err(TrySendError::Closed(_)) => {
                metrics::frame_dropped("closed");
                closed.push(ConnectionHandle {
                    user_id,
                    id: conn.id,
                });
            }
        }
    }

    // Runs after the map guards are released; removing while iterating would
    // deadlock on the shard lock.
    fn prune(&self, closed: Vec<ConnectionHandle>) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        for handle in closed {
            if self.unsubscribe(handle) {
                report.closed += 1;
            }
        }
        report
    }

    /// Periodically push a heartbeat to every connection.
    ///
    /// Doubles as the sweep that removes connections whose receiver is gone.
    pub fn spawn_heartbeat(&self, interval: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let report = registry.send_to_all(&heartbeat_frame());
                if report.closed > 0 || report.dropped > 0 {
                    tracing::debug!(
                        delivered = report.delivered,
                        dropped = report.dropped,
                        closed = report.closed,
                        "heartbeat sweep"
                    );
                }
            }
        })
    }

    /// Number of live connections for a user
    pub fn connection_count(&self, user_id: Uuid) -> usize {
        self.connections.get(&user_id).map(|v| v.len()).unwrap_or(0)
    }

    pub fn total_connections(&self) -> usize {
        self.connections.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn connected_users_count(&self) -> usize {
        self.connections.len()
    }

    pub fn connected_user_ids(&self) -> Vec<Uuid> {
        self.connections.iter().map(|entry| *entry.key()).collect()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CHANNEL_CAPACITY)
    }
}
