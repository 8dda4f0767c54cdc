//! Connection tracking and outbound message routing
//!
//! This module maps roster identities to the outbound queues of live TCP
//! connections. A connection starts out unestablished and becomes established
//! once a join report binds it to a `(team, slot)`. The reconciliation engine
//! pushes protocol messages through the [`ConnectionRegistry`] trait; the
//! network layer owns socket I/O and drains each queue in enqueue order.

use log::{debug, info};
use shared::{PlayerId, ServerMessage};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;

/// Server-assigned id for one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Queue of newline-terminated lines waiting to be written to a socket.
pub type Outbox = mpsc::UnboundedSender<String>;

/// Outbound side of the transport as seen by the game core.
///
/// Implementations are called while the engine lock is held and must never
/// call back into the engine.
pub trait ConnectionRegistry: Send + Sync {
    /// Establishes `connection` as the unit playing `id`.
    fn bind_identity(&self, connection: ConnectionId, id: PlayerId);

    fn send(&self, id: PlayerId, message: ServerMessage);

    /// Queues `message` for every established connection.
    fn broadcast(&self, message: ServerMessage);

    /// Moves the connection bound to `from` over to `to` and tells the unit.
    fn rebind(&self, from: PlayerId, to: PlayerId);

    fn unbind(&self, id: PlayerId);
}

#[derive(Debug)]
struct Connection {
    addr: SocketAddr,
    outbox: Outbox,
    identity: Option<PlayerId>,
}

#[derive(Debug, Default)]
struct Connections {
    next_id: u64,
    by_id: HashMap<ConnectionId, Connection>,
    established: HashMap<PlayerId, ConnectionId>,
}

impl Connections {
    fn queue(&self, connection: ConnectionId, line: String) {
        if let Some(conn) = self.by_id.get(&connection) {
            if conn.outbox.send(line).is_err() {
                debug!("Dropped message for closed connection {}", connection);
            }
        }
    }
}

/// Registry of the server's live connections.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    connections: Mutex<Connections>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Connections> {
        self.connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Tracks a freshly accepted connection that has not joined yet.
    pub fn register(&self, addr: SocketAddr, outbox: Outbox) -> ConnectionId {
        let mut connections = self.lock();
        connections.next_id += 1;
        let id = ConnectionId(connections.next_id);
        connections.by_id.insert(
            id,
            Connection {
                addr,
                outbox,
                identity: None,
            },
        );
        id
    }

    /// Forgets a closed connection. The roster entry it played stays.
    pub fn disconnect(&self, connection: ConnectionId) -> Option<PlayerId> {
        let mut connections = self.lock();
        let conn = connections.by_id.remove(&connection)?;
        info!("Connection {} from {} closed", connection, conn.addr);

        let identity = conn.identity?;
        if connections.established.get(&identity) == Some(&connection) {
            connections.established.remove(&identity);
        }
        Some(identity)
    }

    pub fn identity_of(&self, connection: ConnectionId) -> Option<PlayerId> {
        self.lock().by_id.get(&connection)?.identity
    }

    pub fn connection_for(&self, id: PlayerId) -> Option<ConnectionId> {
        self.lock().established.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.lock().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().by_id.is_empty()
    }

    pub fn established_count(&self) -> usize {
        self.lock().established.len()
    }
}

impl ConnectionRegistry for ClientRegistry {
    fn bind_identity(&self, connection: ConnectionId, id: PlayerId) {
        let mut connections = self.lock();
        let Some(previous) = connections
            .by_id
            .get_mut(&connection)
            .map(|conn| conn.identity.replace(id))
        else {
            debug!("Cannot bind closed connection {} to {}", connection, id);
            return;
        };

        if let Some(old) = previous.filter(|old| *old != id) {
            connections.established.remove(&old);
        }
        if let Some(displaced) = connections.established.insert(id, connection) {
            if displaced != connection {
                if let Some(conn) = connections.by_id.get_mut(&displaced) {
                    conn.identity = None;
                }
            }
        }
        info!("Connection {} bound to {}", connection, id);
    }

    fn send(&self, id: PlayerId, message: ServerMessage) {
        let connections = self.lock();
        match connections.established.get(&id) {
            Some(connection) => connections.queue(*connection, message.to_line()),
            None => debug!("No connection for {}, dropping {}", id, message),
        }
    }

    fn broadcast(&self, message: ServerMessage) {
        let connections = self.lock();
        let line = message.to_line();
        for connection in connections.established.values() {
            connections.queue(*connection, line.clone());
        }
    }

    fn rebind(&self, from: PlayerId, to: PlayerId) {
        let mut connections = self.lock();
        let Some(connection) = connections.established.remove(&from) else {
            return;
        };
        connections.established.insert(to, connection);
        if let Some(conn) = connections.by_id.get_mut(&connection) {
            conn.identity = Some(to);
        }
        connections.queue(connection, ServerMessage::TeamPlayer(to).to_line());
    }

    fn unbind(&self, id: PlayerId) {
        let mut connections = self.lock();
        if let Some(connection) = connections.established.remove(&id) {
            if let Some(conn) = connections.by_id.get_mut(&connection) {
                conn.identity = None;
            }
        }
    }
}
