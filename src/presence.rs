//! Connection registry and presence broadcasting.
//!
//! Maps each user to at most one live push connection. A new connection for
//! the same user replaces the old mapping (last-connection-wins); dropping
//! the replaced sender closes the superseded socket's pump. Unregistration
//! is guarded by connection id so a stale close event can never evict a
//! newer connection for the same user.
//!
//! All mutation and the accompanying presence broadcast happen under one
//! internal mutex, giving the single event-processing path the push side
//! requires. Sends are non-blocking unbounded-channel sends, so the lock is
//! never held across an await point.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::plog;
use crate::push::PushEvent;

/// Outbound channel of one live connection.
pub type PushSender = mpsc::UnboundedSender<PushEvent>;

/// Identifier of a single live connection, unique per process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

struct Connection {
    id: ConnectionId,
    tx: PushSender,
}

/// The raw user → connection map. Pure in-memory state; all access goes
/// through [`PresenceHub`], which owns the lock.
#[derive(Default)]
struct ConnectionRegistry {
    next_id: u64,
    connections: HashMap<String, Connection>,
}

impl ConnectionRegistry {
    fn register(&mut self, user_id: &str, tx: PushSender) -> ConnectionId {
        self.next_id += 1;
        let id = ConnectionId(self.next_id);
        // Replacing drops the old sender, which closes the old socket pump.
        self.connections
            .insert(user_id.to_string(), Connection { id, tx });
        id
    }

    /// Remove the mapping only if it still belongs to `connection_id`.
    fn unregister(&mut self, user_id: &str, connection_id: ConnectionId) -> bool {
        match self.connections.get(user_id) {
            Some(conn) if conn.id == connection_id => {
                self.connections.remove(user_id);
                true
            }
            _ => false,
        }
    }

    fn lookup(&self, user_id: &str) -> Option<PushSender> {
        self.connections.get(user_id).map(|c| c.tx.clone())
    }

    fn online_user_ids(&self) -> Vec<String> {
        self.connections.keys().cloned().collect()
    }

    /// Push the current online set to every live connection. Connections
    /// that died mid-broadcast are skipped silently.
    fn broadcast_online(&self) {
        let event = PushEvent::OnlineUsers {
            user_ids: self.online_user_ids(),
        };
        for conn in self.connections.values() {
            let _ = conn.tx.send(event.clone());
        }
    }
}

/// Shared presence state: the connection registry plus the broadcaster that
/// republishes the online set on every membership change.
pub struct PresenceHub {
    inner: Mutex<ConnectionRegistry>,
}

impl PresenceHub {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ConnectionRegistry::default()),
        }
    }

    /// Register a live connection for `user_id`, replacing any prior one,
    /// and broadcast the updated online set to everyone.
    pub fn register(&self, user_id: &str, tx: PushSender) -> ConnectionId {
        let mut reg = self.inner.lock().unwrap();
        let id = reg.register(user_id, tx);
        reg.broadcast_online();
        plog!(
            "presence: {} connected ({} online)",
            crate::logging::user_id(user_id),
            reg.connections.len()
        );
        id
    }

    /// Tear down a connection. A no-op when `connection_id` no longer owns
    /// the mapping — the user reconnected and the close event is stale.
    pub fn unregister(&self, user_id: &str, connection_id: ConnectionId) {
        let mut reg = self.inner.lock().unwrap();
        if reg.unregister(user_id, connection_id) {
            reg.broadcast_online();
            plog!(
                "presence: {} disconnected ({} online)",
                crate::logging::user_id(user_id),
                reg.connections.len()
            );
        }
    }

    pub fn lookup(&self, user_id: &str) -> Option<PushSender> {
        self.inner.lock().unwrap().lookup(user_id)
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.inner.lock().unwrap().connections.contains_key(user_id)
    }

    pub fn online_user_ids(&self) -> Vec<String> {
        self.inner.lock().unwrap().online_user_ids()
    }

    pub fn connection_count(&self) -> usize {
        self.inner.lock().unwrap().connections.len()
    }

    /// Best-effort targeted send. Returns whether a live connection was
    /// found; a send onto a dying channel still counts as delivered here
    /// and the client reconciles on its next fetch.
    pub fn send_to(&self, user_id: &str, event: PushEvent) -> bool {
        match self.lookup(user_id) {
            Some(tx) => {
                let _ = tx.send(event);
                true
            }
            None => false,
        }
    }
}

impl Default for PresenceHub {
    fn default() -> Self {
        Self::new()
    }
}
