//! Connection registry: every live connection, its role, and its liveness
//! timestamps, keyed by connection id.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::ws::ConnectionSender;

/// Role a connection plays in the relay. An id maps to at most one role at
/// a time; registering again overwrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Unassigned,
    Display,
    Control,
}

/// Per-connection metadata. The stored sender is the only path to the
/// connection's transport.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub role: Role,
    pub sender: ConnectionSender,
    pub connected_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct Registry {
    connections: DashMap<String, ConnectionInfo>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly opened, unassigned connection. Overwrites any
    /// previous entry for the id (a reconnect supersedes the old transport).
    pub fn connect(&self, id: &str, sender: ConnectionSender) {
        let now = Utc::now();
        self.connections.insert(
            id.to_string(),
            ConnectionInfo {
                role: Role::Unassigned,
                sender,
                connected_at: now,
                last_heartbeat: now,
            },
        );
    }

    /// Set or overwrite the role for a known id, restamp its timestamps,
    /// and run `flush` with the connection's sender before the entry guard
    /// is released. The held guard keeps `by_role` out of this shard, so a
    /// broadcast racing a registration cannot see the new role (or sender)
    /// until everything `flush` delivers is already on the channel.
    /// Returns false if the id is not connected.
    pub fn register_with(
        &self,
        id: &str,
        role: Role,
        flush: impl FnOnce(&ConnectionSender),
    ) -> bool {
        match self.connections.get_mut(id) {
            Some(mut entry) => {
                let now = Utc::now();
                entry.role = role;
                entry.connected_at = now;
                entry.last_heartbeat = now;
                flush(&entry.sender);
                true
            }
            None => false,
        }
    }

    /// Set or overwrite the role for a known id and restamp its timestamps.
    /// Returns false if the id is not connected.
    pub fn register(&self, id: &str, role: Role) -> bool {
        self.register_with(id, role, |_| {})
    }

    /// Refresh `last_heartbeat`. No-op on unknown ids.
    pub fn touch(&self, id: &str) {
        if let Some(mut entry) = self.connections.get_mut(id) {
            entry.last_heartbeat = Utc::now();
        }
    }

    /// Delete all state for an id. Idempotent; returns what was removed.
    pub fn remove(&self, id: &str) -> Option<ConnectionInfo> {
        self.connections.remove(id).map(|(_, info)| info)
    }

    /// Delete the entry only if `sender` is still the stored transport.
    /// Guards a stale actor's cleanup racing a reconnect under the same id.
    pub fn remove_if_same(&self, id: &str, sender: &ConnectionSender) -> Option<ConnectionInfo> {
        self.connections
            .remove_if(id, |_, info| info.sender.same_channel(sender))
            .map(|(_, info)| info)
    }

    /// Snapshot of `(id, sender)` pairs for a role, taken fresh on each call.
    pub fn by_role(&self, role: Role) -> Vec<(String, ConnectionSender)> {
        self.connections
            .iter()
            .filter(|entry| entry.value().role == role)
            .map(|entry| (entry.key().clone(), entry.value().sender.clone()))
            .collect()
    }

    pub fn role_of(&self, id: &str) -> Option<Role> {
        self.connections.get(id).map(|entry| entry.value().role)
    }

    /// Ids whose last heartbeat predates `cutoff`.
    pub fn silent_before(&self, cutoff: DateTime<Utc>) -> Vec<String> {
        self.connections
            .iter()
            .filter(|entry| entry.value().last_heartbeat < cutoff)
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Backdate a connection's heartbeat, for liveness tests.
    #[cfg(test)]
    pub fn set_last_heartbeat(&self, id: &str, when: DateTime<Utc>) {
        if let Some(mut entry) = self.connections.get_mut(id) {
            entry.last_heartbeat = when;
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
