//! Live connection registry for the tournament server
//!
//! This module tracks which connections are open and who is behind them:
//! - Connection lifecycle (add on upgrade, remove on close)
//! - Capacity limiting
//! - Per-connection tournament subscriptions used to address broadcasts
//!
//! The registry is owned by the server root and shared with the dispatcher
//! and the fan-out task behind a `RwLock`. Tournament membership lives in the
//! orchestrator; the registry only knows which connections listen to what.

use crate::outbox::Audience;
use log::info;
use shared::{Identity, ServerMessage, TournamentId, UserId};
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tokio::sync::mpsc;

pub type ConnectionId = u32;

/// One open connection and its outgoing queue
#[derive(Debug)]
pub struct Connection {
    /// Unique connection identifier assigned by the registry
    pub id: ConnectionId,
    /// Verified user behind the connection
    pub identity: Identity,
    /// Bounded queue drained by the connection's writer task
    pub sender: mpsc::Sender<ServerMessage>,
    /// Tournaments whose broadcasts this connection receives
    pub subscriptions: HashSet<TournamentId>,
    pub connected_at: Instant,
}

impl Connection {
    pub fn new(id: ConnectionId, identity: Identity, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id,
            identity,
            sender,
            subscriptions: HashSet::new(),
            connected_at: Instant::now(),
        }
    }
}

/// All open connections, indexed by id
///
/// Ids start at 1 and are never reused. A user may hold several connections
/// at once (for example two browser tabs); each one is addressed separately.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
    next_connection_id: ConnectionId,
    max_connections: usize,
}

impl ConnectionRegistry {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: HashMap::new(),
            next_connection_id: 1,
            max_connections,
        }
    }

    /// Registers a connection, or returns None when the registry is full.
    pub fn add_connection(
        &mut self,
        identity: Identity,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Option<ConnectionId> {
        if self.connections.len() >= self.max_connections {
            return None;
        }

        let id = self.next_connection_id;
        self.next_connection_id += 1;

        info!(
            "Connection {} opened for {} (user {})",
            id, identity.username, identity.id
        );
        self.connections
            .insert(id, Connection::new(id, identity, sender));
        Some(id)
    }

    /// Forgets a connection along with all its subscriptions.
    pub fn remove_connection(&mut self, id: ConnectionId) -> Option<Connection> {
        let connection = self.connections.remove(&id)?;
        info!(
            "Connection {} closed for {} after {:.1}s",
            id,
            connection.identity.username,
            connection.connected_at.elapsed().as_secs_f32()
        );
        Some(connection)
    }

    pub fn identity(&self, id: ConnectionId) -> Option<&Identity> {
        self.connections.get(&id).map(|c| &c.identity)
    }

    /// Returns false if the connection is unknown.
    pub fn subscribe(&mut self, id: ConnectionId, tournament: TournamentId) -> bool {
        match self.connections.get_mut(&id) {
            Some(connection) => {
                connection.subscriptions.insert(tournament);
                true
            }
            None => false,
        }
    }

    pub fn unsubscribe(&mut self, id: ConnectionId, tournament: TournamentId) -> bool {
        self.connections
            .get_mut(&id)
            .map(|c| c.subscriptions.remove(&tournament))
            .unwrap_or(false)
    }

    /// Subscribes every connection of `user` to `tournament`.
    pub fn subscribe_user(&mut self, user: UserId, tournament: TournamentId) {
        for connection in self.connections.values_mut() {
            if connection.identity.id == user {
                connection.subscriptions.insert(tournament);
            }
        }
    }

    pub fn unsubscribe_user(&mut self, user: UserId, tournament: TournamentId) {
        for connection in self.connections.values_mut() {
            if connection.identity.id == user {
                connection.subscriptions.remove(&tournament);
            }
        }
    }

    /// Removes a deleted tournament from every subscription set.
    pub fn drop_tournament(&mut self, tournament: TournamentId) {
        for connection in self.connections.values_mut() {
            connection.subscriptions.remove(&tournament);
        }
    }

    /// Resolves an audience to the queues that should receive the message.
    pub fn recipients(&self, audience: Audience) -> Vec<(ConnectionId, mpsc::Sender<ServerMessage>)> {
        match audience {
            Audience::All => self
                .connections
                .values()
                .map(|c| (c.id, c.sender.clone()))
                .collect(),
            Audience::Connection(id) => self
                .connections
                .get(&id)
                .map(|c| vec![(c.id, c.sender.clone())])
                .unwrap_or_default(),
            Audience::Tournament(tournament) => self
                .connections
                .values()
                .filter(|c| c.subscriptions.contains(&tournament))
                .map(|c| (c.id, c.sender.clone()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> mpsc::Sender<ServerMessage> {
        mpsc::channel(4).0
    }

    fn ids(mut recipients: Vec<(ConnectionId, mpsc::Sender<ServerMessage>)>) -> Vec<ConnectionId> {
        recipients.sort_by_key(|(id, _)| *id);
        recipients.into_iter().map(|(id, _)| id).collect()
    }

    #[test]
    fn test_registry_creation() {
        let registry = ConnectionRegistry::new(5);
        assert_eq!(registry.max_connections, 5);
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_add_connection() {
        let mut registry = ConnectionRegistry::new(2);

        let first = registry.add_connection(Identity::new(10, "alice"), queue());
        let second = registry.add_connection(Identity::new(11, "bob"), queue());
        assert_eq!(first, Some(1));
        assert_eq!(second, Some(2));
        assert_eq!(registry.identity(1).map(|i| i.username.as_str()), Some("alice"));
    }

    #[test]
    fn test_capacity_limit() {
        let mut registry = ConnectionRegistry::new(1);
        assert!(registry.add_connection(Identity::new(1, "a"), queue()).is_some());
        assert!(registry.add_connection(Identity::new(2, "b"), queue()).is_none());

        registry.remove_connection(1);
        // Ids are not reused.
        assert_eq!(registry.add_connection(Identity::new(2, "b"), queue()), Some(2));
    }

    #[test]
    fn test_remove_connection() {
        let mut registry = ConnectionRegistry::new(4);
        registry.add_connection(Identity::new(1, "a"), queue());

        assert!(registry.remove_connection(1).is_some());
        assert!(registry.remove_connection(1).is_none());
        assert!(registry.identity(1).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_subscriptions() {
        let mut registry = ConnectionRegistry::new(4);
        let a = registry.add_connection(Identity::new(1, "a"), queue()).unwrap();
        let b = registry.add_connection(Identity::new(2, "b"), queue()).unwrap();

        assert!(registry.subscribe(a, 7));
        assert!(registry.subscribe(b, 7));
        assert!(registry.subscribe(b, 8));
        assert!(!registry.subscribe(99, 7));

        assert_eq!(ids(registry.recipients(Audience::Tournament(7))), vec![a, b]);
        assert_eq!(ids(registry.recipients(Audience::Tournament(8))), vec![b]);

        assert!(registry.unsubscribe(b, 7));
        assert!(!registry.unsubscribe(b, 7));
        assert_eq!(ids(registry.recipients(Audience::Tournament(7))), vec![a]);
    }

    #[test]
    fn test_user_with_several_connections() {
        let mut registry = ConnectionRegistry::new(4);
        let tab1 = registry.add_connection(Identity::new(1, "a"), queue()).unwrap();
        let other = registry.add_connection(Identity::new(2, "b"), queue()).unwrap();
        let tab2 = registry.add_connection(Identity::new(1, "a"), queue()).unwrap();

        registry.subscribe_user(1, 3);
        assert_eq!(ids(registry.recipients(Audience::Tournament(3))), vec![tab1, tab2]);

        registry.unsubscribe_user(1, 3);
        assert!(registry.recipients(Audience::Tournament(3)).is_empty());
        assert_eq!(ids(registry.recipients(Audience::All)), vec![tab1, other, tab2]);
    }

    #[test]
    fn test_drop_tournament() {
        let mut registry = ConnectionRegistry::new(4);
        let a = registry.add_connection(Identity::new(1, "a"), queue()).unwrap();
        registry.subscribe(a, 5);
        registry.subscribe(a, 6);

        registry.drop_tournament(5);
        assert!(registry.recipients(Audience::Tournament(5)).is_empty());
        assert_eq!(ids(registry.recipients(Audience::Tournament(6))), vec![a]);
    }

    #[test]
    fn test_connection_audience() {
        let mut registry = ConnectionRegistry::new(4);
        let a = registry.add_connection(Identity::new(1, "a"), queue()).unwrap();
        assert_eq!(ids(registry.recipients(Audience::Connection(a))), vec![a]);
        assert!(registry.recipients(Audience::Connection(42)).is_empty());
    }
}
