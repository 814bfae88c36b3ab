//! Non-blocking hand-off of outgoing messages to the fan-out task.

use crate::client_manager::ConnectionId;
use log::error;
use shared::{ServerMessage, TournamentId};
use tokio::sync::mpsc;

/// Who a message is for, resolved against the registry at delivery time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    All,
    Connection(ConnectionId),
    Tournament(TournamentId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub audience: Audience,
    pub message: ServerMessage,
}

/// Cloneable producer side. Sending never waits, so a match tick is never
/// held up by a slow connection.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl Outbox {
    pub fn new(tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn send(&self, audience: Audience, message: ServerMessage) {
        if let Err(e) = self.tx.send(Outbound { audience, message }) {
            error!("Fan-out task is gone, dropping {:?}", e.0.message);
        }
    }

    pub fn broadcast(&self, message: ServerMessage) {
        self.send(Audience::All, message);
    }

    pub fn to_connection(&self, id: ConnectionId, message: ServerMessage) {
        self.send(Audience::Connection(id), message);
    }

    pub fn to_tournament(&self, id: TournamentId, message: ServerMessage) {
        self.send(Audience::Tournament(id), message);
    }
}
