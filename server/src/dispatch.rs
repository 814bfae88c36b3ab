//! Routes inbound client messages to the orchestrator and keeps connection
//! subscriptions in step with tournament membership.

use crate::client_manager::{ConnectionId, ConnectionRegistry};
use crate::error::TournamentError;
use crate::orchestrator::TournamentOrchestrator;
use crate::outbox::Outbox;
use log::debug;
use shared::{ClientMessage, Identity, ServerMessage, UserInput};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

pub struct Dispatcher {
    registry: Arc<RwLock<ConnectionRegistry>>,
    orchestrator: TournamentOrchestrator,
    outbox: Outbox,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<RwLock<ConnectionRegistry>>,
        orchestrator: TournamentOrchestrator,
        outbox: Outbox,
    ) -> Self {
        Self {
            registry,
            orchestrator,
            outbox,
        }
    }

    pub fn orchestrator(&self) -> &TournamentOrchestrator {
        &self.orchestrator
    }

    /// Registers a verified connection. The new connection listens to every
    /// tournament its user already belongs to and gets the current listing.
    ///
    /// Returns None when the registry is full.
    pub async fn connect(
        &self,
        identity: Identity,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Option<ConnectionId> {
        let user = identity.id;
        let id = self.registry.write().await.add_connection(identity, sender)?;

        let memberships = self.orchestrator.memberships(user).await;
        {
            let mut registry = self.registry.write().await;
            for tournament in memberships {
                registry.subscribe(id, tournament);
            }
        }

        self.outbox.to_connection(
            id,
            ServerMessage::Tournaments {
                data: self.orchestrator.list().await,
            },
        );
        Some(id)
    }

    /// Drops the connection from every subscriber set. Matches keep running.
    pub async fn disconnect(&self, id: ConnectionId) {
        self.registry.write().await.remove_connection(id);
    }

    /// Parses one text frame and acts on it. Malformed frames are dropped.
    pub async fn handle_text(&self, id: ConnectionId, text: &str) {
        match ClientMessage::from_json(text) {
            Ok(message) => self.handle_message(id, message).await,
            Err(e) => debug!("Dropping malformed message from connection {}: {}", id, e),
        }
    }

    pub async fn handle_message(&self, id: ConnectionId, message: ClientMessage) {
        let identity = match self.registry.read().await.identity(id) {
            Some(identity) => identity.clone(),
            None => return,
        };

        if let Err(e) = self.apply(id, &identity, message).await {
            if e.is_silent() {
                debug!("Ignoring request from {}: {}", identity.username, e);
            } else {
                debug!("Rejected request from {}: {}", identity.username, e);
                self.outbox.to_connection(
                    id,
                    ServerMessage::Error {
                        message: e.to_string(),
                    },
                );
            }
        }
    }

    async fn apply(
        &self,
        id: ConnectionId,
        identity: &Identity,
        message: ClientMessage,
    ) -> Result<(), TournamentError> {
        match message {
            ClientMessage::Game { cmd, .. } => {
                if cmd == UserInput::Unknown {
                    debug!("Dropping unknown command from {}", identity.username);
                    return Ok(());
                }
                self.orchestrator.route_input(identity.id, cmd).await
            }
            ClientMessage::ListTournaments => {
                self.outbox.to_connection(
                    id,
                    ServerMessage::Tournaments {
                        data: self.orchestrator.list().await,
                    },
                );
                Ok(())
            }
            ClientMessage::CreateTournament { name } => {
                let tournament = self.orchestrator.create(&name, identity.clone()).await?;
                self.registry
                    .write()
                    .await
                    .subscribe_user(identity.id, tournament);
                Ok(())
            }
            ClientMessage::Subscribe { tournament } => {
                self.orchestrator
                    .subscribe(tournament, identity.clone())
                    .await?;
                self.registry
                    .write()
                    .await
                    .subscribe_user(identity.id, tournament);
                Ok(())
            }
            ClientMessage::Unsubscribe { tournament } => {
                self.orchestrator.unsubscribe(tournament, identity.id).await?;
                self.registry
                    .write()
                    .await
                    .unsubscribe_user(identity.id, tournament);
                Ok(())
            }
            ClientMessage::StartTournament { tournament } => {
                self.orchestrator.start(tournament, identity.id).await?;
                Ok(())
            }
            ClientMessage::DeleteTournament { tournament } => {
                self.orchestrator.delete(tournament, identity.id).await?;
                self.registry.write().await.drop_tournament(tournament);
                Ok(())
            }
            ClientMessage::Watch { tournament } => {
                self.orchestrator.tournament(tournament).await?;
                self.registry.write().await.subscribe(id, tournament);
                Ok(())
            }
            ClientMessage::Unwatch { tournament } => {
                self.registry.write().await.unsubscribe(id, tournament);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::LogHistory;
    use crate::orchestrator::MatchSettings;
    use crate::outbox::{Audience, Outbound};

    struct Fixture {
        dispatcher: Dispatcher,
        registry: Arc<RwLock<ConnectionRegistry>>,
        rx: mpsc::UnboundedReceiver<Outbound>,
    }

    fn fixture() -> Fixture {
        let (outbox, rx) = Outbox::channel();
        let registry = Arc::new(RwLock::new(ConnectionRegistry::new(8)));
        let orchestrator = TournamentOrchestrator::new(
            outbox.clone(),
            Arc::new(LogHistory),
            MatchSettings::default(),
            8,
        );
        Fixture {
            dispatcher: Dispatcher::new(Arc::clone(&registry), orchestrator, outbox),
            registry,
            rx,
        }
    }

    async fn connect(f: &Fixture, id: u32, name: &str) -> ConnectionId {
        let (tx, _rx) = mpsc::channel(8);
        f.dispatcher
            .connect(Identity::new(id, name), tx)
            .await
            .unwrap()
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    fn errors_for(messages: &[Outbound], connection: ConnectionId) -> Vec<String> {
        messages
            .iter()
            .filter(|m| m.audience == Audience::Connection(connection))
            .filter_map(|m| match &m.message {
                ServerMessage::Error { message } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    async fn listeners(f: &Fixture, tournament: u32) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = f
            .registry
            .read()
            .await
            .recipients(Audience::Tournament(tournament))
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        ids.sort_unstable();
        ids
    }

    #[tokio::test]
    async fn test_connect_sends_listing() {
        let mut f = fixture();
        let conn = connect(&f, 1, "alice").await;

        let messages = drain(&mut f.rx);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].audience, Audience::Connection(conn));
        assert!(matches!(messages[0].message, ServerMessage::Tournaments { .. }));
    }

    #[tokio::test]
    async fn test_connect_when_full() {
        let (outbox, _rx) = Outbox::channel();
        let registry = Arc::new(RwLock::new(ConnectionRegistry::new(1)));
        let orchestrator =
            TournamentOrchestrator::new(outbox.clone(), Arc::new(LogHistory), MatchSettings::default(), 8);
        let dispatcher = Dispatcher::new(registry, orchestrator, outbox);

        assert!(dispatcher
            .connect(Identity::new(1, "a"), mpsc::channel(1).0)
            .await
            .is_some());
        assert!(dispatcher
            .connect(Identity::new(2, "b"), mpsc::channel(1).0)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_malformed_input_dropped() {
        let mut f = fixture();
        let conn = connect(&f, 1, "alice").await;
        drain(&mut f.rx);

        f.dispatcher.handle_text(conn, "{not json").await;
        f.dispatcher.handle_text(conn, r#"{"type":"launch"}"#).await;
        f.dispatcher.handle_text(conn, r#"{"type":"game","cmd":9}"#).await;
        assert!(drain(&mut f.rx).is_empty());
    }

    #[tokio::test]
    async fn test_create_subscribes_creator() {
        let mut f = fixture();
        let conn = connect(&f, 1, "alice").await;

        f.dispatcher
            .handle_text(conn, r#"{"type":"create_tournament","name":"cup"}"#)
            .await;
        assert_eq!(listeners(&f, 1).await, vec![conn]);

        let listing = drain(&mut f.rx)
            .into_iter()
            .filter(|m| m.audience == Audience::All)
            .find_map(|m| match m.message {
                ServerMessage::Tournaments { data } => Some(data),
                _ => None,
            })
            .unwrap();
        assert_eq!(listing[0].name, "cup");
        assert_eq!(listing[0].creator.username, "alice");
    }

    #[tokio::test]
    async fn test_rejections_reply_to_sender_only() {
        let mut f = fixture();
        let alice = connect(&f, 1, "alice").await;
        let bob = connect(&f, 2, "bob").await;

        f.dispatcher
            .handle_message(alice, ClientMessage::CreateTournament { name: "cup".into() })
            .await;
        f.dispatcher
            .handle_message(bob, ClientMessage::Subscribe { tournament: 1 })
            .await;
        drain(&mut f.rx);

        f.dispatcher
            .handle_message(bob, ClientMessage::StartTournament { tournament: 1 })
            .await;
        f.dispatcher
            .handle_message(bob, ClientMessage::DeleteTournament { tournament: 1 })
            .await;
        f.dispatcher
            .handle_message(bob, ClientMessage::Subscribe { tournament: 1 })
            .await;

        let messages = drain(&mut f.rx);
        assert_eq!(
            errors_for(&messages, bob),
            vec![
                TournamentError::NotCreator.to_string(),
                TournamentError::NotCreator.to_string(),
                TournamentError::AlreadySubscribed.to_string(),
            ]
        );
        assert!(errors_for(&messages, alice).is_empty());
    }

    #[tokio::test]
    async fn test_missing_targets_are_silent() {
        let mut f = fixture();
        let conn = connect(&f, 1, "alice").await;
        drain(&mut f.rx);

        f.dispatcher
            .handle_message(conn, ClientMessage::Subscribe { tournament: 42 })
            .await;
        f.dispatcher
            .handle_message(conn, ClientMessage::Watch { tournament: 42 })
            .await;
        f.dispatcher
            .handle_text(conn, r#"{"type":"game","cmd":1,"paddle":1}"#)
            .await;

        assert!(drain(&mut f.rx).is_empty());
        assert!(listeners(&f, 42).await.is_empty());
    }

    #[tokio::test]
    async fn test_watch_and_unwatch() {
        let f = fixture();
        let alice = connect(&f, 1, "alice").await;
        let carol = connect(&f, 3, "carol").await;
        f.dispatcher
            .handle_message(alice, ClientMessage::CreateTournament { name: "cup".into() })
            .await;

        f.dispatcher
            .handle_message(carol, ClientMessage::Watch { tournament: 1 })
            .await;
        assert_eq!(listeners(&f, 1).await, vec![alice, carol]);

        f.dispatcher
            .handle_message(carol, ClientMessage::Unwatch { tournament: 1 })
            .await;
        assert_eq!(listeners(&f, 1).await, vec![alice]);
    }

    #[tokio::test]
    async fn test_reconnect_reattaches_membership() {
        let f = fixture();
        let first = connect(&f, 1, "alice").await;
        f.dispatcher
            .handle_message(first, ClientMessage::CreateTournament { name: "cup".into() })
            .await;

        f.dispatcher.disconnect(first).await;
        assert!(listeners(&f, 1).await.is_empty());

        let second = connect(&f, 1, "alice").await;
        assert_eq!(listeners(&f, 1).await, vec![second]);
    }

    #[tokio::test]
    async fn test_delete_clears_listeners() {
        let f = fixture();
        let alice = connect(&f, 1, "alice").await;
        let carol = connect(&f, 3, "carol").await;
        f.dispatcher
            .handle_message(alice, ClientMessage::CreateTournament { name: "cup".into() })
            .await;
        f.dispatcher
            .handle_message(carol, ClientMessage::Watch { tournament: 1 })
            .await;

        f.dispatcher
            .handle_message(alice, ClientMessage::DeleteTournament { tournament: 1 })
            .await;
        assert!(listeners(&f, 1).await.is_empty());
        assert!(f.dispatcher.orchestrator().list().await.is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_broadcasts() {
        let f = fixture();
        let alice = connect(&f, 1, "alice").await;
        let bob = connect(&f, 2, "bob").await;
        f.dispatcher
            .handle_message(alice, ClientMessage::CreateTournament { name: "cup".into() })
            .await;
        f.dispatcher
            .handle_message(bob, ClientMessage::Subscribe { tournament: 1 })
            .await;
        assert_eq!(listeners(&f, 1).await, vec![alice, bob]);

        f.dispatcher
            .handle_message(bob, ClientMessage::Unsubscribe { tournament: 1 })
            .await;
        assert_eq!(listeners(&f, 1).await, vec![alice]);
    }
}
