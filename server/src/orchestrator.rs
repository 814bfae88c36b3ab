//! Tournament lifecycle and bracket driver.
//!
//! Roster changes go through one lock so that a start can never race a
//! delete. Once a tournament starts, a driver task walks its bracket: it
//! announces each pairing, counts down, runs the match on its own tick task
//! and records the result. Matches of one tournament run one after another;
//! different tournaments run side by side, except that a user plays at most
//! one match at a time. A pairing whose player is busy elsewhere waits.

use crate::error::TournamentError;
use crate::game::Match;
use crate::history::{self, MatchHistory, MatchRecord};
use crate::match_loop::{self, MatchController};
use crate::outbox::{Audience, Outbox};
use crate::tournament::{Bracket, BracketStep, TournamentBook};
use crate::utils::get_timestamp;
use log::{debug, info};
use shared::{
    Identity, MatchData, ServerMessage, TournamentId, TournamentInfo, UserId, UserInput,
    DEFAULT_COUNTDOWN_SECS, DEFAULT_SCORE_TO_WIN, TICK_RATE,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// How long a pairing waits before checking again for a busy player.
const BUSY_RETRY: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchSettings {
    pub tick_rate: u32,
    pub score_to_win: u32,
    pub countdown_secs: u32,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            tick_rate: TICK_RATE,
            score_to_win: DEFAULT_SCORE_TO_WIN,
            countdown_secs: DEFAULT_COUNTDOWN_SECS,
        }
    }
}

struct RunningBracket {
    driver: Option<JoinHandle<()>>,
    active: Option<MatchController>,
}

struct State {
    book: TournamentBook,
    running: HashMap<TournamentId, RunningBracket>,
    /// The tournament whose match each player is currently in.
    live: HashMap<UserId, TournamentId>,
}

impl State {
    /// Claims both players for tournament `id`. False if either is busy in
    /// another tournament.
    fn claim(&mut self, id: TournamentId, players: (UserId, UserId)) -> bool {
        let busy = |user: UserId| self.live.get(&user).map_or(false, |t| *t != id);
        if busy(players.0) || busy(players.1) {
            return false;
        }
        self.live.insert(players.0, id);
        self.live.insert(players.1, id);
        true
    }

    fn release(&mut self, id: TournamentId) {
        self.live.retain(|_, t| *t != id);
    }
}

struct Inner {
    state: Mutex<State>,
    outbox: Outbox,
    history: Arc<dyn MatchHistory>,
    settings: MatchSettings,
}

#[derive(Clone)]
pub struct TournamentOrchestrator {
    inner: Arc<Inner>,
}

impl TournamentOrchestrator {
    pub fn new(
        outbox: Outbox,
        history: Arc<dyn MatchHistory>,
        settings: MatchSettings,
        max_tournaments: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    book: TournamentBook::new(max_tournaments),
                    running: HashMap::new(),
                    live: HashMap::new(),
                }),
                outbox,
                history,
                settings,
            }),
        }
    }

    pub fn settings(&self) -> MatchSettings {
        self.inner.settings
    }

    pub async fn create(
        &self,
        name: &str,
        creator: Identity,
    ) -> Result<TournamentId, TournamentError> {
        let mut state = self.inner.state.lock().await;
        let id = state.book.create(name, creator)?;
        self.inner.publish_listing(&state);
        Ok(id)
    }

    pub async fn subscribe(
        &self,
        id: TournamentId,
        player: Identity,
    ) -> Result<(), TournamentError> {
        let mut state = self.inner.state.lock().await;
        state.book.get_mut(id)?.subscribe(player)?;
        self.inner.publish_listing(&state);
        Ok(())
    }

    pub async fn unsubscribe(&self, id: TournamentId, user: UserId) -> Result<(), TournamentError> {
        let mut state = self.inner.state.lock().await;
        state.book.get_mut(id)?.unsubscribe(user)?;
        self.inner.publish_listing(&state);
        Ok(())
    }

    /// Starts the bracket and returns the first-round pairings.
    pub async fn start(
        &self,
        id: TournamentId,
        requester: UserId,
    ) -> Result<Vec<MatchData>, TournamentError> {
        let mut state = self.inner.state.lock().await;
        let first_round: Vec<MatchData> = state
            .book
            .get_mut(id)?
            .start(requester)?
            .pending()
            .cloned()
            .collect();

        // The driver blocks on the lock until this call returns.
        let driver = tokio::spawn(run_bracket(Arc::clone(&self.inner), id));
        state.running.insert(
            id,
            RunningBracket {
                driver: Some(driver),
                active: None,
            },
        );
        self.inner.publish_listing(&state);
        Ok(first_round)
    }

    /// Deletes a tournament on behalf of its creator, stopping its bracket
    /// and any match in flight. Nothing further is recorded for it.
    pub async fn delete(&self, id: TournamentId, requester: UserId) -> Result<(), TournamentError> {
        let mut state = self.inner.state.lock().await;
        let tournament = state.book.remove(id, requester)?;

        if let Some(running) = state.running.remove(&id) {
            if let Some(active) = running.active {
                active.cancel();
            }
            if let Some(driver) = running.driver {
                driver.abort();
            }
        }
        state.release(id);

        info!("Tournament {} ({}) deleted", id, tournament.name);
        self.inner.publish_listing(&state);
        Ok(())
    }

    pub async fn list(&self) -> Vec<TournamentInfo> {
        self.inner.state.lock().await.book.list()
    }

    pub async fn tournament(&self, id: TournamentId) -> Result<TournamentInfo, TournamentError> {
        Ok(self.inner.state.lock().await.book.get(id)?.info())
    }

    /// Unfinished tournaments `user` has joined.
    pub async fn memberships(&self, user: UserId) -> Vec<TournamentId> {
        self.inner.state.lock().await.book.memberships(user)
    }

    /// Forwards `cmd` to the match `user` is currently playing.
    pub async fn route_input(&self, user: UserId, cmd: UserInput) -> Result<(), TournamentError> {
        let state = self.inner.state.lock().await;
        let delivered = state
            .live
            .get(&user)
            .and_then(|id| state.running.get(id))
            .and_then(|running| running.active.as_ref())
            .filter(|active| active.is_playing(user))
            .map_or(false, |active| active.send_input(user, cmd));

        if delivered {
            Ok(())
        } else {
            Err(TournamentError::NotInMatch)
        }
    }

    pub async fn broadcast_listing(&self) {
        let state = self.inner.state.lock().await;
        self.inner.publish_listing(&state);
    }

    /// Number of brackets currently being driven.
    pub async fn running_count(&self) -> usize {
        self.inner.state.lock().await.running.len()
    }
}

impl Inner {
    fn publish_listing(&self, state: &State) {
        self.outbox.broadcast(ServerMessage::Tournaments {
            data: state.book.list(),
        });
    }
}

async fn run_bracket(inner: Arc<Inner>, id: TournamentId) {
    loop {
        let step = {
            let mut state = inner.state.lock().await;
            match state.book.get_mut(id) {
                Ok(tournament) => tournament.bracket.as_mut().and_then(Bracket::next_step),
                Err(_) => return,
            }
        };

        let data = match step {
            Some(BracketStep::Play(data)) => data,
            Some(BracketStep::Champion(champion)) => {
                let mut state = inner.state.lock().await;
                if let Ok(tournament) = state.book.get_mut(id) {
                    tournament.finish(champion);
                }
                state.running.remove(&id);
                state.release(id);
                inner.publish_listing(&state);
                return;
            }
            None => {
                debug!("Tournament {} has nothing left to play", id);
                inner.state.lock().await.running.remove(&id);
                return;
            }
        };

        let outcome = play(&inner, id, data).await;

        let outcome = {
            let mut state = inner.state.lock().await;
            state.release(id);
            if let Some(running) = state.running.get_mut(&id) {
                running.active = None;
            }
            let Some(outcome) = outcome else {
                return;
            };
            if let Some(bracket) = state
                .book
                .get_mut(id)
                .ok()
                .and_then(|t| t.bracket.as_mut())
            {
                bracket.record(outcome.clone());
            }
            inner.publish_listing(&state);
            outcome
        };

        inner.outbox.to_tournament(
            id,
            ServerMessage::TournamentUpdate {
                data: outcome.clone(),
            },
        );
        if let Some(record) = MatchRecord::from_match(&outcome, get_timestamp(), Some(id)) {
            history::persist(Arc::clone(&inner.history), record);
        }
    }
}

/// Waits until neither player is busy in another tournament, then announces,
/// counts down and plays one pairing. None if the tournament went away in the
/// meantime.
async fn play(inner: &Arc<Inner>, id: TournamentId, data: MatchData) -> Option<MatchData> {
    let settings = inner.settings;
    let players = (data.player1.id, data.player2.id);
    loop {
        {
            let mut state = inner.state.lock().await;
            if !state.running.contains_key(&id) {
                return None;
            }
            if state.claim(id, players) {
                break;
            }
        }
        debug!(
            "Tournament {}: {} or {} is still playing elsewhere",
            id, data.player1.username, data.player2.username
        );
        tokio::time::sleep(BUSY_RETRY).await;
    }
    info!(
        "Tournament {} round {}: {} vs {}",
        id, data.round, data.player1.username, data.player2.username
    );

    inner.outbox.to_tournament(
        id,
        ServerMessage::NextMatch {
            data: data.clone(),
        },
    );
    {
        let state = inner.state.lock().await;
        inner.publish_listing(&state);
    }

    for remaining in (0..=settings.countdown_secs).rev() {
        inner
            .outbox
            .to_tournament(id, ServerMessage::CountDown { time: remaining });
        if remaining > 0 {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    // Registered before the first snapshot can reach a player.
    let handle = {
        let mut state = inner.state.lock().await;
        let running = state.running.get_mut(&id)?;
        let handle = match_loop::spawn(
            Match::new(data, settings.score_to_win),
            Audience::Tournament(id),
            inner.outbox.clone(),
            settings.tick_rate,
        );
        running.active = Some(handle.controller());
        handle
    };

    let outcome = handle.wait().await;
    if outcome.completed {
        Some(outcome.data)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryHistory;
    use crate::outbox::Outbound;
    use tokio::sync::mpsc;

    struct Fixture {
        orchestrator: TournamentOrchestrator,
        history: Arc<MemoryHistory>,
        rx: mpsc::UnboundedReceiver<Outbound>,
    }

    fn fixture(score_to_win: u32, countdown_secs: u32) -> Fixture {
        let (outbox, rx) = Outbox::channel();
        let history = Arc::new(MemoryHistory::default());
        let settings = MatchSettings {
            tick_rate: 60,
            score_to_win,
            countdown_secs,
        };
        Fixture {
            orchestrator: TournamentOrchestrator::new(outbox, history.clone(), settings, 8),
            history,
            rx,
        }
    }

    fn player(id: UserId) -> Identity {
        Identity::new(id, format!("p{}", id))
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    /// Keeps trying until the user's match is live.
    async fn steer(orchestrator: &TournamentOrchestrator, user: UserId, cmd: UserInput) {
        for _ in 0..1000 {
            if orchestrator.route_input(user, cmd).await.is_ok() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("user {} never got a live match", user);
    }

    async fn wait_finished(orchestrator: &TournamentOrchestrator, id: TournamentId) {
        for _ in 0..600 {
            if orchestrator.tournament(id).await.map(|t| t.finished) == Ok(true) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("tournament {} never finished", id);
    }

    #[tokio::test]
    async fn test_create_subscribe_and_list() {
        let mut f = fixture(10, 5);
        let id = f.orchestrator.create("cup", player(1)).await.unwrap();
        f.orchestrator.subscribe(id, player(2)).await.unwrap();

        let list = f.orchestrator.list().await;
        assert_eq!(list.len(), 1);
        let names: Vec<&str> = list[0].players.iter().map(|p| p.username.as_str()).collect();
        assert_eq!(names, vec!["p1", "p2"]);

        // Every roster change is announced to everyone.
        let listings = drain(&mut f.rx)
            .into_iter()
            .filter(|m| {
                m.audience == Audience::All
                    && matches!(m.message, ServerMessage::Tournaments { .. })
            })
            .count();
        assert_eq!(listings, 2);

        assert_eq!(f.orchestrator.memberships(2).await, vec![id]);
        f.orchestrator.unsubscribe(id, 2).await.unwrap();
        assert!(f.orchestrator.memberships(2).await.is_empty());
    }

    #[tokio::test]
    async fn test_start_rules() {
        let f = fixture(10, 5);
        let id = f.orchestrator.create("cup", player(1)).await.unwrap();

        assert_eq!(
            f.orchestrator.start(id, 1).await,
            Err(TournamentError::NotEnoughPlayers)
        );
        f.orchestrator.subscribe(id, player(2)).await.unwrap();
        assert_eq!(
            f.orchestrator.start(id, 2).await,
            Err(TournamentError::NotCreator)
        );
        assert_eq!(
            f.orchestrator.start(99, 1).await,
            Err(TournamentError::NotFound(99))
        );
        assert!(f.orchestrator.start(id, 1).await.is_ok());
        assert_eq!(
            f.orchestrator.start(id, 1).await,
            Err(TournamentError::AlreadyStarted)
        );

        f.orchestrator.delete(id, 1).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_four_players_pair_in_order() {
        let f = fixture(10, 5);
        let id = f.orchestrator.create("cup", player(1)).await.unwrap();
        for user in 2..=4 {
            f.orchestrator.subscribe(id, player(user)).await.unwrap();
        }

        let first_round = f.orchestrator.start(id, 1).await.unwrap();
        let pairs: Vec<(UserId, UserId)> = first_round
            .iter()
            .map(|m| (m.player1.id, m.player2.id))
            .collect();
        assert_eq!(pairs, vec![(1, 2), (3, 4)]);
        assert!(first_round.iter().all(|m| m.round == 1));

        assert_eq!(
            f.orchestrator.subscribe(id, player(5)).await,
            Err(TournamentError::AlreadyStarted)
        );

        f.orchestrator.delete(id, 1).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_tournament_plays_to_champion() {
        let mut f = fixture(1, 2);
        let id = f.orchestrator.create("final", player(1)).await.unwrap();
        f.orchestrator.subscribe(id, player(2)).await.unwrap();
        f.orchestrator.start(id, 1).await.unwrap();

        // Right paddle runs to the top and stays there; the left player scores.
        steer(&f.orchestrator, 2, UserInput::MoveUpStart).await;
        wait_finished(&f.orchestrator, id).await;

        let info = f.orchestrator.tournament(id).await.unwrap();
        assert!(info.started && info.finished);
        assert_eq!(f.orchestrator.running_count().await, 0);
        assert!(f.orchestrator.memberships(1).await.is_empty());

        let messages: Vec<ServerMessage> = drain(&mut f.rx)
            .into_iter()
            .filter(|m| m.audience == Audience::Tournament(id))
            .map(|m| m.message)
            .collect();

        assert!(matches!(
            messages.first(),
            Some(ServerMessage::NextMatch { data }) if data.player1.id == 1 && data.player2.id == 2
        ));
        let countdown: Vec<u32> = messages
            .iter()
            .filter_map(|m| match m {
                ServerMessage::CountDown { time } => Some(*time),
                _ => None,
            })
            .collect();
        assert_eq!(countdown, vec![2, 1, 0]);
        assert!(messages
            .iter()
            .any(|m| matches!(m, ServerMessage::Game { .. })));

        let last_update = messages
            .iter()
            .rev()
            .find_map(|m| match m {
                ServerMessage::TournamentUpdate { data } => Some(data.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(last_update.winner.map(|w| w.id), Some(1));

        // Persisted off the async workers; give it a moment.
        for _ in 0..100 {
            if !f.history.records().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let records = f.history.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].winner_id, 1);
        assert_eq!(records[0].loser_id, 2);
        assert_eq!(records[0].tournament_id, Some(id));

        assert_eq!(
            f.orchestrator.subscribe(id, player(3)).await,
            Err(TournamentError::AlreadyStarted)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_cancels_running_match() {
        let f = fixture(10, 1);
        let id = f.orchestrator.create("cup", player(1)).await.unwrap();
        f.orchestrator.subscribe(id, player(2)).await.unwrap();
        f.orchestrator.start(id, 1).await.unwrap();
        steer(&f.orchestrator, 1, UserInput::MoveDownStart).await;

        assert_eq!(
            f.orchestrator.delete(id, 2).await,
            Err(TournamentError::NotCreator)
        );
        f.orchestrator.delete(id, 1).await.unwrap();

        assert!(f.orchestrator.list().await.is_empty());
        assert_eq!(f.orchestrator.running_count().await, 0);
        assert_eq!(
            f.orchestrator.route_input(1, UserInput::MoveUpStart).await,
            Err(TournamentError::NotInMatch)
        );

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(f.history.records().is_empty());
    }

    fn snapshots_for(messages: &[Outbound], id: TournamentId) -> Vec<shared::Snapshot> {
        messages
            .iter()
            .filter(|m| m.audience == Audience::Tournament(id))
            .filter_map(|m| match &m.message {
                ServerMessage::Game { data } => Some(*data),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_live_match_per_user() {
        let mut f = fixture(10, 0);
        // User 1 plays left in the first tournament and right in the second.
        let first = f.orchestrator.create("first", player(1)).await.unwrap();
        f.orchestrator.subscribe(first, player(2)).await.unwrap();
        let second = f.orchestrator.create("second", player(3)).await.unwrap();
        f.orchestrator.subscribe(second, player(1)).await.unwrap();

        f.orchestrator.start(first, 1).await.unwrap();
        steer(&f.orchestrator, 2, UserInput::MoveUpStart).await;
        f.orchestrator.start(second, 3).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        // The second pairing waits for user 1.
        assert_eq!(
            f.orchestrator.route_input(3, UserInput::MoveUpStart).await,
            Err(TournamentError::NotInMatch)
        );

        drain(&mut f.rx);
        f.orchestrator
            .route_input(1, UserInput::MoveDownStart)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let messages = drain(&mut f.rx);
        assert!(snapshots_for(&messages, second).is_empty());
        assert!(snapshots_for(&messages, first)
            .iter()
            .any(|s| s.paddle_left.speed > 0.0));

        // With the first tournament gone the queued pairing plays.
        f.orchestrator.delete(first, 1).await.unwrap();
        steer(&f.orchestrator, 3, UserInput::MoveUpStart).await;
        drain(&mut f.rx);
        f.orchestrator
            .route_input(1, UserInput::MoveDownStart)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(snapshots_for(&drain(&mut f.rx), second)
            .iter()
            .any(|s| s.paddle_right.speed > 0.0));

        f.orchestrator.delete(second, 3).await.unwrap();
        assert_eq!(
            f.orchestrator.route_input(1, UserInput::MoveDownStart).await,
            Err(TournamentError::NotInMatch)
        );
    }

    #[tokio::test]
    async fn test_input_outside_match() {
        let f = fixture(10, 5);
        assert_eq!(
            f.orchestrator.route_input(1, UserInput::MoveUpStart).await,
            Err(TournamentError::NotInMatch)
        );
    }
}
