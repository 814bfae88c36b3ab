//! Tournament roster and single-elimination bracket.
//!
//! Everything here is synchronous bookkeeping. The orchestrator serialises
//! access and decides when matches are actually played.

use crate::error::{TournamentError, MAX_TOURNAMENT_NAME};
use log::info;
use shared::{Identity, MatchData, TournamentId, TournamentInfo, UserId};
use std::collections::{BTreeMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TournamentStatus {
    Open,
    Started,
    Finished,
}

/// What the bracket wants played next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BracketStep {
    Play(MatchData),
    Champion(Identity),
}

/// Knockout bracket seeded from the subscription order.
///
/// Each round pairs entrants in order: first with second, third with fourth.
/// An odd entrant out gets a bye and joins the next round after the winners.
#[derive(Debug, Clone)]
pub struct Bracket {
    round: u32,
    pending: VecDeque<MatchData>,
    advancing: Vec<Identity>,
    bye: Option<Identity>,
    in_progress: Option<MatchData>,
}

impl Bracket {
    pub fn seed(players: &[Identity]) -> Self {
        let mut bracket = Self {
            round: 0,
            pending: VecDeque::new(),
            advancing: Vec::new(),
            bye: None,
            in_progress: None,
        };
        bracket.pair_round(players.to_vec());
        bracket
    }

    fn pair_round(&mut self, entrants: Vec<Identity>) {
        self.round += 1;
        let mut entrants = entrants.into_iter();
        while let Some(first) = entrants.next() {
            match entrants.next() {
                Some(second) => self
                    .pending
                    .push_back(MatchData::new(&first, &second, self.round)),
                None => self.bye = Some(first),
            }
        }
    }

    pub fn pending(&self) -> impl Iterator<Item = &MatchData> {
        self.pending.iter()
    }

    /// Pops the next pairing, opening a new round when the current one is
    /// done. Returns None only for an empty bracket or while a match is
    /// still being played.
    pub fn next_step(&mut self) -> Option<BracketStep> {
        if self.in_progress.is_some() {
            return None;
        }

        if let Some(next) = self.pending.pop_front() {
            self.in_progress = Some(next.clone());
            return Some(BracketStep::Play(next));
        }

        let mut entrants = std::mem::take(&mut self.advancing);
        entrants.extend(self.bye.take());
        match entrants.len() {
            0 => None,
            1 => entrants.pop().map(BracketStep::Champion),
            _ => {
                self.pair_round(entrants);
                self.next_step()
            }
        }
    }

    /// Stores the result of the match in progress and advances its winner.
    pub fn record(&mut self, result: MatchData) {
        self.in_progress = None;
        if let Some(winner) = &result.winner {
            self.advancing.push(winner.identity());
        }
    }
}

#[derive(Debug, Clone)]
pub struct Tournament {
    pub id: TournamentId,
    pub name: String,
    pub creator: Identity,
    pub players: Vec<Identity>,
    pub status: TournamentStatus,
    pub bracket: Option<Bracket>,
    pub champion: Option<Identity>,
}

impl Tournament {
    /// A new open tournament with its creator already subscribed.
    pub fn new(id: TournamentId, name: String, creator: Identity) -> Self {
        Self {
            id,
            name,
            players: vec![creator.clone()],
            creator,
            status: TournamentStatus::Open,
            bracket: None,
            champion: None,
        }
    }

    pub fn is_member(&self, user: UserId) -> bool {
        self.players.iter().any(|p| p.id == user)
    }

    pub fn is_creator(&self, user: UserId) -> bool {
        self.creator.id == user
    }

    pub fn subscribe(&mut self, player: Identity) -> Result<(), TournamentError> {
        if self.status != TournamentStatus::Open {
            return Err(TournamentError::AlreadyStarted);
        }
        if self.is_member(player.id) {
            return Err(TournamentError::AlreadySubscribed);
        }
        info!("{} joined tournament {}", player.username, self.name);
        self.players.push(player);
        Ok(())
    }

    pub fn unsubscribe(&mut self, user: UserId) -> Result<(), TournamentError> {
        if self.status != TournamentStatus::Open {
            return Err(TournamentError::AlreadyStarted);
        }
        let before = self.players.len();
        self.players.retain(|p| p.id != user);
        if self.players.len() == before {
            return Err(TournamentError::NotSubscribed);
        }
        Ok(())
    }

    /// Seeds the bracket from the current roster.
    pub fn start(&mut self, requester: UserId) -> Result<&Bracket, TournamentError> {
        if !self.is_creator(requester) {
            return Err(TournamentError::NotCreator);
        }
        if self.status != TournamentStatus::Open {
            return Err(TournamentError::AlreadyStarted);
        }
        if self.players.len() < 2 {
            return Err(TournamentError::NotEnoughPlayers);
        }

        self.status = TournamentStatus::Started;
        info!(
            "Tournament {} started with {} players",
            self.name,
            self.players.len()
        );
        Ok(self.bracket.insert(Bracket::seed(&self.players)))
    }

    pub fn finish(&mut self, champion: Identity) {
        info!("Tournament {} won by {}", self.name, champion.username);
        self.status = TournamentStatus::Finished;
        self.champion = Some(champion);
    }

    pub fn info(&self) -> TournamentInfo {
        TournamentInfo {
            id: self.id,
            name: self.name.clone(),
            creator: self.creator.clone(),
            players: self.players.clone(),
            started: self.status != TournamentStatus::Open,
            finished: self.status == TournamentStatus::Finished,
            round: self.bracket.as_ref().map(|b| b.round).unwrap_or(0),
        }
    }
}

/// Every tournament the server knows about, ordered by id.
#[derive(Debug)]
pub struct TournamentBook {
    tournaments: BTreeMap<TournamentId, Tournament>,
    next_id: TournamentId,
    max_tournaments: usize,
}

impl TournamentBook {
    pub fn new(max_tournaments: usize) -> Self {
        Self {
            tournaments: BTreeMap::new(),
            next_id: 1,
            max_tournaments,
        }
    }

    /// Creates an open tournament. When the book is full the oldest finished
    /// tournament makes room; if none has finished the request is refused.
    pub fn create(
        &mut self,
        name: &str,
        creator: Identity,
    ) -> Result<TournamentId, TournamentError> {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_TOURNAMENT_NAME {
            return Err(TournamentError::InvalidName);
        }

        if self.tournaments.len() >= self.max_tournaments {
            let oldest_finished = self
                .tournaments
                .values()
                .find(|t| t.status == TournamentStatus::Finished)
                .map(|t| t.id)
                .ok_or(TournamentError::TooManyTournaments)?;
            self.tournaments.remove(&oldest_finished);
        }

        let id = self.next_id;
        self.next_id += 1;
        info!("{} created tournament {} ({})", creator.username, id, name);
        self.tournaments
            .insert(id, Tournament::new(id, name.to_string(), creator));
        Ok(id)
    }

    pub fn get(&self, id: TournamentId) -> Result<&Tournament, TournamentError> {
        self.tournaments
            .get(&id)
            .ok_or(TournamentError::NotFound(id))
    }

    pub fn get_mut(&mut self, id: TournamentId) -> Result<&mut Tournament, TournamentError> {
        self.tournaments
            .get_mut(&id)
            .ok_or(TournamentError::NotFound(id))
    }

    /// Removes a tournament on behalf of its creator.
    pub fn remove(
        &mut self,
        id: TournamentId,
        requester: UserId,
    ) -> Result<Tournament, TournamentError> {
        if !self.get(id)?.is_creator(requester) {
            return Err(TournamentError::NotCreator);
        }
        self.tournaments
            .remove(&id)
            .ok_or(TournamentError::NotFound(id))
    }

    pub fn list(&self) -> Vec<TournamentInfo> {
        self.tournaments.values().map(Tournament::info).collect()
    }

    /// Tournaments `user` has joined and which are not finished yet.
    pub fn memberships(&self, user: UserId) -> Vec<TournamentId> {
        self.tournaments
            .values()
            .filter(|t| t.status != TournamentStatus::Finished && t.is_member(user))
            .map(|t| t.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tournaments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tournaments.is_empty()
    }
}
