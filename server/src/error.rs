//! Error types for the tournament server.

use shared::TournamentId;
use thiserror::Error;

pub const MAX_TOURNAMENT_NAME: usize = 32;

/// Rejections of tournament requests.
///
/// `NotFound` and `NotInMatch` describe a stale or missing target and are
/// dropped silently; every other variant is answered with an `error` message
/// to the requesting connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TournamentError {
    #[error("tournament {0} does not exist")]
    NotFound(TournamentId),
    #[error("only the creator of the tournament can do that")]
    NotCreator,
    #[error("the tournament has already started")]
    AlreadyStarted,
    #[error("you are already subscribed to this tournament")]
    AlreadySubscribed,
    #[error("you are not subscribed to this tournament")]
    NotSubscribed,
    #[error("a tournament needs at least two players")]
    NotEnoughPlayers,
    #[error("tournament names must be 1 to {MAX_TOURNAMENT_NAME} characters")]
    InvalidName,
    #[error("the server cannot host more tournaments right now")]
    TooManyTournaments,
    #[error("you are not playing in a running match")]
    NotInMatch,
}

impl TournamentError {
    pub fn is_silent(&self) -> bool {
        matches!(self, TournamentError::NotFound(_) | TournamentError::NotInMatch)
    }
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("history record could not be encoded: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("tick rate must be between 1 and 1000 Hz, got {0}")]
    TickRate(u32),
    #[error("score to win must be at least 1")]
    ScoreToWin,
    #[error("{0} must be at least 1")]
    ZeroCapacity(&'static str),
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}
