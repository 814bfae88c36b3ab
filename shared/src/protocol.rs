//! JSON wire messages exchanged over each WebSocket connection.
//!
//! Every message is an object discriminated by its `type` field. Inbound
//! types are snake_case (`create_tournament`), outbound types camelCase
//! (`nextMatch`), matching what existing browser clients already speak.

use serde::{Deserialize, Serialize};

pub type UserId = u32;
pub type TournamentId = u32;

/// Close code sent when the upgrade request carries no token.
pub const CLOSE_NO_TOKEN: u16 = 4000;
/// Close code sent when the token is not accepted.
pub const CLOSE_INVALID_TOKEN: u16 = 4001;
/// Close code sent when the server has no room for another connection.
pub const CLOSE_TRY_AGAIN_LATER: u16 = 1013;

/// Paddle commands, carried on the wire as small integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum UserInput {
    Unknown,
    MoveUpStart,
    MoveUpEnd,
    MoveDownStart,
    MoveDownEnd,
}

impl From<u8> for UserInput {
    fn from(value: u8) -> Self {
        match value {
            1 => UserInput::MoveUpStart,
            2 => UserInput::MoveUpEnd,
            3 => UserInput::MoveDownStart,
            4 => UserInput::MoveDownEnd,
            _ => UserInput::Unknown,
        }
    }
}

impl From<UserInput> for u8 {
    fn from(value: UserInput) -> Self {
        match value {
            UserInput::Unknown => 0,
            UserInput::MoveUpStart => 1,
            UserInput::MoveUpEnd => 2,
            UserInput::MoveDownStart => 3,
            UserInput::MoveDownEnd => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum PaddleSide {
    Unknown,
    Left,
    Right,
}

impl From<u8> for PaddleSide {
    fn from(value: u8) -> Self {
        match value {
            1 => PaddleSide::Left,
            2 => PaddleSide::Right,
            _ => PaddleSide::Unknown,
        }
    }
}

impl From<PaddleSide> for u8 {
    fn from(value: PaddleSide) -> Self {
        match value {
            PaddleSide::Unknown => 0,
            PaddleSide::Left => 1,
            PaddleSide::Right => 2,
        }
    }
}

impl Default for PaddleSide {
    fn default() -> Self {
        PaddleSide::Unknown
    }
}

/// A verified user as handed over by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub username: String,
}

impl Identity {
    pub fn new(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: UserId,
    pub username: String,
    pub score: u32,
}

impl From<&Identity> for Player {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id,
            username: identity.username.clone(),
            score: 0,
        }
    }
}

impl Player {
    pub fn identity(&self) -> Identity {
        Identity::new(self.id, self.username.clone())
    }
}

/// Pairing and live score of one bracket match. `player1` plays left.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchData {
    pub player1: Player,
    pub player2: Player,
    pub winner: Option<Player>,
    pub round: u32,
}

impl MatchData {
    pub fn new(player1: &Identity, player2: &Identity, round: u32) -> Self {
        Self {
            player1: player1.into(),
            player2: player2.into(),
            winner: None,
            round,
        }
    }

    /// The player who did not win, once a winner is set.
    pub fn loser(&self) -> Option<&Player> {
        let winner = self.winner.as_ref()?;
        if winner.id == self.player1.id {
            Some(&self.player2)
        } else {
            Some(&self.player1)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaddleData {
    pub y: f64,
    pub speed: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BallData {
    pub x: f64,
    pub y: f64,
    pub speed_x: f64,
    pub speed_y: f64,
}

/// Full positional state of a match at server time `time` (ms since epoch).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub paddle_left: PaddleData,
    pub paddle_right: PaddleData,
    pub ball: BallData,
    pub is_running: bool,
    pub time: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentInfo {
    pub id: TournamentId,
    pub name: String,
    pub creator: Identity,
    pub players: Vec<Identity>,
    pub started: bool,
    pub finished: bool,
    pub round: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Game {
        cmd: UserInput,
        #[serde(default)]
        paddle: PaddleSide,
    },
    ListTournaments,
    CreateTournament {
        name: String,
    },
    Subscribe {
        tournament: TournamentId,
    },
    Unsubscribe {
        tournament: TournamentId,
    },
    StartTournament {
        tournament: TournamentId,
    },
    DeleteTournament {
        tournament: TournamentId,
    },
    Watch {
        tournament: TournamentId,
    },
    Unwatch {
        tournament: TournamentId,
    },
}

impl ClientMessage {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    Game { data: Snapshot },
    Tournaments { data: Vec<TournamentInfo> },
    NextMatch { data: MatchData },
    TournamentUpdate { data: MatchData },
    CountDown { time: u32 },
    Error { message: String },
}

impl ServerMessage {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
