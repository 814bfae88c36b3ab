//! Types and constants shared by the match server and the client renderer.
//!
//! The court is 200 units wide and 100 units tall; every length is a percent
//! of the court height. Speeds are in court units per second and every
//! `dt` handed to the physics is in milliseconds.

pub mod physics;
pub mod protocol;

pub use physics::{Ball, Paddle};
pub use protocol::{
    BallData, ClientMessage, Identity, MatchData, PaddleData, PaddleSide, Player, ServerMessage,
    Snapshot, TournamentId, TournamentInfo, UserId, UserInput,
};

pub const COURT_WIDTH: f64 = 200.0;
pub const COURT_HEIGHT: f64 = 100.0;

pub const PADDLE_WIDTH: f64 = 2.0;
pub const PADDLE_HEIGHT: f64 = 14.0;
pub const PADDLE_SPEED: f64 = 55.0;
pub const PADDLE_START_Y: f64 = 45.0;
pub const LEFT_PADDLE_X: f64 = 1.0;
pub const RIGHT_PADDLE_X: f64 = 197.0;

pub const BALL_RADIUS: f64 = 1.0;
pub const BALL_START_SPEED: f64 = 30.0;
/// Horizontal speed of a serve after a point.
pub const BASE_SPEED: f64 = 50.0;
/// Multiplier applied to the ball speed on every paddle hit.
pub const SPEED_UP: f64 = 1.05;
pub const MAX_SPEED: f64 = 120.0;
/// Fraction of the paddle velocity added to the ball on a hit.
pub const SPIN_FACTOR: f64 = 0.25;
/// Steepest bounce angle, reached on a hit at the paddle edge.
pub const MAX_BOUNCE_ANGLE: f64 = std::f64::consts::PI / 3.0;

pub const TICK_RATE: u32 = 60;
/// A tick whose elapsed time reaches this many milliseconds is not simulated.
pub const MAX_TICK_GAP_MS: f64 = 1000.0;
pub const DEFAULT_SCORE_TO_WIN: u32 = 10;
pub const DEFAULT_COUNTDOWN_SECS: u32 = 5;
