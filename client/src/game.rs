//! Client-side mirror of the authoritative match.
//!
//! Snapshots are not shown the moment they arrive. They wait in a queue and
//! are applied `CLIENT_DELAY_MS` after their server timestamp, translated to
//! the local clock. Between snapshots the mirrors extrapolate with the last
//! known velocities and ease toward the server target.

use log::debug;
use shared::{
    MatchData, ServerMessage, Snapshot, TournamentInfo, BALL_RADIUS, BALL_START_SPEED,
    COURT_HEIGHT, COURT_WIDTH, LEFT_PADDLE_X, PADDLE_HEIGHT, PADDLE_START_Y, PADDLE_WIDTH,
    RIGHT_PADDLE_X,
};
use std::collections::VecDeque;

/// Fraction of the remaining gap closed each frame.
pub const SMOOTHING_FACTOR: f64 = 0.1;
/// Gaps at least this large are snapped instead of eased.
pub const SNAP_DISTANCE: f64 = 5.0;
pub const CLIENT_DELAY_MS: f64 = 50.0;
/// A longer pause between frames restarts the frame clock.
pub const MAX_FRAME_GAP_MS: f64 = 500.0;
pub const MAX_QUEUED_SNAPSHOTS: usize = 120;

fn ease(current: f64, target: f64) -> f64 {
    current + (target - current) * SMOOTHING_FACTOR
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaddleMirror {
    pub x: f64,
    pub y: f64,
    pub target_y: f64,
    pub width: f64,
    pub height: f64,
    pub dy: f64,
}

impl PaddleMirror {
    pub fn new(x: f64) -> Self {
        Self {
            x,
            y: PADDLE_START_Y,
            target_y: PADDLE_START_Y,
            width: PADDLE_WIDTH,
            height: PADDLE_HEIGHT,
            dy: 0.0,
        }
    }

    pub fn advance(&mut self, dt_ms: f64) {
        let max_y = COURT_HEIGHT - self.height;
        let step = self.dy * dt_ms / 1000.0;
        self.y = (self.y + step).clamp(0.0, max_y);
        self.target_y = (self.target_y + step).clamp(0.0, max_y);

        if (self.target_y - self.y).abs() < SNAP_DISTANCE {
            self.y = ease(self.y, self.target_y);
        } else {
            self.y = self.target_y;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BallMirror {
    pub x: f64,
    pub y: f64,
    pub target_x: f64,
    pub target_y: f64,
    pub radius: f64,
    pub speed_x: f64,
    pub speed_y: f64,
}

impl BallMirror {
    pub fn new() -> Self {
        Self {
            x: COURT_WIDTH / 2.0,
            y: COURT_HEIGHT / 2.0,
            target_x: COURT_WIDTH / 2.0,
            target_y: COURT_HEIGHT / 2.0,
            radius: BALL_RADIUS,
            speed_x: BALL_START_SPEED,
            speed_y: BALL_START_SPEED,
        }
    }

    pub fn advance(&mut self, dt_ms: f64) {
        let dx = self.speed_x * dt_ms / 1000.0;
        let dy = self.speed_y * dt_ms / 1000.0;
        self.x += dx;
        self.y += dy;
        self.target_x += dx;
        self.target_y += dy;

        let near = (self.target_x - self.x).abs() < SNAP_DISTANCE
            && (self.target_y - self.y).abs() < SNAP_DISTANCE;
        if near {
            self.x = ease(self.x, self.target_x);
            self.y = ease(self.y, self.target_y);
        } else {
            self.x = self.target_x;
            self.y = self.target_y;
        }
    }
}

impl Default for BallMirror {
    fn default() -> Self {
        Self::new()
    }
}

/// Rendered match state. All times are local milliseconds from any
/// monotonic clock, as long as every call uses the same one.
#[derive(Debug, Clone)]
pub struct ClientGame {
    pub paddle_left: PaddleMirror,
    pub paddle_right: PaddleMirror,
    pub ball: BallMirror,
    queue: VecDeque<Snapshot>,
    server_offset: f64,
    prev_time: f64,
    is_running: bool,
}

impl ClientGame {
    pub fn new() -> Self {
        Self {
            paddle_left: PaddleMirror::new(LEFT_PADDLE_X),
            paddle_right: PaddleMirror::new(RIGHT_PADDLE_X),
            ball: BallMirror::new(),
            queue: VecDeque::new(),
            server_offset: 0.0,
            prev_time: 0.0,
            is_running: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Local time minus server time, fixed by the first snapshot seen while
    /// no match was running.
    pub fn server_offset(&self) -> f64 {
        self.server_offset
    }

    pub fn receive_snapshot(&mut self, snapshot: Snapshot, now: f64) {
        if self.queue.len() >= MAX_QUEUED_SNAPSHOTS {
            self.queue.pop_front();
            debug!("Snapshot queue full, dropped the oldest");
        }
        self.queue.push_back(snapshot);

        if !self.is_running {
            self.server_offset = now - snapshot.time as f64;
            self.apply(&snapshot);
        }
    }

    /// Takes the server targets and velocities from `snapshot`.
    pub fn apply(&mut self, snapshot: &Snapshot) {
        self.paddle_left.target_y = snapshot.paddle_left.y;
        self.paddle_left.dy = snapshot.paddle_left.speed;
        self.paddle_right.target_y = snapshot.paddle_right.y;
        self.paddle_right.dy = snapshot.paddle_right.speed;

        self.ball.target_x = snapshot.ball.x;
        self.ball.target_y = snapshot.ball.y;
        self.ball.speed_x = snapshot.ball.speed_x;
        self.ball.speed_y = snapshot.ball.speed_y;

        self.prev_time = snapshot.time as f64 + self.server_offset + CLIENT_DELAY_MS;
        self.is_running = snapshot.is_running;
    }

    /// Advances the mirrors to local time `now`. Returns false when no
    /// match is running and nothing moved.
    pub fn frame(&mut self, now: f64) -> bool {
        if !self.is_running {
            return false;
        }

        while let Some(next) = self.queue.front().copied() {
            if now - (next.time as f64 + self.server_offset) <= CLIENT_DELAY_MS {
                break;
            }
            self.queue.pop_front();
            self.apply(&next);
        }

        if now - self.prev_time > MAX_FRAME_GAP_MS {
            self.prev_time = now;
        }
        let dt = (now - self.prev_time).max(0.0);
        self.prev_time = now;

        self.paddle_left.advance(dt);
        self.paddle_right.advance(dt);
        self.ball.advance(dt);
        true
    }
}

impl Default for ClientGame {
    fn default() -> Self {
        Self::new()
    }
}

/// What the banner above the court shows.
#[derive(Debug, Clone, Default)]
pub struct Header {
    pub current: Option<MatchData>,
    pub countdown: Option<u32>,
    pub tournaments: Vec<TournamentInfo>,
    pub last_error: Option<String>,
}

impl Header {
    pub fn handle(&mut self, message: &ServerMessage) {
        match message {
            ServerMessage::NextMatch { data } => {
                self.current = Some(data.clone());
                self.countdown = None;
            }
            ServerMessage::TournamentUpdate { data } => {
                self.current = Some(data.clone());
            }
            ServerMessage::CountDown { time } => self.countdown = Some(*time),
            ServerMessage::Tournaments { data } => self.tournaments = data.clone(),
            ServerMessage::Error { message } => self.last_error = Some(message.clone()),
            ServerMessage::Game { .. } => {}
        }
    }

    /// Countdown while one is running, otherwise the score line.
    pub fn title(&self, running: bool) -> String {
        let Some(data) = &self.current else {
            return "Waiting for a match".to_string();
        };

        if let Some(winner) = &data.winner {
            return format!(
                "{} {} - {} {}  |  {} wins",
                data.player1.username,
                data.player1.score,
                data.player2.score,
                data.player2.username,
                winner.username
            );
        }

        match self.countdown {
            Some(0) if !running => "Go!".to_string(),
            Some(n) if n > 0 => format!(
                "{} vs {}  |  {}",
                data.player1.username, data.player2.username, n
            ),
            _ => format!(
                "{} {} - {} {}",
                data.player1.username,
                data.player1.score,
                data.player2.score,
                data.player2.username
            ),
        }
    }
}

/// Routes server messages to the court or the header.
#[derive(Debug, Clone, Default)]
pub struct ClientSession {
    pub game: ClientGame,
    pub header: Header,
}

impl ClientSession {
    pub fn handle_server_message(&mut self, message: ServerMessage, now: f64) {
        match message {
            ServerMessage::Game { data } => self.game.receive_snapshot(data, now),
            other => self.header.handle(&other),
        }
    }
}
