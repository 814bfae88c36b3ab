//! Authoritative state of a single match.
//!
//! `Match` is plain data driven from outside: the tick loop calls `tick`
//! with the elapsed time and forwards the returned events. Input handlers
//! only stage paddle velocity and request a flush, so every position change
//! happens inside `tick`.

use log::{debug, info};
use shared::{
    Ball, MatchData, Paddle, Snapshot, UserId, UserInput, BASE_SPEED, DEFAULT_SCORE_TO_WIN,
    MAX_TICK_GAP_MS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    Idle,
    Running,
    Paused,
    Ended,
}

/// Something the outside world should hear about, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchEvent {
    Snapshot(Snapshot),
    /// A point was scored; carries the updated score line.
    Score(MatchData),
    /// Terminal transition. `winner` is set when the score was reached.
    Ended(MatchData),
}

#[derive(Debug, Clone)]
pub struct Match {
    pub paddle_left: Paddle,
    pub paddle_right: Paddle,
    pub ball: Ball,
    data: MatchData,
    score_to_win: u32,
    phase: MatchPhase,
    send_at_next_tick: bool,
    events: Vec<MatchEvent>,
}

impl Match {
    /// `data.player1` drives the left paddle, `data.player2` the right one.
    pub fn new(data: MatchData, score_to_win: u32) -> Self {
        Self {
            paddle_left: Paddle::left(),
            paddle_right: Paddle::right(),
            ball: Ball::kickoff(),
            data,
            score_to_win: score_to_win.max(1),
            phase: MatchPhase::Idle,
            send_at_next_tick: false,
            events: Vec::new(),
        }
    }

    pub fn with_default_score(data: MatchData) -> Self {
        Self::new(data, DEFAULT_SCORE_TO_WIN)
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn is_ended(&self) -> bool {
        self.phase == MatchPhase::Ended
    }

    pub fn data(&self) -> &MatchData {
        &self.data
    }

    pub fn score_to_win(&self) -> u32 {
        self.score_to_win
    }

    pub fn players(&self) -> (UserId, UserId) {
        (self.data.player1.id, self.data.player2.id)
    }

    /// Idle -> Running, announcing the opening position.
    pub fn start(&mut self, now_ms: u64) -> Vec<MatchEvent> {
        if self.phase == MatchPhase::Idle {
            self.phase = MatchPhase::Running;
            info!(
                "Match {} vs {} started (first to {})",
                self.data.player1.username, self.data.player2.username, self.score_to_win
            );
            self.send(now_ms);
        }
        self.take_events()
    }

    pub fn pause(&mut self) {
        if self.phase == MatchPhase::Running {
            self.phase = MatchPhase::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.phase == MatchPhase::Paused {
            self.phase = MatchPhase::Running;
        }
    }

    /// Stages `cmd` on the paddle belonging to `user`.
    ///
    /// Returns false when the input was ignored: unknown command, a user who
    /// is not playing this match, or a match that is over.
    pub fn handle_input(&mut self, cmd: UserInput, user: UserId) -> bool {
        if cmd == UserInput::Unknown || self.phase == MatchPhase::Ended {
            return false;
        }

        let paddle = if user == self.data.player1.id {
            &mut self.paddle_left
        } else if user == self.data.player2.id {
            &mut self.paddle_right
        } else {
            debug!("Ignoring input from user {} who is not in this match", user);
            return false;
        };

        paddle.handle_input(cmd);
        self.send_at_next_tick = true;
        true
    }

    /// Advances the simulation by `dt_ms` and returns what happened.
    ///
    /// A gap of `MAX_TICK_GAP_MS` or more is treated as a stall and not
    /// simulated. A pending flush is honoured either way.
    pub fn tick(&mut self, dt_ms: f64, now_ms: u64) -> Vec<MatchEvent> {
        if self.phase == MatchPhase::Running {
            if dt_ms < MAX_TICK_GAP_MS {
                self.update(dt_ms, now_ms);
            } else {
                debug!("Skipping tick after a {:.0}ms stall", dt_ms);
            }
        }

        if self.send_at_next_tick && self.phase != MatchPhase::Ended {
            self.send(now_ms);
        }
        self.take_events()
    }

    /// Stops the match for good. Safe to call more than once.
    pub fn end(&mut self, now_ms: u64) -> Vec<MatchEvent> {
        if self.phase != MatchPhase::Ended {
            self.finish(now_ms);
        }
        self.take_events()
    }

    pub fn snapshot(&self, now_ms: u64) -> Snapshot {
        Snapshot {
            paddle_left: self.paddle_left.data(),
            paddle_right: self.paddle_right.data(),
            ball: self.ball.data(),
            is_running: matches!(self.phase, MatchPhase::Running | MatchPhase::Paused),
            time: now_ms,
        }
    }

    fn update(&mut self, dt_ms: f64, now_ms: u64) {
        self.paddle_left.advance(dt_ms);
        self.paddle_right.advance(dt_ms);

        if self.ball.advance(dt_ms) {
            self.send(now_ms);
        }

        if self.ball.check_collision(&self.paddle_left)
            || self.ball.check_collision(&self.paddle_right)
        {
            self.send(now_ms);
        }

        let radius = self.ball.radius;
        if self.ball.x < self.paddle_left.x - radius {
            self.data.player2.score += 1;
            self.point_scored(-BASE_SPEED, now_ms);
        } else if self.ball.x > self.paddle_right.x + self.paddle_right.width + radius {
            self.data.player1.score += 1;
            self.point_scored(BASE_SPEED, now_ms);
        }
    }

    /// Serves toward the side that conceded, flat, so the next paddle
    /// touch picks the angle.
    fn point_scored(&mut self, serve_speed: f64, now_ms: u64) {
        debug!(
            "Score {} {} - {} {}",
            self.data.player1.username,
            self.data.player1.score,
            self.data.player2.score,
            self.data.player2.username
        );
        self.events.push(MatchEvent::Score(self.data.clone()));
        self.ball.reset(serve_speed);
        self.send(now_ms);

        if self.data.player1.score >= self.score_to_win
            || self.data.player2.score >= self.score_to_win
        {
            self.finish(now_ms);
        }
    }

    fn finish(&mut self, now_ms: u64) {
        self.phase = MatchPhase::Ended;
        self.send_at_next_tick = false;

        let (p1, p2) = (&self.data.player1, &self.data.player2);
        if p1.score >= self.score_to_win {
            self.data.winner = Some(p1.clone());
        } else if p2.score >= self.score_to_win {
            self.data.winner = Some(p2.clone());
        }

        match &self.data.winner {
            Some(winner) => info!(
                "Match {} vs {} won by {} ({}-{})",
                p1.username, p2.username, winner.username, p1.score, p2.score
            ),
            None => info!(
                "Match {} vs {} stopped at {}-{}",
                p1.username, p2.username, p1.score, p2.score
            ),
        }

        let snapshot = self.snapshot(now_ms);
        self.events.push(MatchEvent::Snapshot(snapshot));
        self.events.push(MatchEvent::Ended(self.data.clone()));
    }

    fn send(&mut self, now_ms: u64) {
        self.send_at_next_tick = false;
        let snapshot = self.snapshot(now_ms);
        self.events.push(MatchEvent::Snapshot(snapshot));
    }

    fn take_events(&mut self) -> Vec<MatchEvent> {
        std::mem::take(&mut self.events)
    }
}
