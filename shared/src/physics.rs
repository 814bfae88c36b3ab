//! Paddle and ball kinematics used by the authoritative match simulation.

use crate::protocol::{BallData, PaddleData, UserInput};
use crate::{
    BALL_RADIUS, BALL_START_SPEED, COURT_HEIGHT, COURT_WIDTH, LEFT_PADDLE_X, MAX_BOUNCE_ANGLE,
    MAX_SPEED, PADDLE_HEIGHT, PADDLE_SPEED, PADDLE_START_Y, PADDLE_WIDTH, RIGHT_PADDLE_X,
    SPEED_UP, SPIN_FACTOR,
};
use serde::{Deserialize, Serialize};

/// Guards the collision normal when the ball centre sits exactly on the paddle.
const MIN_SEPARATION: f64 = 1e-6;

/// A vertical paddle with one tick of input latency.
///
/// Input only touches `next_dy`; `advance` moves with the current `dy` and
/// then adopts `next_dy`, so a command changes motion from the following
/// tick on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paddle {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub speed: f64,
    pub dy: f64,
    pub next_dy: f64,
}

impl Paddle {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            width: PADDLE_WIDTH,
            height: PADDLE_HEIGHT,
            speed: PADDLE_SPEED,
            dy: 0.0,
            next_dy: 0.0,
        }
    }

    pub fn left() -> Self {
        Self::new(LEFT_PADDLE_X, PADDLE_START_Y)
    }

    pub fn right() -> Self {
        Self::new(RIGHT_PADDLE_X, PADDLE_START_Y)
    }

    /// Lowest allowed value of `y` is 0, highest is `max_y()`.
    pub fn max_y(&self) -> f64 {
        COURT_HEIGHT - self.height
    }

    pub fn advance(&mut self, dt_ms: f64) {
        self.y += self.dy * dt_ms / 1000.0;
        self.y = self.y.clamp(0.0, self.max_y());
        self.dy = self.next_dy;
    }

    /// Stages the velocity for the next tick.
    ///
    /// An `End` command only cancels motion in its own direction, so a late
    /// `moveUpEnd` cannot stop a `moveDownStart` that overtook it.
    pub fn handle_input(&mut self, cmd: UserInput) {
        match cmd {
            UserInput::MoveUpStart => self.next_dy = -self.speed,
            UserInput::MoveDownStart => self.next_dy = self.speed,
            UserInput::MoveUpEnd => {
                if self.next_dy < 0.0 {
                    self.next_dy = 0.0;
                }
            }
            UserInput::MoveDownEnd => {
                if self.next_dy > 0.0 {
                    self.next_dy = 0.0;
                }
            }
            UserInput::Unknown => {}
        }
    }

    pub fn center_y(&self) -> f64 {
        self.y + self.height / 2.0
    }

    pub fn data(&self) -> PaddleData {
        PaddleData {
            y: self.y,
            speed: self.dy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ball {
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    pub speed_x: f64,
    pub speed_y: f64,
}

impl Ball {
    /// Positive `speed_x` travels right, positive `speed_y` travels down.
    pub fn new(x: f64, y: f64, radius: f64, speed: f64) -> Self {
        Self {
            x,
            y,
            radius,
            speed_x: speed,
            speed_y: speed,
        }
    }

    /// The opening ball of a match, at the centre spot.
    pub fn kickoff() -> Self {
        Self::new(
            COURT_WIDTH / 2.0,
            COURT_HEIGHT / 2.0,
            BALL_RADIUS,
            BALL_START_SPEED,
        )
    }

    pub fn speed(&self) -> f64 {
        self.speed_x.hypot(self.speed_y)
    }

    /// Integrates position and reflects off the top and bottom walls.
    ///
    /// Returns true when the ball bounced this step.
    pub fn advance(&mut self, dt_ms: f64) -> bool {
        self.x += self.speed_x * dt_ms / 1000.0;
        self.y += self.speed_y * dt_ms / 1000.0;

        let hits_top = self.y - self.radius <= 0.0 && self.speed_y < 0.0;
        let hits_bottom = self.y + self.radius >= COURT_HEIGHT && self.speed_y > 0.0;
        if hits_top || hits_bottom {
            self.speed_y = -self.speed_y;
            return true;
        }
        false
    }

    /// Resolves a hit against `paddle`, returning whether one happened.
    ///
    /// The bounce angle follows the impact height on the paddle: a centre hit
    /// leaves flat, an edge hit leaves at `MAX_BOUNCE_ANGLE`. Paddle motion
    /// adds spin, after which the velocity is rescaled so its magnitude is
    /// exactly `min(previous * SPEED_UP, MAX_SPEED)`.
    pub fn check_collision(&mut self, paddle: &Paddle) -> bool {
        let closest_x = self.x.clamp(paddle.x, paddle.x + paddle.width);
        let closest_y = self.y.clamp(paddle.y, paddle.y + paddle.height);
        let dx = self.x - closest_x;
        let dy = self.y - closest_y;

        let dist2 = dx * dx + dy * dy;
        if dist2 > self.radius * self.radius {
            return false;
        }

        // Push out along the separation normal so the ball never sinks in.
        let mut dist = dist2.sqrt();
        if dist == 0.0 {
            dist = MIN_SEPARATION;
        }
        let overlap = self.radius - dist;
        self.x += dx / dist * overlap;
        self.y += dy / dist * overlap;

        let speed = (self.speed() * SPEED_UP).min(MAX_SPEED);

        let half_height = paddle.height / 2.0;
        let rel_y = -((self.y - paddle.center_y()) / half_height);
        let angle = (rel_y * std::f64::consts::FRAC_PI_2).sin() * MAX_BOUNCE_ANGLE;
        let direction = if paddle.x < COURT_WIDTH / 2.0 { 1.0 } else { -1.0 };

        self.speed_x = speed * angle.cos() * direction;
        // Court y grows downward, so an upward angle is a negative speed.
        self.speed_y = -speed * angle.sin();

        self.speed_y += paddle.dy * SPIN_FACTOR;
        let magnitude = self.speed();
        self.speed_x *= speed / magnitude;
        self.speed_y *= speed / magnitude;
        true
    }

    /// Puts the ball back on the centre spot, serving flat with
    /// `speed_x = serve_speed` (the sign picks the side).
    pub fn reset(&mut self, serve_speed: f64) {
        self.x = COURT_WIDTH / 2.0;
        self.y = COURT_HEIGHT / 2.0;
        self.speed_x = serve_speed;
        self.speed_y = 0.0;
    }

    pub fn data(&self) -> BallData {
        BallData {
            x: self.x,
            y: self.y,
            speed_x: self.speed_x,
            speed_y: self.speed_y,
        }
    }
}
