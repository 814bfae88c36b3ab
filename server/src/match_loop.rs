//! Fixed-rate tick task driving one `Match`.
//!
//! Each match gets its own task that owns the `Match` outright. Other tasks
//! talk to it only through a `MatchController`, whose commands stage input
//! or flip the pause flag; the physics runs only in the tick branch.

use crate::game::{Match, MatchEvent};
use crate::outbox::{Audience, Outbox};
use crate::utils::{get_timestamp, tick_duration};
use log::{debug, error};
use shared::{MatchData, ServerMessage, UserId, UserInput};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, Instant, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchCommand {
    Input { user: UserId, cmd: UserInput },
    Pause,
    Resume,
    Cancel,
}

/// Final state of a match. `completed` is false when it was stopped before
/// anyone reached the winning score.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub data: MatchData,
    pub completed: bool,
}

#[derive(Debug, Clone)]
pub struct MatchController {
    tx: mpsc::UnboundedSender<MatchCommand>,
    players: (UserId, UserId),
}

impl MatchController {
    /// Returns false if the match is already over.
    pub fn send_input(&self, user: UserId, cmd: UserInput) -> bool {
        self.tx.send(MatchCommand::Input { user, cmd }).is_ok()
    }

    pub fn pause(&self) {
        let _ = self.tx.send(MatchCommand::Pause);
    }

    pub fn resume(&self) {
        let _ = self.tx.send(MatchCommand::Resume);
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(MatchCommand::Cancel);
    }

    /// (left, right) player ids.
    pub fn players(&self) -> (UserId, UserId) {
        self.players
    }

    pub fn is_playing(&self, user: UserId) -> bool {
        self.players.0 == user || self.players.1 == user
    }

    pub fn is_finished(&self) -> bool {
        self.tx.is_closed()
    }
}

pub struct MatchHandle {
    controller: MatchController,
    initial: MatchData,
    done: oneshot::Receiver<MatchOutcome>,
}

impl MatchHandle {
    pub fn controller(&self) -> MatchController {
        self.controller.clone()
    }

    /// Resolves once the match has ended, however it ended.
    pub async fn wait(self) -> MatchOutcome {
        let MatchHandle {
            controller,
            initial,
            done,
        } = self;

        let outcome = match done.await {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(
                    "Match task for {} vs {} vanished",
                    initial.player1.username, initial.player2.username
                );
                MatchOutcome {
                    data: initial,
                    completed: false,
                }
            }
        };
        drop(controller);
        outcome
    }
}

/// Starts `game` on its own task, publishing to `audience`.
///
/// Dropping the handle and every controller cancels the match.
pub fn spawn(game: Match, audience: Audience, outbox: Outbox, tick_rate: u32) -> MatchHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let (done_tx, done_rx) = oneshot::channel();
    let controller = MatchController {
        tx,
        players: game.players(),
    };
    let initial = game.data().clone();

    tokio::spawn(run_match(game, audience, outbox, tick_rate, rx, done_tx));

    MatchHandle {
        controller,
        initial,
        done: done_rx,
    }
}

async fn run_match(
    mut game: Match,
    audience: Audience,
    outbox: Outbox,
    tick_rate: u32,
    mut commands: mpsc::UnboundedReceiver<MatchCommand>,
    done: oneshot::Sender<MatchOutcome>,
) {
    let mut ticker = interval(tick_duration(tick_rate));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // The first tick fires immediately
    ticker.tick().await;
    publish(&outbox, audience, game.start(get_timestamp()));
    let mut last_tick = Instant::now();

    loop {
        tokio::select! {
            command = commands.recv() => {
                match command {
                    Some(MatchCommand::Input { user, cmd }) => {
                        game.handle_input(cmd, user);
                    }
                    Some(MatchCommand::Pause) => game.pause(),
                    Some(MatchCommand::Resume) => {
                        game.resume();
                        last_tick = Instant::now();
                    }
                    Some(MatchCommand::Cancel) | None => {
                        debug!("Match cancelled");
                        publish(&outbox, audience, game.end(get_timestamp()));
                        break;
                    }
                }
            },

            _ = ticker.tick() => {
                let now = Instant::now();
                let dt_ms = now.duration_since(last_tick).as_secs_f64() * 1000.0;
                last_tick = now;

                publish(&outbox, audience, game.tick(dt_ms, get_timestamp()));
                if game.is_ended() {
                    break;
                }
            },
        }
    }

    let outcome = MatchOutcome {
        completed: game.data().winner.is_some(),
        data: game.data().clone(),
    };
    // Nobody waiting is fine: the match was dropped.
    let _ = done.send(outcome);
}

fn publish(outbox: &Outbox, audience: Audience, events: Vec<MatchEvent>) {
    for event in events {
        match event {
            MatchEvent::Snapshot(data) => outbox.send(audience, ServerMessage::Game { data }),
            MatchEvent::Score(data) => {
                outbox.send(audience, ServerMessage::TournamentUpdate { data })
            }
            // Reported through the outcome instead.
            MatchEvent::Ended(_) => {}
        }
    }
}
