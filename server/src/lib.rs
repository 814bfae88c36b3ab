//! # Tournament Server Library
//!
//! This library provides the authoritative server for networked Pong
//! tournaments. It owns every running match, schedules tournament brackets
//! and pushes state to players and spectators over WebSocket connections.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Each match runs its own fixed-rate tick task. Paddles, ball and score
//! belong to that task alone; clients only ever send paddle commands and
//! render what the server tells them.
//!
//! ### Tournament Orchestration
//! Players create and join tournaments, the creator starts them, and a
//! single-elimination bracket is played out one match at a time with a
//! countdown before each match. Finished matches go to a history sink.
//!
//! ### State Broadcasting
//! Snapshots are sent when something visible happens (start, input, wall
//! bounce, paddle hit, point, end) rather than on every tick. Every message
//! goes through a non-blocking outbox, so a slow connection loses messages
//! instead of delaying a match.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! The `Match` state machine: Idle, Running, Paused, Ended.
//!
//! ### Match Loop Module (`match_loop`)
//! Spawns the tick task for a `Match` and hands out controllers for input,
//! pause, resume and cancel, plus a completion handle.
//!
//! ### Tournament Module (`tournament`) and Orchestrator (`orchestrator`)
//! Roster rules and bracket seeding, and the async driver that plays the
//! bracket and records results.
//!
//! ### Connection Registry (`client_manager`), Dispatch (`dispatch`), Outbox (`outbox`)
//! Who is connected, what they listen to, and how inbound messages reach
//! the orchestrator.
//!
//! ### Network Module (`network`)
//! WebSocket upgrade with token check, per-connection reader and writer
//! tasks, and the fan-out task.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use clap::Parser;
//! use server::auth::DevTokenAuthenticator;
//! use server::config::Config;
//! use server::history::LogHistory;
//! use server::network::Server;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::parse_from(["server", "--port", "3000"]);
//!     let server = Server::bind(
//!         &config,
//!         Arc::new(DevTokenAuthenticator),
//!         Arc::new(LogHistory),
//!     )
//!     .await?;
//!
//!     // Clients connect to ws://127.0.0.1:3000/?token=<id>:<name>
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client_manager;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod game;
pub mod history;
pub mod match_loop;
pub mod network;
pub mod orchestrator;
pub mod outbox;
pub mod tournament;
pub mod utils;
