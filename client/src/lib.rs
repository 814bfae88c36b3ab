//! # Pong Client Library
//!
//! Everything the spectator and player window needs: the WebSocket link to
//! the match server, keyboard handling, the reconciled view of the match and
//! drawing it.
//!
//! ## Architecture Overview
//!
//! The server is authoritative. The client never simulates collisions or
//! scoring; it only mirrors what the server reports and fills the gaps
//! between snapshots so motion looks continuous.
//!
//! ### Delayed Replay
//! Every snapshot carries the server's clock. The first snapshot seen while
//! no match is running fixes the offset between the server clock and the
//! local one. Later snapshots wait in a queue and are applied 50ms after
//! their server time, which absorbs jitter in their arrival.
//!
//! ### Extrapolation and Easing
//! Between snapshots the paddles and the ball keep moving with their last
//! known speeds. When a new target arrives, small gaps are closed gradually
//! and large ones are snapped.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! - Paddle and ball mirrors
//! - Snapshot queue and replay clock
//! - Header state: current pairing, score, countdown, tournament listing
//!
//! ### Input Module (`input`)
//! - W/S for the left paddle, arrow keys for the right
//! - A command is only sent when it differs from the previous one
//!
//! ### Network Module (`network`)
//! - Connection on a background thread with its own runtime
//! - JSON text frames in both directions
//! - Close codes for missing or rejected tokens reported distinctly
//!
//! ### Rendering Module (`rendering`)
//! - Court scaled to the window height
//! - Dashed net, paddles, ball and header text
//!
//! ## Usage Example
//!
//! ```no_run
//! use client::game::ClientSession;
//! use client::network::{NetworkClient, NetworkEvent};
//!
//! let mut network = NetworkClient::connect("ws://127.0.0.1:3000/?token=1:alice")?;
//! let mut session = ClientSession::default();
//!
//! for event in network.poll() {
//!     if let NetworkEvent::Message(message) = event {
//!         session.handle_server_message(message, 0.0);
//!     }
//! }
//! session.game.frame(16.0);
//! # Ok::<(), std::io::Error>(())
//! ```

pub mod game;
pub mod input;
pub mod network;
pub mod rendering;
