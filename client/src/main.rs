use clap::Parser;
use client::game::ClientSession;
use client::input::InputManager;
use client::network::{NetworkClient, NetworkEvent};
use client::rendering::Renderer;
use log::{error, info, warn};
use macroquad::prelude::*;
use shared::{ClientMessage, TournamentId};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket URL of the match server
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:3000")]
    server: String,

    /// Session token, `id:username` on a development server
    #[arg(short = 't', long)]
    token: Option<String>,

    /// Create a tournament with this name once connected
    #[arg(long)]
    create: Option<String>,

    /// Join this tournament once connected
    #[arg(long)]
    subscribe: Option<TournamentId>,

    /// Start this tournament once connected (creator only)
    #[arg(long)]
    start: Option<TournamentId>,

    /// Spectate this tournament once connected
    #[arg(long)]
    watch: Option<TournamentId>,
}

impl Args {
    fn url(&self) -> String {
        match &self.token {
            Some(token) => {
                let separator = if self.server.contains('?') { '&' } else { '?' };
                let base = if separator == '?' && !self.server.ends_with('/') {
                    format!("{}/", self.server)
                } else {
                    self.server.clone()
                };
                format!("{}{}token={}", base, separator, token)
            }
            None => self.server.clone(),
        }
    }

    /// Requests sent once after the connection opens
    fn actions(&self) -> Vec<ClientMessage> {
        let mut actions = Vec::new();
        if let Some(name) = &self.create {
            actions.push(ClientMessage::CreateTournament { name: name.clone() });
        }
        if let Some(tournament) = self.subscribe {
            actions.push(ClientMessage::Subscribe { tournament });
        }
        if let Some(tournament) = self.watch {
            actions.push(ClientMessage::Watch { tournament });
        }
        if let Some(tournament) = self.start {
            actions.push(ClientMessage::StartTournament { tournament });
        }
        actions
    }
}

fn window_conf() -> Conf {
    Conf {
        window_title: "Pong".to_string(),
        window_width: 1000,
        window_height: 500,
        high_dpi: true,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Controls: W/S for the left paddle, Up/Down for the right");

    let mut network = match NetworkClient::connect(&args.url()) {
        Ok(network) => network,
        Err(e) => {
            error!("Failed to start the network thread: {}", e);
            return;
        }
    };

    let mut session = ClientSession::default();
    let mut input = InputManager::new();
    let mut renderer = Renderer::new();
    let mut pending_actions = Some(args.actions());

    loop {
        let now = get_time() * 1000.0;

        for event in network.poll() {
            match event {
                NetworkEvent::Connected => {
                    for action in pending_actions.take().unwrap_or_default() {
                        network.send(action);
                    }
                }
                NetworkEvent::Message(message) => session.handle_server_message(message, now),
                NetworkEvent::Closed { code, reason } => {
                    warn!("Connection closed ({:?}): {}", code, reason);
                    session.header.last_error = Some(format!("Disconnected: {}", reason));
                }
            }
        }

        if network.is_connected() {
            for message in input.update() {
                network.send(message);
            }
        }

        session.game.frame(now);
        renderer.render(&session);

        next_frame().await
    }
}
