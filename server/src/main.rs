use clap::Parser;
use log::{error, info};
use server::auth::DevTokenAuthenticator;
use server::config::Config;
use server::history::{JsonLinesHistory, LogHistory, MatchHistory};
use server::network::Server;
use std::sync::Arc;

/// Parses the command line, binds the server and runs it until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::parse();
    config.validate()?;

    let history: Arc<dyn MatchHistory> = match &config.history_file {
        Some(path) => {
            info!("Recording match history to {}", path.display());
            Arc::new(JsonLinesHistory::new(path))
        }
        None => Arc::new(LogHistory),
    };

    let server = Server::bind(&config, Arc::new(DevTokenAuthenticator), history).await?;
    info!(
        "Tick rate {}Hz, first to {}, {}s countdown",
        config.tick_rate, config.score_to_win, config.countdown
    );

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
