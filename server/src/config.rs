//! Command line configuration of the tournament server.

use crate::error::ConfigError;
use crate::orchestrator::MatchSettings;
use clap::Parser;
use shared::{DEFAULT_COUNTDOWN_SECS, DEFAULT_SCORE_TO_WIN, TICK_RATE};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about = "Authoritative Pong tournament server")]
pub struct Config {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "3000")]
    pub port: u16,
    /// Match tick rate (updates per second)
    #[clap(short, long, default_value_t = TICK_RATE)]
    pub tick_rate: u32,
    /// Points needed to win a match
    #[clap(long, default_value_t = DEFAULT_SCORE_TO_WIN)]
    pub score_to_win: u32,
    /// Seconds of countdown before each match
    #[clap(long, default_value_t = DEFAULT_COUNTDOWN_SECS)]
    pub countdown: u32,
    /// Maximum number of concurrent connections
    #[clap(long, default_value = "256")]
    pub max_connections: usize,
    /// Maximum number of tournaments kept at once
    #[clap(long, default_value = "64")]
    pub max_tournaments: usize,
    /// Outgoing messages queued per connection before dropping
    #[clap(long, default_value = "64")]
    pub send_buffer: usize,
    /// Append finished matches to this JSON-lines file instead of the log
    #[clap(long)]
    pub history_file: Option<PathBuf>,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 || self.tick_rate > 1000 {
            return Err(ConfigError::TickRate(self.tick_rate));
        }
        if self.score_to_win == 0 {
            return Err(ConfigError::ScoreToWin);
        }
        if self.max_connections == 0 {
            return Err(ConfigError::ZeroCapacity("max-connections"));
        }
        if self.max_tournaments == 0 {
            return Err(ConfigError::ZeroCapacity("max-tournaments"));
        }
        if self.send_buffer == 0 {
            return Err(ConfigError::ZeroCapacity("send-buffer"));
        }
        Ok(())
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn match_settings(&self) -> MatchSettings {
        MatchSettings {
            tick_rate: self.tick_rate,
            score_to_win: self.score_to_win,
            countdown_secs: self.countdown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["server"];
        argv.extend_from_slice(args);
        Config::parse_from(argv)
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]);
        assert_eq!(config.address(), "127.0.0.1:3000");
        assert_eq!(config.tick_rate, 60);
        assert_eq!(config.score_to_win, 10);
        assert_eq!(config.countdown, 5);
        assert!(config.history_file.is_none());
        assert_ok!(config.validate());
    }

    #[test]
    fn test_overrides() {
        let config = parse(&["-H", "0.0.0.0", "-p", "9000", "--score-to-win", "3"]);
        assert_eq!(config.address(), "0.0.0.0:9000");
        assert_eq!(config.match_settings().score_to_win, 3);
        assert_ok!(config.validate());
        assert_err!(parse(&["--max-tournaments", "0"]).validate());
    }

    #[test]
    fn test_rejects_bad_values() {
        assert_eq!(
            parse(&["--tick-rate", "0"]).validate(),
            Err(ConfigError::TickRate(0))
        );
        assert_eq!(
            parse(&["--tick-rate", "1001"]).validate(),
            Err(ConfigError::TickRate(1001))
        );
        assert_eq!(
            parse(&["--score-to-win", "0"]).validate(),
            Err(ConfigError::ScoreToWin)
        );
        assert_eq!(
            parse(&["--send-buffer", "0"]).validate(),
            Err(ConfigError::ZeroCapacity("send-buffer"))
        );
        assert_eq!(
            parse(&["--max-connections", "0"]).validate(),
            Err(ConfigError::ZeroCapacity("max-connections"))
        );
    }
}
