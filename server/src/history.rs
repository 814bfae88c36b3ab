//! Sinks for finished match results.

use crate::error::HistoryError;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use shared::{MatchData, TournamentId, UserId};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// One row of match history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    pub winner_id: UserId,
    pub loser_id: UserId,
    pub score_winner: u32,
    pub score_loser: u32,
    pub timestamp: u64,
    pub tournament_id: Option<TournamentId>,
}

impl MatchRecord {
    /// Builds the row for a decided match; None if there is no winner yet.
    pub fn from_match(
        data: &MatchData,
        timestamp: u64,
        tournament_id: Option<TournamentId>,
    ) -> Option<Self> {
        let winner = data.winner.as_ref()?;
        let loser = data.loser()?;
        Some(Self {
            winner_id: winner.id,
            loser_id: loser.id,
            score_winner: winner.score,
            score_loser: loser.score,
            timestamp,
            tournament_id,
        })
    }
}

/// Blocking sink; callers run it off the async workers.
pub trait MatchHistory: Send + Sync {
    fn record_match_result(&self, record: &MatchRecord) -> Result<(), HistoryError>;
}

/// Writes results to the log only.
#[derive(Debug, Default)]
pub struct LogHistory;

impl MatchHistory for LogHistory {
    fn record_match_result(&self, record: &MatchRecord) -> Result<(), HistoryError> {
        info!(
            "Match result: user {} beat user {} {}-{}",
            record.winner_id, record.loser_id, record.score_winner, record.score_loser
        );
        Ok(())
    }
}

/// Appends one JSON object per line to a file.
#[derive(Debug)]
pub struct JsonLinesHistory {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonLinesHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }
}

impl MatchHistory for JsonLinesHistory {
    fn record_match_result(&self, record: &MatchRecord) -> Result<(), HistoryError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        // A poisoned lock only means another append panicked; the file is fine.
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

/// Keeps results in memory, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    records: Mutex<Vec<MatchRecord>>,
}

impl MemoryHistory {
    pub fn records(&self) -> Vec<MatchRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

impl MatchHistory for MemoryHistory {
    fn record_match_result(&self, record: &MatchRecord) -> Result<(), HistoryError> {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
        Ok(())
    }
}

/// Persists `record` on the blocking pool. Failures are logged and dropped.
pub fn persist(history: Arc<dyn MatchHistory>, record: MatchRecord) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        if let Err(e) = history.record_match_result(&record) {
            warn!(
                "Lost history row for user {} vs user {}: {}",
                record.winner_id, record.loser_id, e
            );
        }
    })
}
