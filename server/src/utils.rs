use std::time::{Duration, SystemTime, UNIX_EPOCH};

// Current wall-clock time in milliseconds, as stamped on snapshots
pub fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

// Tick period for a rate in Hz
pub fn tick_duration(tick_rate: u32) -> Duration {
    Duration::from_secs_f64(1.0 / tick_rate.max(1) as f64)
}
