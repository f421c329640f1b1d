//! Time utilities for the room simulation

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Fixed simulation rate. Every state frame is produced on a tick boundary.
pub const SIMULATION_TPS: u32 = 30;

/// Wall-clock period of one tick
pub fn tick_duration() -> Duration {
    Duration::from_micros(1_000_000 / SIMULATION_TPS as u64)
}

/// Fixed integration step (in seconds)
pub fn tick_delta() -> f32 {
    1.0 / SIMULATION_TPS as f32
}

/// Milliseconds between two wall-clock stamps as signed seconds.
pub fn millis_delta_secs(from_ms: u64, to_ms: u64) -> f32 {
    (to_ms as i64 - from_ms as i64) as f32 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_delta_matches_rate() {
        assert!((tick_delta() * SIMULATION_TPS as f32 - 1.0).abs() < 1e-6);
        assert_eq!(tick_duration(), Duration::from_micros(33_333));
    }

    #[test]
    fn millis_delta_is_signed() {
        assert_eq!(millis_delta_secs(1_000, 1_050), 0.05);
        assert_eq!(millis_delta_secs(1_050, 1_000), -0.05);
    }
}
