//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Path serving the multiplayer room; every other path is the leaderboard stream
    pub room_path: String,
    /// Players silent for this long are evicted
    pub idle_timeout: Duration,
    /// How often the idle sweep runs
    pub sweep_interval: Duration,
    /// Transport ping period for every connection
    pub heartbeat_interval: Duration,

    /// Fixed world seed, random when unset
    pub world_seed: Option<u32>,
    /// Interest radius in world units, unset means unlimited
    pub interest_radius: Option<f32>,
    /// Player count at which interest filtering starts
    pub interest_min_players: usize,

    /// Connection attempts allowed per IP per second
    pub connect_rate_per_ip: u32,
    /// Allowed client origins for CORS, any when unset
    pub client_origin: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_level: "info".to_string(),
            room_path: "/room".to_string(),
            idle_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(15),
            world_seed: None,
            interest_radius: None,
            interest_min_players: 32,
            connect_rate_per_ip: 10,
            client_origin: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = match env::var("PORT") {
            Ok(port) => format!("0.0.0.0:{}", port)
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            Err(_) => match env::var("SERVER_ADDR") {
                Ok(addr) => addr.parse().map_err(|_| ConfigError::InvalidAddress)?,
                Err(_) => defaults.server_addr,
            },
        };

        let room_path = env::var("ROOM_PATH").unwrap_or(defaults.room_path);
        if !room_path.starts_with('/') {
            return Err(ConfigError::Invalid("ROOM_PATH"));
        }

        let interest_radius = parse_opt::<f32>("INTEREST_RADIUS")?;
        if interest_radius.is_some_and(|r| !r.is_finite() || r <= 0.0) {
            return Err(ConfigError::Invalid("INTEREST_RADIUS"));
        }

        Ok(Self {
            server_addr,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            room_path,
            idle_timeout: secs_or("IDLE_TIMEOUT_SECS", defaults.idle_timeout)?,
            sweep_interval: secs_or("SWEEP_INTERVAL_SECS", defaults.sweep_interval)?,
            heartbeat_interval: secs_or("HEARTBEAT_INTERVAL_SECS", defaults.heartbeat_interval)?,
            world_seed: parse_opt("WORLD_SEED")?,
            interest_radius,
            interest_min_players: parse_opt("INTEREST_MIN_PLAYERS")?
                .unwrap_or(defaults.interest_min_players),
            connect_rate_per_ip: parse_opt("CONNECT_RATE_PER_IP")?
                .filter(|r| *r > 0)
                .unwrap_or(defaults.connect_rate_per_ip),
            client_origin: env::var("CLIENT_ORIGIN")
                .ok()
                .filter(|s| !s.trim().is_empty()),
        })
    }
}

/// Parse an optional variable; present but unparsable is an error
fn parse_opt<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(key)),
        _ => Ok(None),
    }
}

/// Whole seconds, at least one
fn secs_or(key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match parse_opt::<u64>(key)? {
        Some(0) => Err(ConfigError::Invalid(key)),
        Some(secs) => Ok(Duration::from_secs(secs)),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.server_addr.port(), 8080);
        assert_eq!(config.room_path, "/room");
        assert_eq!(config.idle_timeout, Duration::from_secs(30));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(15));
        assert_eq!(config.interest_min_players, 32);
        assert!(config.interest_radius.is_none());
        assert!(config.world_seed.is_none());
    }

    #[test]
    fn unparsable_values_are_rejected() {
        // Unique key so parallel tests never race on it.
        env::set_var("SKYLINE_TEST_BAD_NUMBER", "twelve");
        assert!(matches!(
            parse_opt::<u32>("SKYLINE_TEST_BAD_NUMBER"),
            Err(ConfigError::Invalid("SKYLINE_TEST_BAD_NUMBER"))
        ));
        env::set_var("SKYLINE_TEST_ZERO_SECS", "0");
        assert_err!(secs_or("SKYLINE_TEST_ZERO_SECS", Duration::from_secs(1)));
        assert_eq!(assert_ok!(parse_opt::<u32>("SKYLINE_TEST_UNSET")), None);
    }
}
