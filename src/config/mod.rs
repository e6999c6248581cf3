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
    /// Allowed client origins for CORS (comma-separated)
    pub client_origin: String,

    /// Rules shared by every match this deployment runs
    pub match_settings: MatchSettings,
    /// Admission ceilings for the queue and the match table
    pub limits: Limits,
}

/// Immutable per-deployment match rules
#[derive(Clone, Debug)]
pub struct MatchSettings {
    /// Countdown length of a match
    pub duration: Duration,
    /// Kills needed to win before the countdown runs out
    pub kill_threshold: u32,
    /// Hit points at spawn and after every respawn
    pub initial_hp: u32,
    /// Stake each player deposits, as a decimal string
    pub entry_fee: String,
    /// How long a completed match stays queryable before it is reaped
    pub retention: Duration,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(60),
            kill_threshold: 3,
            initial_hp: 100,
            entry_fee: "0.001".to_string(),
            retention: Duration::from_secs(30),
        }
    }
}

/// Resource ceilings
#[derive(Clone, Copy, Debug)]
pub struct Limits {
    pub max_queue_size: usize,
    pub max_active_matches: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_queue_size: 1024,
            max_active_matches: 512,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // PORT wins over SERVER_ADDR so hosted deployments can inject it
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".to_string())
        };

        let defaults = MatchSettings::default();
        let limits = Limits::default();

        let match_settings = MatchSettings {
            duration: Duration::from_secs(positive(
                "MATCH_DURATION_SECS",
                defaults.duration.as_secs(),
            )?),
            kill_threshold: positive("MATCH_MAX_KILLS", defaults.kill_threshold)?,
            initial_hp: positive("MATCH_INITIAL_HP", defaults.initial_hp)?,
            entry_fee: env::var("MATCH_ENTRY_FEE").unwrap_or(defaults.entry_fee),
            retention: Duration::from_secs(parse_or(
                "MATCH_RETENTION_SECS",
                defaults.retention.as_secs(),
            )?),
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            client_origin: env::var("CLIENT_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            match_settings,
            limits: Limits {
                max_queue_size: positive("MAX_QUEUE_SIZE", limits.max_queue_size)?,
                max_active_matches: positive("MAX_ACTIVE_MATCHES", limits.max_active_matches)?,
            },
        })
    }
}

/// Read an optional variable, falling back to `default` when unset
fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

fn positive<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
{
    let value = parse_or(key, default)?;
    if value > T::default() {
        Ok(value)
    } else {
        Err(ConfigError::Invalid(key))
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
