use crate::orchestration::PollerSettings;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub poll_interval_ms: u64,
    pub match_timeout_ms: u64,
    pub avg_speed_kmh: f64,
    pub surge_cap: f64,
    pub event_buffer: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = parse_or::<u16>(&env_map, "PORT", 8080, "must be a valid u16")?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let poll_interval_ms =
            parse_or::<u64>(&env_map, "POLL_INTERVAL_MS", 5_000, "must be a valid u64")?;
        if poll_interval_ms == 0 {
            return Err(invalid("POLL_INTERVAL_MS", "must be greater than 0"));
        }

        let match_timeout_ms =
            parse_or::<u64>(&env_map, "MATCH_TIMEOUT_MS", 300_000, "must be a valid u64")?;
        if match_timeout_ms == 0 {
            return Err(invalid("MATCH_TIMEOUT_MS", "must be greater than 0"));
        }

        let avg_speed_kmh = parse_or::<f64>(&env_map, "AVG_SPEED_KMH", 40.0, "must be a number")?;
        if !(avg_speed_kmh.is_finite() && avg_speed_kmh > 0.0) {
            return Err(invalid("AVG_SPEED_KMH", "must be greater than 0"));
        }

        let surge_cap = parse_or::<f64>(&env_map, "SURGE_CAP", 2.0, "must be a number")?;
        if !(surge_cap.is_finite() && surge_cap >= 1.0) {
            return Err(invalid("SURGE_CAP", "must be at least 1.0"));
        }

        let event_buffer =
            parse_or::<usize>(&env_map, "EVENT_BUFFER", 1024, "must be a valid usize")?;
        if event_buffer == 0 {
            return Err(invalid("EVENT_BUFFER", "must be greater than 0"));
        }

        Ok(Config {
            port,
            database_path,
            poll_interval_ms,
            match_timeout_ms,
            avg_speed_kmh,
            surge_cap,
            event_buffer,
        })
    }

    pub fn match_timeout(&self) -> Duration {
        Duration::from_millis(self.match_timeout_ms)
    }

    pub fn poller_settings(&self) -> PollerSettings {
        PollerSettings {
            interval: Duration::from_millis(self.poll_interval_ms),
            avg_speed_kmh: self.avg_speed_kmh,
            surge_cap: self.surge_cap,
        }
    }
}

fn parse_or<T: FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: T,
    reason: &str,
) -> Result<T, ConfigError> {
    match env_map.get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|_| invalid(key, reason)),
    }
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue(key.to_string(), reason.to_string())
}
