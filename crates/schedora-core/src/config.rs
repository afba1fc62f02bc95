//! Recognised configuration options (§6). No configuration-loading crate
//! appears anywhere in the retrieved corpus, so this stays a plain struct
//! read from the environment rather than reaching for one.

use std::env;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(String),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: String, value: String },
}

#[derive(Debug, Clone)]
pub struct SchedoraConfig {
    pub database_url: String,
    pub db_pool_max_size: u32,
    pub db_pool_min_size: u32,
    pub redis_url: String,
    pub worker_heartbeat_interval: Duration,
    pub worker_heartbeat_timeout: Duration,
    pub worker_stale_check_interval: Duration,
    pub worker_cleanup_after: Duration,
}

impl SchedoraConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: require("DATABASE_URL")?,
            db_pool_max_size: parse_or("DB_POOL_MAX_SIZE", 10)?,
            db_pool_min_size: parse_or("DB_POOL_MIN_SIZE", 1)?,
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            worker_heartbeat_interval: secs_or("WORKER_HEARTBEAT_INTERVAL", 30)?,
            worker_heartbeat_timeout: secs_or("WORKER_HEARTBEAT_TIMEOUT", 90)?,
            worker_stale_check_interval: secs_or("WORKER_STALE_CHECK_INTERVAL", 60)?,
            worker_cleanup_after: secs_or("WORKER_CLEANUP_AFTER", 3600)?,
        })
    }
}

fn require(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::Missing(key.to_string()))
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value.parse().map_err(|_| ConfigError::Invalid { key: key.to_string(), value }),
        Err(_) => Ok(default),
    }
}

fn secs_or(key: &str, default: u64) -> Result<Duration, ConfigError> {
    Ok(Duration::from_secs(parse_or(key, default)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_spec() {
        // worker_heartbeat_timeout defaults to 90s, stale_check to 60s,
        // cleanup_after to 3600s, per the external interfaces section.
        assert_eq!(secs_or("SCHEDORA_TEST_UNSET_A", 90).unwrap(), Duration::from_secs(90));
        assert_eq!(secs_or("SCHEDORA_TEST_UNSET_B", 60).unwrap(), Duration::from_secs(60));
        assert_eq!(secs_or("SCHEDORA_TEST_UNSET_C", 3600).unwrap(), Duration::from_secs(3600));
    }
}
