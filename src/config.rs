//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::delivery::error_codes::ErrorCodeTable;
use crate::error::ConfigError;

/// Ingestion worker configuration.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    /// Reports created within this window suppress further messages for the same monitoree.
    pub reporting_cooldown: Duration,
    /// Maximum number of messages processed concurrently.
    pub max_concurrent_messages: usize,
    /// Buffer size of the inbound queue.
    pub queue_capacity: usize,
    /// Database file location.
    pub db_path: PathBuf,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            reporting_cooldown: Duration::from_secs(15 * 60), // 15 minutes
            max_concurrent_messages: 8,
            queue_capacity: 256,
            db_path: PathBuf::from("./data/assessment-intake.db"),
        }
    }
}

impl IntakeConfig {
    /// Build a config from `INTAKE_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(minutes) = env_parse::<u64>("INTAKE_REPORTING_COOLDOWN_MINUTES")? {
            config.reporting_cooldown = Duration::from_secs(minutes * 60);
        }
        if let Some(max) = env_parse::<usize>("INTAKE_MAX_CONCURRENT")? {
            if max == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "INTAKE_MAX_CONCURRENT".into(),
                    message: "must be at least 1".into(),
                });
            }
            config.max_concurrent_messages = max;
        }
        if let Some(capacity) = env_parse::<usize>("INTAKE_QUEUE_CAPACITY")? {
            config.queue_capacity = capacity.max(1);
        }
        if let Ok(path) = std::env::var("INTAKE_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }

        Ok(config)
    }
}

/// Send-path configuration.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Provider error code table used to classify failed sends.
    pub error_codes: ErrorCodeTable,
    /// Author recorded on system-generated history rows.
    pub history_author: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            error_codes: ErrorCodeTable::builtin(),
            history_author: crate::model::SYSTEM_AUTHOR.to_string(),
        }
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}
