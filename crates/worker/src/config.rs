use std::str::FromStr;
use std::time::Duration;

use fleetwatch_core::device::DEFAULT_CHECK_INTERVAL_SECS;
use fleetwatch_db::models::device::CreateDevice;
use fleetwatch_events::stream::{ALERT_STREAM, DEFAULT_READ_COUNT};
use fleetwatch_pipeline::backoff::RetryConfig;
use fleetwatch_pipeline::consumer::{DEFAULT_BLOCK_TIMEOUT, DEFAULT_CONSUMER_NAME};
use fleetwatch_pipeline::health::DEFAULT_DOWN_PROBABILITY;
use fleetwatch_pipeline::{ConsumerConfig, MonitorConfig};

use crate::seed::parse_seed_devices;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Where devices, alerts, tickets, cursors and the stream live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Storage {
    Postgres { database_url: String },
    /// Everything in process; lost on exit.
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err("expected 'pretty' or 'json'".into()),
        }
    }
}

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub storage: Storage,
    /// Seconds between health monitor cycles (default: `10`).
    pub health_check_interval_secs: u64,
    /// Consumer blocking read timeout in milliseconds (default: `5000`).
    pub stream_block_timeout_ms: u64,
    /// Maximum events per consumer read (default: `100`).
    pub stream_read_batch: usize,
    pub alert_stream_name: String,
    /// Key of the consumer's persisted cursor (default: `alert_worker`).
    pub consumer_name: String,
    /// Chance that the random probe reports a device DOWN (default: `0.5`).
    pub health_down_probability: f64,
    /// Devices registered at startup when not already present.
    pub seed_devices: Vec<CreateDevice>,
    pub log_format: LogFormat,
    /// How long to wait for the loops to stop after a signal (default: `30`).
    pub shutdown_timeout_secs: u64,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default                          |
    /// |------------------------------|----------------------------------|
    /// | `STORAGE_BACKEND`            | `postgres` (or `memory`)         |
    /// | `DATABASE_URL`               | required for `postgres`          |
    /// | `HEALTH_CHECK_INTERVAL_SECS` | `10`                             |
    /// | `STREAM_BLOCK_TIMEOUT_MS`    | `5000`                           |
    /// | `STREAM_READ_BATCH`          | `100`                            |
    /// | `ALERT_STREAM_NAME`          | `alert_stream`                   |
    /// | `CONSUMER_NAME`              | `alert_worker`                   |
    /// | `HEALTH_DOWN_PROBABILITY`    | `0.5`                            |
    /// | `SEED_DEVICES`               | empty; `name:type,name:type`     |
    /// | `LOG_FORMAT`                 | `pretty` (or `json`)             |
    /// | `SHUTDOWN_TIMEOUT_SECS`      | `30`                             |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let storage = match var("STORAGE_BACKEND").as_deref().map(str::trim) {
            None | Some("postgres") => Storage::Postgres {
                database_url: var("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            },
            Some("memory") => Storage::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "STORAGE_BACKEND",
                    value: other.to_string(),
                    reason: "expected 'postgres' or 'memory'".into(),
                })
            }
        };

        let health_check_interval_secs = parse_or(
            &var,
            "HEALTH_CHECK_INTERVAL_SECS",
            DEFAULT_CHECK_INTERVAL_SECS,
        )?;
        let stream_block_timeout_ms = parse_or(
            &var,
            "STREAM_BLOCK_TIMEOUT_MS",
            DEFAULT_BLOCK_TIMEOUT.as_millis() as u64,
        )?;
        let stream_read_batch = parse_or(&var, "STREAM_READ_BATCH", DEFAULT_READ_COUNT)?;
        let health_down_probability =
            parse_or(&var, "HEALTH_DOWN_PROBABILITY", DEFAULT_DOWN_PROBABILITY)?;
        let log_format = parse_or(&var, "LOG_FORMAT", LogFormat::Pretty)?;
        let shutdown_timeout_secs = parse_or(&var, "SHUTDOWN_TIMEOUT_SECS", 30u64)?;

        if health_check_interval_secs == 0 {
            return Err(invalid("HEALTH_CHECK_INTERVAL_SECS", "0", "must be positive"));
        }
        if stream_read_batch == 0 {
            return Err(invalid("STREAM_READ_BATCH", "0", "must be positive"));
        }
        if !(0.0..=1.0).contains(&health_down_probability) {
            return Err(invalid(
                "HEALTH_DOWN_PROBABILITY",
                &health_down_probability.to_string(),
                "must be between 0 and 1",
            ));
        }

        let seed_devices = match var("SEED_DEVICES") {
            Some(raw) => parse_seed_devices(&raw).map_err(|reason| ConfigError::Invalid {
                var: "SEED_DEVICES",
                value: raw.clone(),
                reason,
            })?,
            None => Vec::new(),
        };

        Ok(Self {
            storage,
            health_check_interval_secs,
            stream_block_timeout_ms,
            stream_read_batch,
            alert_stream_name: var("ALERT_STREAM_NAME").unwrap_or_else(|| ALERT_STREAM.into()),
            consumer_name: var("CONSUMER_NAME").unwrap_or_else(|| DEFAULT_CONSUMER_NAME.into()),
            health_down_probability,
            seed_devices,
            log_format,
            shutdown_timeout_secs,
        })
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            interval: Duration::from_secs(self.health_check_interval_secs),
            stream: self.alert_stream_name.clone(),
        }
    }

    pub fn consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig {
            consumer_name: self.consumer_name.clone(),
            stream: self.alert_stream_name.clone(),
            block_timeout: Duration::from_millis(self.stream_block_timeout_ms),
            batch_size: self.stream_read_batch,
            retry: RetryConfig::default(),
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

fn invalid(var: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_or<T, F>(var: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(key, &raw, &e.to_string())),
        None => Ok(default),
    }
}
