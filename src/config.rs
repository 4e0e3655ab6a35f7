//! Configuration loader and validator for the price-tracking worker.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
    #[error("Invalid value for {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    #[serde(default)]
    pub worker: WorkerSettings,
    #[serde(default)]
    pub scraper: ScraperSettings,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub database_url: String,
}

/// Supervisor loop settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkerSettings {
    pub poll_interval_ms: u64,
    /// Consecutive system failures tolerated before the worker shuts down.
    pub failure_tolerance: u32,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            failure_tolerance: 10,
        }
    }
}

impl WorkerSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// HTTP settings shared by the store scrapers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScraperSettings {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ScraperSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            user_agent: "pricewatch/0.1".to_string(),
        }
    }
}

/// Load configuration from a YAML file, apply environment overrides and validate.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok())?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Override file values with `DATABASE_URL`, `WORKER_POLL_INTERVAL_MS` and
/// `WORKER_FAILURE_TOLERANCE` when set and non-empty.
pub fn apply_env_overrides<F>(cfg: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(url) = get("DATABASE_URL") {
        cfg.app.database_url = url;
    }
    if let Some(v) = get("WORKER_POLL_INTERVAL_MS") {
        cfg.worker.poll_interval_ms = v.trim().parse().map_err(|_| ConfigError::InvalidEnv {
            key: "WORKER_POLL_INTERVAL_MS",
            value: v.clone(),
        })?;
    }
    if let Some(v) = get("WORKER_FAILURE_TOLERANCE") {
        cfg.worker.failure_tolerance =
            v.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                key: "WORKER_FAILURE_TOLERANCE",
                value: v.clone(),
            })?;
    }
    Ok(())
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.database_url.trim().is_empty() {
        return Err(ConfigError::Invalid("app.database_url must be non-empty"));
    }
    if cfg.worker.poll_interval_ms == 0 {
        return Err(ConfigError::Invalid("worker.poll_interval_ms must be > 0"));
    }
    if cfg.worker.failure_tolerance == 0 {
        return Err(ConfigError::Invalid("worker.failure_tolerance must be > 0"));
    }
    if cfg.scraper.timeout_secs == 0 {
        return Err(ConfigError::Invalid("scraper.timeout_secs must be > 0"));
    }
    if cfg.scraper.user_agent.trim().is_empty() {
        return Err(ConfigError::Invalid("scraper.user_agent must be non-empty"));
    }
    Ok(())
}

/// Example YAML configuration.
pub fn example() -> &'static str {
    r#"app:
  database_url: "sqlite://./data/pricewatch.db"

worker:
  poll_interval_ms: 1000
  failure_tolerance: 10

scraper:
  timeout_secs: 10
  user_agent: "pricewatch/0.1"
"#
}
