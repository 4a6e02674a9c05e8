//! Configuration loader and validator for the grading queue.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::canvas::retry::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub canvas: Canvas,
    pub cache: Cache,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
}

/// Canvas REST client settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Canvas {
    pub api_prefix: String,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub request_pacing_ms: u64,
    pub max_pages: u32,
    pub per_page: u32,
}

/// Session/credential cache settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cache {
    pub session_ttl_secs: u64,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// `DATABASE_URL` wins over the file under `app.data_dir`.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{}/profiles.db", self.app.data_dir))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.canvas.max_retries,
            initial_backoff: Duration::from_millis(self.canvas.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.canvas.max_backoff_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.canvas.request_timeout_secs)
    }

    pub fn request_pacing(&self) -> Duration {
        Duration::from_millis(self.canvas.request_pacing_ms)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.session_ttl_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        serde_yaml::from_str(example()).expect("bundled example config parses")
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }

    let c = &cfg.canvas;
    if c.api_prefix.trim().trim_matches('/').is_empty() {
        return Err(ConfigError::Invalid("canvas.api_prefix must be non-empty"));
    }
    if c.request_timeout_secs == 0 {
        return Err(ConfigError::Invalid("canvas.request_timeout_secs must be > 0"));
    }
    if c.initial_backoff_ms == 0 {
        return Err(ConfigError::Invalid("canvas.initial_backoff_ms must be > 0"));
    }
    if c.max_backoff_ms < c.initial_backoff_ms {
        return Err(ConfigError::Invalid("canvas.max_backoff_ms must be >= canvas.initial_backoff_ms"));
    }
    if c.max_pages == 0 {
        return Err(ConfigError::Invalid("canvas.max_pages must be > 0"));
    }
    if c.per_page == 0 || c.per_page > 100 {
        return Err(ConfigError::Invalid("canvas.per_page must be within 1..=100"));
    }
    // max_retries and request_pacing_ms may legitimately be 0

    if cfg.cache.session_ttl_secs == 0 {
        return Err(ConfigError::Invalid("cache.session_ttl_secs must be > 0"));
    }

    Ok(())
}

/// Returns the example YAML content with the default settings.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"

canvas:
  api_prefix: "api/v1"
  request_timeout_secs: 30
  max_retries: 2
  initial_backoff_ms: 1000
  max_backoff_ms: 10000
  request_pacing_ms: 100
  max_pages: 20
  per_page: 100

cache:
  session_ttl_secs: 300
"#
}
