//! Configuration loader and validator for the export relay.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub queue: Queue,
    pub audit: Audit,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub bind_addr: String,
    pub data_dir: String,
    pub max_batch_items: usize,
    pub max_body_bytes: usize,
}

/// Queue service location and processor endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Queue {
    pub api_base: String,
    pub project: String,
    pub location: String,
    pub queue: String,
    pub processor_url: String,
    /// Bearer token for the queue API, if the deployment needs one.
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Name tasks by a digest of their body so byte-identical retries
    /// collapse into one task at the queue.
    #[serde(default)]
    pub dedupe_tasks: bool,
}

/// Audit warehouse settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Audit {
    pub enabled: bool,
    #[serde(default)]
    pub database_url: Option<String>,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// Resolved audit warehouse URL: explicit setting, or a SQLite file
    /// under the data directory.
    pub fn audit_database_url(&self) -> String {
        self.audit
            .database_url
            .clone()
            .unwrap_or_else(|| format!("sqlite://{}/audit.db", self.app.data_dir))
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

/// Validate a configuration instance. Missing queue coordinates are a
/// startup error, not a per-request one.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.bind_addr.trim().is_empty() {
        return Err(ConfigError::Invalid("app.bind_addr must be non-empty"));
    }
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.max_batch_items == 0 {
        return Err(ConfigError::Invalid("app.max_batch_items must be > 0"));
    }
    if cfg.app.max_body_bytes == 0 {
        return Err(ConfigError::Invalid("app.max_body_bytes must be > 0"));
    }

    if cfg.queue.api_base.trim().is_empty() {
        return Err(ConfigError::Invalid("queue.api_base must be non-empty"));
    }
    if cfg.queue.project.trim().is_empty() {
        return Err(ConfigError::Invalid("queue.project must be non-empty"));
    }
    if cfg.queue.location.trim().is_empty() {
        return Err(ConfigError::Invalid("queue.location must be non-empty"));
    }
    if cfg.queue.queue.trim().is_empty() {
        return Err(ConfigError::Invalid("queue.queue must be non-empty"));
    }
    if cfg.queue.processor_url.trim().is_empty() {
        return Err(ConfigError::Invalid("queue.processor_url must be non-empty"));
    }

    if let Some(url) = &cfg.audit.database_url {
        if url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "audit.database_url must be non-empty when set",
            ));
        }
    }

    Ok(())
}

/// Canonical example YAML, also used by tests.
pub fn example() -> &'static str {
    r#"app:
  bind_addr: "127.0.0.1:8080"
  data_dir: "./data"
  max_batch_items: 25
  max_body_bytes: 10485760

queue:
  api_base: "https://cloudtasks.googleapis.com/"
  project: "YOUR_GCP_PROJECT_ID"
  location: "YOUR_GCP_REGION"
  queue: "export-queue"
  processor_url: "https://example.com/process-batch"
  dedupe_tasks: false

audit:
  enabled: true
"#
}
