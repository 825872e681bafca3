//! Global configuration parsing and validation.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Worker process invocation settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct WorkerConfig {
    /// Worker CLI binary (e.g., `claude`).
    pub command: String,
    /// Arguments selecting streaming output, verbose mode, and unattended
    /// tool permissions, passed before the session flags.
    pub base_args: Vec<String>,
    /// Project root: the worker's working directory and the base for
    /// rewriting absolute file paths in progress details.
    pub project_root: PathBuf,
    /// Wall-clock bound for a single job, in seconds.
    pub timeout_seconds: u64,
    /// Grace period for process exit before escalating, in seconds.
    pub grace_seconds: u64,
    /// Poll interval for the scheduler's event wait loop, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            base_args: default_base_args(),
            project_root: default_project_root(),
            timeout_seconds: default_timeout_seconds(),
            grace_seconds: default_grace_seconds(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_command() -> String {
    "claude".into()
}

fn default_base_args() -> Vec<String> {
    vec![
        "--output-format".into(),
        "stream-json".into(),
        "--verbose".into(),
        "--dangerously-skip-permissions".into(),
    ]
}

fn default_project_root() -> PathBuf {
    env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn default_timeout_seconds() -> u64 {
    300
}

fn default_grace_seconds() -> u64 {
    10
}

fn default_poll_interval_ms() -> u64 {
    200
}

/// Relay identity and cost display settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", default)]
pub struct RelayConfig {
    /// Username the worker's answers are broadcast under. Messages from
    /// this identity are never fed back into the queue.
    pub agent_name: String,
    /// ISO code of the local currency shown next to USD cost.
    pub currency: String,
    /// USD to local-currency conversion rate.
    pub usd_rate: f64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            agent_name: "Claude".into(),
            currency: "KRW".into(),
            usd_rate: 1430.0,
        }
    }
}

/// WebSocket hub listener settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8765,
        }
    }
}

/// Transient-error retry settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct RetryConfig {
    /// Maximum re-dispatches per job after a transient session error.
    pub max_retries: u32,
    /// Case-insensitive diagnostic substrings that classify a failure as a
    /// stale-session condition worth retrying under a fresh session.
    pub transient_markers: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            transient_markers: vec![
                "invalid session".into(),
                "session not found".into(),
                "no conversation found".into(),
            ],
        }
    }
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", default)]
pub struct GlobalConfig {
    /// Worker process settings.
    pub worker: WorkerConfig,
    /// Relay identity and cost display settings.
    pub relay: RelayConfig,
    /// Hub listener settings.
    pub server: ServerConfig,
    /// Retry policy settings.
    pub retry: RetryConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Built-in defaults, validated (the project root must exist).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the current directory cannot be
    /// canonicalized.
    pub fn defaults() -> Result<Self> {
        let mut config = Self::default();
        config.validate()?;
        Ok(config)
    }

    /// Wall-clock bound for a single job.
    #[must_use]
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.worker.timeout_seconds)
    }

    /// Grace period for process exit before escalating.
    #[must_use]
    pub fn exit_grace(&self) -> Duration {
        Duration::from_secs(self.worker.grace_seconds)
    }

    /// Poll interval for the scheduler's event wait loop.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.worker.poll_interval_ms)
    }

    fn validate(&mut self) -> Result<()> {
        if self.worker.command.trim().is_empty() {
            return Err(AppError::Config("worker.command must not be empty".into()));
        }

        if self.worker.timeout_seconds == 0 {
            return Err(AppError::Config(
                "worker.timeout_seconds must be greater than zero".into(),
            ));
        }

        if self.worker.poll_interval_ms == 0 {
            return Err(AppError::Config(
                "worker.poll_interval_ms must be greater than zero".into(),
            ));
        }

        if self.relay.usd_rate <= 0.0 {
            return Err(AppError::Config(
                "relay.usd_rate must be greater than zero".into(),
            ));
        }

        let canonical_root = self
            .worker
            .project_root
            .canonicalize()
            .map_err(|err| AppError::Config(format!("worker.project_root invalid: {err}")))?;
        self.worker.project_root = canonical_root;

        Ok(())
    }
}
