//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Worker executable could not be launched.
    Spawn(String),
    /// Read or write on a worker stream failed mid-job.
    Io(String),
    /// Worker stream framing or protocol failure.
    Protocol(String),
    /// Session state is invalid or could not be continued.
    Session(String),
    /// Job exceeded its wall-clock bound.
    Timeout(String),
    /// Progress event could not be delivered to consumers.
    Publish(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Session(msg) => write!(f, "session: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::Publish(msg) => write!(f, "publish: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
