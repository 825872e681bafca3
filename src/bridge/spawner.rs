//! Worker process spawner.
//!
//! Builds and launches the external worker with:
//! - `kill_on_drop(true)` so processes are cleaned up automatically.
//! - `env_clear()` + a safe variable allowlist so server-side secrets are
//!   never visible to the worker process.
//! - Session flags chosen by the session's `started` state: a fresh-session
//!   flag carrying a newly generated identifier, or a resume flag carrying
//!   the current one.

use std::process::Stdio;

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::debug;

use crate::config::WorkerConfig;
use crate::models::session::Session;
use crate::{AppError, Result};

/// Environment variables inherited by the spawned worker process.
///
/// Every other variable from the server's environment is stripped via
/// `env_clear()` before the child is launched.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "RUST_LOG",
    // Windows-specific variables.
    "USERPROFILE",
    "SystemRoot",
    "TEMP",
    "TMP",
    "USERNAME",
    "APPDATA",
    "LOCALAPPDATA",
    "COMSPEC",
];

/// Captured stdio handles of a live worker process.
#[derive(Debug)]
pub struct WorkerProcess {
    /// Child process handle — kept alive so `kill_on_drop` works.
    pub child: Child,
    /// Worker's stdin, for delivering the prompt.
    pub stdin: ChildStdin,
    /// Worker's primary structured output stream.
    pub stdout: ChildStdout,
    /// Worker's diagnostic text stream.
    pub stderr: ChildStderr,
}

/// Spawn the worker for one job under the given session.
///
/// The command line is `command` + `base_args` + the session flags
/// (`--session-id <id>` for a fresh session, `-r <id>` to resume) +
/// `-p -`, which tells the worker to read the prompt from stdin.
///
/// # Errors
///
/// - `AppError::Spawn("failed to spawn worker: …")` — OS spawn failure.
/// - `AppError::Spawn("failed to capture worker …")` — stdio pipe missing.
pub fn spawn_worker(config: &WorkerConfig, session: &Session) -> Result<WorkerProcess> {
    let mut cmd = Command::new(&config.command);

    for arg in &config.base_args {
        cmd.arg(arg);
    }

    if session.started {
        debug!(session_id = %session.id, "resuming worker session");
        cmd.arg("-r").arg(&session.id);
    } else {
        debug!(session_id = %session.id, "starting fresh worker session");
        cmd.arg("--session-id").arg(&session.id);
    }

    // Read the prompt from stdin; end-of-input starts processing.
    cmd.arg("-p").arg("-");

    // Strip inherited environment, then inject only the safe allowlist.
    cmd.env_clear();
    for &key in ALLOWED_ENV_VARS {
        if let Ok(val) = std::env::var(key) {
            cmd.env(key, val);
        }
    }

    cmd.current_dir(&config.project_root)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|err| AppError::Spawn(format!("failed to spawn worker: {err}")))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture worker stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture worker stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture worker stderr".into()))?;

    Ok(WorkerProcess {
        child,
        stdin,
        stdout,
        stderr,
    })
}
