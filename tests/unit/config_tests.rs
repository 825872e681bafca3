//! Unit tests for configuration parsing, defaults, and validation.

use std::time::Duration;

use agent_relay::{AppError, GlobalConfig};

fn temp_root() -> String {
    std::env::temp_dir().display().to_string()
}

#[test]
fn empty_toml_yields_the_built_in_defaults() {
    let config = GlobalConfig::from_toml_str("").expect("defaults must validate");

    assert_eq!(config.worker.command, "claude");
    assert_eq!(
        config.worker.base_args,
        vec![
            "--output-format",
            "stream-json",
            "--verbose",
            "--dangerously-skip-permissions",
        ]
    );
    assert_eq!(config.worker.timeout_seconds, 300);
    assert_eq!(config.relay.agent_name, "Claude");
    assert_eq!(config.relay.currency, "KRW");
    assert_eq!(config.server.port, 8765);
    assert_eq!(config.retry.max_retries, 1);
    assert!(!config.retry.transient_markers.is_empty());
}

#[test]
fn duration_accessors_reflect_the_configured_values() {
    let toml = format!(
        r#"
[worker]
project_root = '{root}'
timeout_seconds = 5
grace_seconds = 2
poll_interval_ms = 50
"#,
        root = temp_root(),
    );
    let config = GlobalConfig::from_toml_str(&toml).expect("valid config");

    assert_eq!(config.job_timeout(), Duration::from_secs(5));
    assert_eq!(config.exit_grace(), Duration::from_secs(2));
    assert_eq!(config.poll_interval(), Duration::from_millis(50));
}

#[test]
fn sections_override_independently() {
    let toml = format!(
        r#"
[worker]
command = "mock-agent"
project_root = '{root}'

[relay]
agent_name = "Helper"
currency = "EUR"
usd_rate = 0.9

[server]
host = "127.0.0.1"
port = 9100

[retry]
max_retries = 2
transient_markers = ["stale session"]
"#,
        root = temp_root(),
    );
    let config = GlobalConfig::from_toml_str(&toml).expect("valid config");

    assert_eq!(config.worker.command, "mock-agent");
    assert_eq!(config.relay.agent_name, "Helper");
    assert_eq!(config.relay.currency, "EUR");
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 9100);
    assert_eq!(config.retry.max_retries, 2);
    assert_eq!(config.retry.transient_markers, vec!["stale session"]);
}

#[test]
fn project_root_is_canonicalized() {
    let dir = tempfile::tempdir().expect("tempdir");
    let toml = format!(
        "[worker]\nproject_root = '{}'\n",
        dir.path().display()
    );

    let config = GlobalConfig::from_toml_str(&toml).expect("valid config");

    assert!(config.worker.project_root.is_absolute());
}

#[test]
fn empty_command_is_rejected() {
    let toml = format!(
        "[worker]\ncommand = \"  \"\nproject_root = '{}'\n",
        temp_root()
    );

    let result = GlobalConfig::from_toml_str(&toml);

    assert!(
        matches!(result, Err(AppError::Config(ref msg)) if msg.contains("command")),
        "expected a command validation error, got: {result:?}"
    );
}

#[test]
fn zero_timeout_is_rejected() {
    let toml = format!(
        "[worker]\ntimeout_seconds = 0\nproject_root = '{}'\n",
        temp_root()
    );

    let result = GlobalConfig::from_toml_str(&toml);

    assert!(
        matches!(result, Err(AppError::Config(ref msg)) if msg.contains("timeout_seconds")),
        "expected a timeout validation error, got: {result:?}"
    );
}

#[test]
fn zero_poll_interval_is_rejected() {
    let toml = format!(
        "[worker]\npoll_interval_ms = 0\nproject_root = '{}'\n",
        temp_root()
    );

    let result = GlobalConfig::from_toml_str(&toml);

    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn non_positive_usd_rate_is_rejected() {
    let toml = format!(
        "[worker]\nproject_root = '{root}'\n\n[relay]\nusd_rate = 0.0\n",
        root = temp_root()
    );

    let result = GlobalConfig::from_toml_str(&toml);

    assert!(
        matches!(result, Err(AppError::Config(ref msg)) if msg.contains("usd_rate")),
        "expected a usd_rate validation error, got: {result:?}"
    );
}

#[test]
fn missing_project_root_is_rejected() {
    let toml = "[worker]\nproject_root = '/definitely/not/a/real/path'\n";

    let result = GlobalConfig::from_toml_str(toml);

    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn invalid_toml_reports_a_config_error() {
    let result = GlobalConfig::from_toml_str("worker = 1");

    assert!(
        matches!(result, Err(AppError::Config(ref msg)) if msg.contains("invalid config")),
        "expected a parse error, got: {result:?}"
    );
}
