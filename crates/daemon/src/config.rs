//! Configuration management for the termhub daemon.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/termhub/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use termhub_protocol::MAX_LINE_LENGTH;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("max_sessions must be between 1 and 1000, got {0}")]
    InvalidMaxSessions(usize),

    #[error("settle_ms must be at most 60000, got {0}")]
    InvalidSettle(u64),

    #[error("default_wait_secs must be a finite number between 0 and 300, got {0}")]
    InvalidDefaultWait(f64),

    #[error("terminal size must be non-zero, got {cols}x{rows}")]
    InvalidTerminalSize { cols: u16, rows: u16 },

    #[error("shell path does not exist: {0}")]
    InvalidShellPath(String),

    #[error("ssh program must not be empty")]
    EmptySshProgram,

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),

    #[error("max_line_bytes must be at least 1024, got {0}")]
    InvalidMaxLineBytes(usize),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Upper bound for the per-call wait, in seconds.
pub const MAX_WAIT_SECS: f64 = 300.0;

/// Main configuration structure for the termhub daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General daemon configuration.
    pub daemon: DaemonConfig,

    /// Session management configuration.
    pub session: SessionConfig,

    /// Remote shell invocation.
    pub ssh: SshConfig,
}

/// General daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Optional file receiving log output in addition to stderr.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    /// Longest accepted request line in bytes.
    pub max_line_bytes: usize,
}

/// Session management configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Shell started for `host = "local"`.
    pub shell: String,

    /// `TERM` value exported to session processes.
    pub term: String,

    /// Maximum number of concurrent sessions.
    pub max_sessions: usize,

    /// Time given to a new session to print its banner, in milliseconds.
    pub settle_ms: u64,

    /// Wait applied by interact when the caller gives none, in seconds.
    pub default_wait_secs: f64,

    /// Cap on undrained output per session in bytes (0 = unbounded).
    pub max_buffer_bytes: usize,

    /// Terminal width.
    pub cols: u16,

    /// Terminal height.
    pub rows: u16,
}

/// How remote sessions are started.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SshConfig {
    /// ssh client binary.
    pub program: String,

    /// Arguments placed before the destination.
    pub options: Vec<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file: None,
            max_line_bytes: MAX_LINE_LENGTH,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            term: "xterm-256color".to_string(),
            max_sessions: 32,
            settle_ms: 1000,
            default_wait_secs: 0.5,
            max_buffer_bytes: 0,
            cols: 120,
            rows: 40,
        }
    }
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            program: "ssh".to_string(),
            // -tt forces a PTY, BatchMode fails fast instead of prompting.
            options: vec![
                "-tt".to_string(),
                "-o".to_string(),
                "BatchMode=yes".to_string(),
                "-o".to_string(),
                "StrictHostKeyChecking=no".to_string(),
            ],
        }
    }
}

impl SessionConfig {
    /// Settle window as a duration.
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Default interact wait as a duration.
    pub fn default_wait(&self) -> Duration {
        Duration::from_secs_f64(self.default_wait_secs.clamp(0.0, MAX_WAIT_SECS))
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("termhub")
        .join("config.toml")
}

/// Non-empty value of an environment variable.
fn env_override(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

/// Returns the default shell: `$SHELL`, else bash, else sh.
fn default_shell() -> String {
    match std::env::var("SHELL") {
        Ok(shell) if !shell.is_empty() => shell,
        _ if Path::new("/bin/bash").exists() => "/bin/bash".to_string(),
        _ => "/bin/sh".to_string(),
    }
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - TERMHUB_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    /// - TERMHUB_SHELL: Override the local shell
    /// - TERMHUB_SSH_PROGRAM: Override the ssh client binary
    ///
    /// Returns the names of the variables that were applied. Overrides are
    /// usually applied before logging is installed, so the caller logs them.
    pub fn apply_env_overrides(&mut self) -> Vec<&'static str> {
        let mut applied = Vec::new();

        if let Some(level) = env_override("TERMHUB_LOG_LEVEL") {
            self.daemon.log_level = level;
            applied.push("TERMHUB_LOG_LEVEL");
        }

        if let Some(shell) = env_override("TERMHUB_SHELL") {
            self.session.shell = shell;
            applied.push("TERMHUB_SHELL");
        }

        if let Some(program) = env_override("TERMHUB_SSH_PROGRAM") {
            self.ssh.program = program;
            applied.push("TERMHUB_SSH_PROGRAM");
        }

        applied
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is outside the valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let session = &self.session;

        if session.max_sessions < 1 || session.max_sessions > 1000 {
            return Err(ConfigError::InvalidMaxSessions(session.max_sessions));
        }

        if session.settle_ms > 60_000 {
            return Err(ConfigError::InvalidSettle(session.settle_ms));
        }

        let wait = session.default_wait_secs;
        if !wait.is_finite() || !(0.0..=MAX_WAIT_SECS).contains(&wait) {
            return Err(ConfigError::InvalidDefaultWait(wait));
        }

        if session.cols == 0 || session.rows == 0 {
            return Err(ConfigError::InvalidTerminalSize {
                cols: session.cols,
                rows: session.rows,
            });
        }

        // Absolute paths must exist; bare names must resolve through PATH.
        let shell_path = Path::new(&session.shell);
        let shell_found = if shell_path.is_absolute() {
            shell_path.exists()
        } else {
            which::which(&session.shell).is_ok()
        };
        if !shell_found {
            return Err(ConfigError::InvalidShellPath(session.shell.clone()));
        }

        if self.ssh.program.trim().is_empty() {
            return Err(ConfigError::EmptySshProgram);
        }

        let level = self.daemon.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.daemon.log_level.clone()));
        }

        if self.daemon.max_line_bytes < 1024 {
            return Err(ConfigError::InvalidMaxLineBytes(self.daemon.max_line_bytes));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message. Nothing is logged here, since loading happens
    /// before the subscriber is installed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.daemon.log_level, "info");
        assert!(config.daemon.log_file.is_none());
        assert_eq!(config.session.max_sessions, 32);
        assert_eq!(config.session.settle_ms, 1000);
        assert_eq!(config.session.default_wait_secs, 0.5);
        assert_eq!(config.session.max_buffer_bytes, 0);
        assert_eq!(config.ssh.program, "ssh");
        assert_eq!(config.ssh.options[0], "-tt");
        assert!(config.ssh.options.contains(&"BatchMode=yes".to_string()));
    }

    #[test]
    fn test_durations() {
        let config = SessionConfig::default();
        assert_eq!(config.settle(), Duration::from_secs(1));
        assert_eq!(config.default_wait(), Duration::from_millis(500));
    }

    #[test]
    fn test_default_wait_clamped() {
        let config = SessionConfig {
            default_wait_secs: -3.0,
            ..SessionConfig::default()
        };
        assert_eq!(config.default_wait(), Duration::ZERO);
    }

    #[test]
    fn test_from_toml_empty() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_from_toml_partial() {
        let toml = r#"
[daemon]
log_level = "debug"

[session]
max_sessions = 5
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.daemon.log_level, "debug");
        assert_eq!(config.session.max_sessions, 5);
        assert_eq!(config.ssh, SshConfig::default());
    }

    #[test]
    fn test_from_toml_full() {
        let toml = r#"
[daemon]
log_level = "trace"
log_file = "/var/log/termhub.log"

[session]
shell = "/bin/zsh"
term = "screen"
max_sessions = 20
settle_ms = 250
default_wait_secs = 2.0
max_buffer_bytes = 1048576
cols = 80
rows = 24

[ssh]
program = "/usr/local/bin/ssh"
options = ["-tt", "-o", "ConnectTimeout=5"]
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.daemon.log_level, "trace");
        assert_eq!(
            config.daemon.log_file,
            Some(PathBuf::from("/var/log/termhub.log"))
        );
        assert_eq!(config.session.shell, "/bin/zsh");
        assert_eq!(config.session.term, "screen");
        assert_eq!(config.session.max_sessions, 20);
        assert_eq!(config.session.settle_ms, 250);
        assert_eq!(config.session.default_wait_secs, 2.0);
        assert_eq!(config.session.max_buffer_bytes, 1048576);
        assert_eq!((config.session.cols, config.session.rows), (80, 24));
        assert_eq!(config.ssh.program, "/usr/local/bin/ssh");
        assert_eq!(config.ssh.options, vec!["-tt", "-o", "ConnectTimeout=5"]);
    }

    #[test]
    fn test_from_toml_invalid_syntax() {
        let toml = r#"
[daemon
log_level = "debug"
"#;
        let result = Config::from_toml(toml);
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Invalid TOML"));
    }

    #[test]
    fn test_from_toml_wrong_type() {
        let toml = r#"
[session]
max_sessions = "not a number"
"#;
        assert!(Config::from_toml(toml).is_err());
    }

    #[test]
    fn test_to_toml() {
        let toml = Config::default().to_toml().unwrap();

        assert!(toml.contains("[daemon]"));
        assert!(toml.contains("[session]"));
        assert!(toml.contains("[ssh]"));
        assert!(!toml.contains("log_file"));
    }

    #[test]
    fn test_roundtrip_custom() {
        let mut original = Config::default();
        original.daemon.log_level = "warn".to_string();
        original.daemon.log_file = Some(PathBuf::from("/tmp/termhub.log"));
        original.session.max_sessions = 42;
        original.session.default_wait_secs = 1.25;
        original.ssh.options = vec!["-tt".to_string()];

        let toml = original.to_toml().unwrap();
        let loaded = Config::from_toml(&toml).unwrap();

        assert_eq!(original, loaded);
    }

    #[test]
    fn test_load_missing_file() {
        let config = Config::load("/nonexistent/path/config.toml").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut original = Config::default();
        original.daemon.log_level = "debug".to_string();
        original.session.settle_ms = 1500;

        original.save(&config_path).unwrap();
        let loaded = Config::load(&config_path).unwrap();

        assert_eq!(original, loaded);
    }

    #[test]
    fn test_load_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        fs::write(&config_path, "invalid [ toml").unwrap();

        let result = Config::load(&config_path);
        assert!(result.is_err());
        let err = format!("{:#}", result.unwrap_err());
        assert!(err.contains("Failed to parse config file"));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.to_string_lossy().contains("termhub"));
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    #[serial]
    fn test_env_override_log_level() {
        std::env::set_var("TERMHUB_LOG_LEVEL", "debug");

        let mut config = Config::default();
        let applied = config.apply_env_overrides();
        assert_eq!(config.daemon.log_level, "debug");
        assert_eq!(applied, vec!["TERMHUB_LOG_LEVEL"]);

        std::env::remove_var("TERMHUB_LOG_LEVEL");
    }

    #[test]
    #[serial]
    fn test_env_override_empty_does_not_override() {
        std::env::set_var("TERMHUB_SSH_PROGRAM", "");

        let mut config = Config::default();
        let applied = config.apply_env_overrides();
        assert_eq!(config.ssh.program, "ssh");
        assert!(!applied.contains(&"TERMHUB_SSH_PROGRAM"));

        std::env::remove_var("TERMHUB_SSH_PROGRAM");
    }

    #[test]
    #[serial]
    fn test_env_override_shell_and_ssh() {
        std::env::set_var("TERMHUB_SHELL", "/bin/sh");
        std::env::set_var("TERMHUB_SSH_PROGRAM", "/opt/ssh/bin/ssh");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.session.shell, "/bin/sh");
        assert_eq!(config.ssh.program, "/opt/ssh/bin/ssh");

        std::env::remove_var("TERMHUB_SHELL");
        std::env::remove_var("TERMHUB_SSH_PROGRAM");
    }

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.session.shell = "/bin/sh".to_string();
        config
    }

    #[test]
    fn test_validate_default_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_max_sessions() {
        let mut config = valid_config();
        config.session.max_sessions = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidMaxSessions(0)));

        config.session.max_sessions = 1001;
        assert_eq!(config.validate(), Err(ConfigError::InvalidMaxSessions(1001)));
    }

    #[test]
    fn test_validate_settle() {
        let mut config = valid_config();
        config.session.settle_ms = 60_001;
        assert_eq!(config.validate(), Err(ConfigError::InvalidSettle(60_001)));
    }

    #[test]
    fn test_validate_default_wait() {
        let mut config = valid_config();
        config.session.default_wait_secs = -1.0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidDefaultWait(-1.0)));

        config.session.default_wait_secs = f64::INFINITY;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDefaultWait(_))
        ));
    }

    #[test]
    fn test_validate_terminal_size() {
        let mut config = valid_config();
        config.session.rows = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidTerminalSize { cols: 120, rows: 0 })
        );
    }

    #[test]
    fn test_validate_missing_shell() {
        let mut config = valid_config();
        config.session.shell = "/nonexistent/shell".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidShellPath("/nonexistent/shell".to_string()))
        );
    }

    #[test]
    fn test_validate_shell_in_path() {
        let mut config = valid_config();
        config.session.shell = "sh".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_ssh_program() {
        let mut config = valid_config();
        config.ssh.program = "  ".to_string();
        assert_eq!(config.validate(), Err(ConfigError::EmptySshProgram));
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = valid_config();
        config.daemon.log_level = "verbose".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel("verbose".to_string()))
        );

        config.daemon.log_level = "DEBUG".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_max_line_bytes() {
        let mut config = valid_config();
        assert_eq!(config.daemon.max_line_bytes, MAX_LINE_LENGTH);

        config.daemon.max_line_bytes = 100;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidMaxLineBytes(100))
        );

        config.daemon.max_line_bytes = 1024;
        assert!(config.validate().is_ok());
    }
}
