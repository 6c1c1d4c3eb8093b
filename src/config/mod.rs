//! Application configuration loaded from config.toml.
//!
//! A missing file is not fatal: every section has defaults, and the bot logs a
//! warning and carries on. A file that exists but does not parse is an error.

/// Database configuration and connection management
pub mod database;

/// Per-tier limits
pub mod tiers;

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tiers::TierTable;

/// Environment variable overriding the config file location
pub const CONFIG_PATH_VAR: &str = "OSIRIS_CONFIG";

/// Whole config.toml file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Filesystem locations
    pub paths: PathsConfig,
    /// AI backend behaviour
    pub ai: AiConfig,
    /// Execution engine tuning
    pub executor: ExecutorConfig,
    /// Maintenance cutover
    pub maintenance: MaintenanceConfig,
    /// Per-tier limits
    pub tiers: TierTable,
}

/// `[paths]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root for scratch and saved command files
    pub data_dir: PathBuf,
    /// Directory holding the fixed prompt files
    pub prompts_dir: PathBuf,
    /// Directory holding the `open/` and `restricted/` handler manifests
    pub commands_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            prompts_dir: PathBuf::from("prompts"),
            commands_dir: PathBuf::from("commands"),
        }
    }
}

/// `[ai]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Chat completions endpoint (OpenAI-compatible)
    pub api_url: String,
    /// Model name sent with each request
    pub model: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// First backoff delay in seconds, doubled on each retry
    pub initial_backoff_secs: u64,
    /// Replies shorter than this (trimmed) count as failures
    pub min_reply_chars: usize,
    /// Append a server summary to the first authoring prompt
    pub include_server_info: bool,
    /// Idle authoring sessions are closed after this many seconds
    pub session_idle_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 30,
            max_retries: 2,
            initial_backoff_secs: 2,
            min_reply_chars: 5,
            include_server_info: true,
            session_idle_secs: 900,
        }
    }
}

/// `[executor]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Minimum time between progress updates, in milliseconds
    pub progress_interval_ms: u64,
    /// Notices kept in the rolling progress window
    pub notice_window: usize,
    /// How long undo buttons stay live, in seconds
    pub undo_confirm_secs: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            progress_interval_ms: 1000,
            notice_window: 5,
            undo_confirm_secs: 300,
        }
    }
}

impl ExecutorConfig {
    /// Progress interval as a [`Duration`].
    #[must_use]
    pub const fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

/// `[maintenance]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Seconds between enabling maintenance and terminating active sessions
    pub grace_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self { grace_secs: 900 }
    }
}

/// Loads configuration from `path`.
///
/// # Errors
/// Returns [`Error::Config`] if the file exists but cannot be read or parsed.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path = path.as_ref();
    tracing::debug!("Attempting to load configuration from: {:?}", path);

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("Config file {:?} not found, using defaults", path);
            return Ok(AppConfig::default());
        }
        Err(e) => {
            return Err(Error::Config {
                message: format!("Failed to read config file {}: {e}", path.display()),
            });
        }
    };

    toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse {}: {e}", path.display()),
    })
}

/// Loads configuration from `$OSIRIS_CONFIG`, or `./config.toml` if unset.
pub fn load_default_config() -> Result<AppConfig> {
    let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| "config.toml".to_string());
    load_config(path)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::{config::tiers::Budget, core::tier::Tier};
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = load_config("/definitely/not/here.toml").unwrap();
        assert_eq!(config.ai.timeout_secs, 30);
        assert_eq!(config.maintenance.grace_secs, 900);
        assert_eq!(config.executor.progress_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [ai]
            model = "local-model"

            [tiers.Drifter]
            replies = 1
            saves = 0
            cooldown = 30
            "#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.ai.model, "local-model");
        assert_eq!(config.ai.max_retries, 2);
        assert_eq!(config.paths.data_dir, PathBuf::from("data"));

        let drifter = config.tiers.limits(Tier::Drifter);
        assert_eq!(drifter.replies, Budget::Limited(1));
        assert_eq!(drifter.cooldown, 30);
    }

    #[test]
    fn test_malformed_file_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[ai\nmodel = ").unwrap();
        assert!(matches!(load_config(file.path()), Err(Error::Config { .. })));
    }
}
