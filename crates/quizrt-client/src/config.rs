//! Client configuration and backend factory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use quizrt_core::poller::PollConfig;
use quizrt_core::runner::RunnerConfig;
use quizrt_core::traits::QuizBackend;

use crate::http::{HttpBackend, DEFAULT_TIMEOUT_SECS};

/// Evaluation polling settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_poll_interval() -> u64 {
    1000
}
fn default_max_attempts() -> u32 {
    60
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Top-level quizrt configuration.
///
/// Note: Custom Debug impl masks the API token to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
pub struct QuizrtConfig {
    /// Backend root, e.g. `https://quiz.example.edu`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Sent as `Authorization: Token <api_token>` when set.
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    #[serde(default)]
    pub polling: PollingConfig,
}

impl std::fmt::Debug for QuizrtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuizrtConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "***"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("tick_interval_ms", &self.tick_interval_ms)
            .field("polling", &self.polling)
            .finish()
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_request_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}
fn default_tick_interval() -> u64 {
    1000
}

impl Default for QuizrtConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_token: None,
            request_timeout_secs: default_request_timeout(),
            tick_interval_ms: default_tick_interval(),
            polling: PollingConfig::default(),
        }
    }
}

impl QuizrtConfig {
    /// Runner settings derived from this configuration.
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            tick_interval: Duration::from_millis(self.tick_interval_ms.max(1)),
            polling: PollConfig {
                interval: Duration::from_millis(self.polling.interval_ms),
                max_attempts: self.polling.max_attempts.max(1),
            },
            ..RunnerConfig::default()
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

/// Load config from an explicit path, or search the default locations.
///
/// Search order without a path:
/// 1. `quizrt.toml` in the current directory
/// 2. `~/.config/quizrt/config.toml`
///
/// Environment variable overrides: `QUIZRT_BASE_URL`, `QUIZRT_API_TOKEN`.
pub fn load_config_from(path: Option<&Path>) -> Result<QuizrtConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("quizrt.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            parse_config_str(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => QuizrtConfig::default(),
    };

    if let Ok(url) = std::env::var("QUIZRT_BASE_URL") {
        config.base_url = url;
    }
    if let Ok(token) = std::env::var("QUIZRT_API_TOKEN") {
        config.api_token = Some(token);
    }

    Ok(config)
}

/// Parse a TOML string and resolve `${VAR}` references in its string values.
pub fn parse_config_str(content: &str) -> Result<QuizrtConfig> {
    let mut config: QuizrtConfig = toml::from_str(content)?;
    config.base_url = resolve_env_vars(&config.base_url);
    config.api_token = config
        .api_token
        .as_deref()
        .map(resolve_env_vars)
        .filter(|t| !t.is_empty());
    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("quizrt"))
}

/// Create the backend described by the configuration.
pub fn create_backend(config: &QuizrtConfig) -> Result<Box<dyn QuizBackend>> {
    if config.base_url.trim().is_empty() {
        anyhow::bail!("base_url is not configured");
    }
    Ok(Box::new(HttpBackend::new(
        &config.base_url,
        config.api_token.clone(),
        config.request_timeout_secs,
    )))
}
