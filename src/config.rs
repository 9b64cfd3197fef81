//! Configuration and paths
//!
//! Configuration is read-only: credentials come from `~/.afk/config.json`
//! or the environment, never written back.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default relay endpoint
pub const DEFAULT_API_URL: &str = "https://chatbridge.net";

pub const DEFAULT_SYS_NAME: &str = "AI Agent";

pub const DEFAULT_REMINDER_INTERVAL: &str = "15m";

pub const ENV_API_KEY: &str = "AFK_API_KEY";
pub const ENV_API_URL: &str = "AFK_API_URL";

const CONFIG_DIR: &str = ".afk";
const CONFIG_FILE: &str = "config.json";

/// Output style
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Structured for LLM agents
    #[default]
    Llm,
    /// Pretty output for humans
    Human,
    /// Pure JSON
    Json,
}

/// Stored credentials and settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_key: String,
    pub api_url: String,
    pub sys_name: String,
    /// e.g. "15m", "0" to disable
    pub reminder_interval: String,
    pub format: OutputFormat,
}

impl Config {
    /// Load from the default path with environment overrides
    pub fn load() -> Result<Self> {
        Self::load_with_env(&config_path()?, |key| std::env::var(key).ok())
    }

    /// Load from an explicit path with environment overrides
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    fn load_with_env(path: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_key = env(ENV_API_KEY).filter(|k| !k.is_empty());

        let mut config = if path.exists() {
            let content = fs::read_to_string(path)
                .map_err(|e| Error::Config(format!("failed to read config: {}", e)))?;
            serde_json::from_str::<Config>(&content)
                .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?
        } else if env_key.is_some() {
            debug!("No config at {}, using environment", path.display());
            Config::default()
        } else {
            return Err(Error::Config(format!(
                "not logged in: create {} or set {}",
                path.display(),
                ENV_API_KEY
            )));
        };

        if let Some(key) = env_key {
            config.api_key = key;
        }
        if let Some(url) = env(ENV_API_URL).filter(|u| !u.is_empty()) {
            config.api_url = url;
        }

        if config.api_key.is_empty() {
            return Err(Error::Config("invalid config: missing API key".to_string()));
        }

        config.apply_defaults();
        Ok(config)
    }

    fn apply_defaults(&mut self) {
        if self.api_url.is_empty() {
            self.api_url = DEFAULT_API_URL.to_string();
        }
        if self.sys_name.is_empty() {
            self.sys_name = DEFAULT_SYS_NAME.to_string();
        }
        if self.reminder_interval.is_empty() {
            self.reminder_interval = DEFAULT_REMINDER_INTERVAL.to_string();
        }
    }

    /// Reminder cadence; `None` when disabled
    pub fn reminder(&self) -> Result<Option<Duration>> {
        let interval = parse_duration(&self.reminder_interval)?;
        Ok((!interval.is_zero()).then_some(interval))
    }

    /// Short key prefix safe to print
    pub fn masked_key(&self) -> String {
        let prefix: String = self.api_key.chars().take(16).collect();
        format!("{}...", prefix)
    }
}

/// Full path to the config file
pub fn config_path() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| Error::Config("failed to get home directory".to_string()))?;
    Ok(home.join(CONFIG_DIR).join(CONFIG_FILE))
}

/// Config path for display, even when the home directory is unknown
pub fn display_path() -> String {
    config_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| format!("~/{}/{}", CONFIG_DIR, CONFIG_FILE))
}

static DURATION_PART: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+\.?\d*|\.\d+)(ns|us|µs|μs|ms|s|m|h)").expect("Invalid duration regex")
});

static DURATION_FULL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(?:\d+\.?\d*|\.\d+)(?:ns|us|µs|μs|ms|s|m|h))+$").expect("Invalid duration regex")
});

/// Parse a Go-style duration such as `1h30m`, `.5h`, `90s`, `500ms` or `250us`.
/// `"0"` and the empty string mean zero. Signs are rejected.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let input = input.trim();
    if input.is_empty() || input == "0" {
        return Ok(Duration::ZERO);
    }
    if !DURATION_FULL.is_match(input) {
        return Err(Error::Parse(format!("invalid duration: {:?}", input)));
    }

    let mut total = Duration::ZERO;
    for cap in DURATION_PART.captures_iter(input) {
        let value: f64 = cap[1]
            .parse()
            .map_err(|_| Error::Parse(format!("invalid duration: {:?}", input)))?;
        let unit_nanos = match &cap[2] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1_000.0,
            "ms" => 1_000_000.0,
            "s" => 1_000_000_000.0,
            "m" => 60_000_000_000.0,
            "h" => 3_600_000_000_000.0,
            _ => unreachable!("unit constrained by regex"),
        };
        total += Duration::from_nanos((value * unit_nanos).round() as u64);
    }
    Ok(total)
}
