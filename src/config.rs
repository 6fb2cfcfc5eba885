//! Configuration module for httpmonitor.
//!
//! Targets come either from a YAML file or from a single `--url` flag.
//! Values a target leaves unset are filled from [`TargetDefaults`] before
//! validation.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Results kept per target unless configured otherwise.
pub const DEFAULT_HISTORY_SIZE: usize = 1000;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("name and url are required for all targets (target #{0})")]
    MissingField(usize),
    #[error("target {name}: invalid url {url}")]
    InvalidUrl { name: String, url: String },
    #[error("target {name}: invalid method {method}")]
    InvalidMethod { name: String, method: String },
    #[error("target {0}: interval and timeout must be greater than zero")]
    ZeroDuration(String),
    #[error("duplicate target name {0}")]
    DuplicateName(String),
    #[error("history size must be greater than zero")]
    ZeroHistorySize,
    #[error("no targets configured")]
    NoTargets,
}

/// One monitored endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    /// Desktop notifications for failed (and, with a threshold, slow) checks.
    #[serde(default)]
    pub notification: bool,
    /// Zero disables slow-check notifications.
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub notification_threshold: Duration,
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub interval: Duration,
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
}

impl TargetConfig {
    /// A target with default method, interval and timeout.
    pub fn new(name: &str, url: &str) -> Self {
        let defaults = TargetDefaults::default();
        Self {
            name: name.to_string(),
            url: url.to_string(),
            method: defaults.method,
            body: None,
            username: None,
            password: None,
            token: None,
            notification: false,
            notification_threshold: Duration::ZERO,
            interval: defaults.interval,
            timeout: defaults.timeout,
        }
    }
}

/// Values applied to targets that leave them unset.
#[derive(Debug, Clone)]
pub struct TargetDefaults {
    pub method: String,
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for TargetDefaults {
    fn default() -> Self {
        Self {
            method: "GET".to_string(),
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(2),
        }
    }
}

/// The full monitor configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorConfig {
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
    #[serde(default = "default_history_size")]
    pub history_size: usize,
}

fn default_history_size() -> usize {
    DEFAULT_HISTORY_SIZE
}

impl MonitorConfig {
    /// Load the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// A configuration with one target named after its URL.
    pub fn single(target: TargetConfig) -> Self {
        Self {
            targets: vec![target],
            history_size: DEFAULT_HISTORY_SIZE,
        }
    }

    /// Check required fields, then fill in defaults and validate the result.
    pub fn finalize(mut self, defaults: &TargetDefaults) -> Result<Self, ConfigError> {
        if self.targets.is_empty() {
            return Err(ConfigError::NoTargets);
        }
        if self.history_size == 0 {
            return Err(ConfigError::ZeroHistorySize);
        }

        let mut names = HashSet::new();

        for (i, target) in self.targets.iter_mut().enumerate() {
            if target.name.is_empty() || target.url.is_empty() {
                return Err(ConfigError::MissingField(i));
            }
            if !names.insert(target.name.clone()) {
                return Err(ConfigError::DuplicateName(target.name.clone()));
            }

            if target.method.is_empty() {
                target.method = defaults.method.clone();
            }
            if target.interval.is_zero() {
                target.interval = defaults.interval;
            }
            if target.timeout.is_zero() {
                target.timeout = defaults.timeout;
            }

            validate_target(target)?;
        }

        Ok(self)
    }
}

fn validate_target(target: &TargetConfig) -> Result<(), ConfigError> {
    let valid_url = target
        .url
        .parse::<hyper::Uri>()
        .map(|uri| matches!(uri.scheme_str(), Some("http") | Some("https")) && uri.host().is_some())
        .unwrap_or(false);
    if !valid_url {
        return Err(ConfigError::InvalidUrl {
            name: target.name.clone(),
            url: target.url.clone(),
        });
    }

    if hyper::Method::from_bytes(target.method.as_bytes()).is_err() {
        return Err(ConfigError::InvalidMethod {
            name: target.name.clone(),
            method: target.method.clone(),
        });
    }

    if target.interval.is_zero() || target.timeout.is_zero() {
        return Err(ConfigError::ZeroDuration(target.name.clone()));
    }

    Ok(())
}

/// Durations are written as human strings such as "5s" or "250ms".
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
}
