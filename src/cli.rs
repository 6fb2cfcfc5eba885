use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use httpmonitor::config::{TargetConfig, TargetDefaults, DEFAULT_HISTORY_SIZE};

#[derive(Parser, Debug)]
#[command(
    name = "httpmonitor",
    version,
    about = "Monitor HTTP endpoints and break down where request latency goes"
)]
pub(crate) struct Args {
    /// Configuration file (default: ~/.httpmonitor.yaml).
    #[arg(long, env = "HTTPMONITOR_CONFIG")]
    pub(crate) config: Option<PathBuf>,
    /// Monitor a single URL instead of the targets in the configuration file.
    #[arg(long)]
    pub(crate) url: Option<String>,
    /// HTTP method for checks.
    #[arg(long, default_value = "GET")]
    pub(crate) method: String,
    /// Request body for checks.
    #[arg(long)]
    pub(crate) body: Option<String>,
    /// Username for basic authentication.
    #[arg(long)]
    pub(crate) username: Option<String>,
    /// Password for basic authentication.
    #[arg(long)]
    pub(crate) password: Option<String>,
    /// Bearer token.
    #[arg(long)]
    pub(crate) token: Option<String>,
    /// Desktop notifications for failed checks.
    #[arg(long)]
    pub(crate) notification: bool,
    /// Also notify for checks slower than this (0 disables).
    #[arg(long, default_value = "0s", value_parser = humantime::parse_duration)]
    pub(crate) notification_threshold: Duration,
    #[arg(long, default_value = "5s", value_parser = humantime::parse_duration)]
    pub(crate) interval: Duration,
    #[arg(long, default_value = "2s", value_parser = humantime::parse_duration)]
    pub(crate) timeout: Duration,
    /// Results kept per target in single-URL mode.
    #[arg(long, default_value_t = DEFAULT_HISTORY_SIZE)]
    pub(crate) history_size: usize,
    /// How often to log a status line per target.
    #[arg(long, default_value = "5s", value_parser = humantime::parse_duration)]
    pub(crate) report_interval: Duration,
}

impl Args {
    pub(crate) fn defaults(&self) -> TargetDefaults {
        TargetDefaults {
            method: self.method.clone(),
            interval: self.interval,
            timeout: self.timeout,
        }
    }

    /// The target described by the flags, if `--url` was given.
    pub(crate) fn url_target(&self) -> Option<TargetConfig> {
        let url = self.url.as_deref().filter(|u| !u.is_empty())?;

        Some(TargetConfig {
            method: self.method.clone(),
            body: self.body.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            token: self.token.clone(),
            notification: self.notification,
            notification_threshold: self.notification_threshold,
            interval: self.interval,
            timeout: self.timeout,
            ..TargetConfig::new(url, url)
        })
    }

    pub(crate) fn config_path(&self) -> PathBuf {
        if let Some(path) = &self.config {
            return path.clone();
        }
        let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_default();
        home.join(".httpmonitor.yaml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_mode() {
        let args = Args::parse_from([
            "httpmonitor",
            "--url",
            "https://example.com",
            "--token",
            "abc",
            "--interval",
            "10s",
            "--notification-threshold",
            "750ms",
        ]);

        let target = args.url_target().unwrap();
        assert_eq!(target.name, "https://example.com");
        assert_eq!(target.url, "https://example.com");
        assert_eq!(target.method, "GET");
        assert_eq!(target.token.as_deref(), Some("abc"));
        assert_eq!(target.interval, Duration::from_secs(10));
        assert_eq!(target.timeout, Duration::from_secs(2));
        assert_eq!(target.notification_threshold, Duration::from_millis(750));
    }

    #[test]
    fn test_config_mode() {
        let args = Args::parse_from(["httpmonitor", "--config", "/tmp/targets.yaml", "--method", "HEAD"]);
        assert!(args.url_target().is_none());
        assert_eq!(args.config_path(), PathBuf::from("/tmp/targets.yaml"));
        assert_eq!(args.defaults().method, "HEAD");
        assert_eq!(args.history_size, DEFAULT_HISTORY_SIZE);
    }
}
