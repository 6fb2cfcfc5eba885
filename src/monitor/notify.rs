//! Notification policy and delivery.

use std::fmt;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::config::TargetConfig;
use crate::probe::CheckResult;

/// Deadline for a single desktop notification command.
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    CheckFailed,
    AboveThreshold,
}

impl NotificationKind {
    pub fn title(&self) -> &'static str {
        match self {
            NotificationKind::CheckFailed => "Check Failed",
            NotificationKind::AboveThreshold => "Check Above Threshold",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub target: String,
    pub status_code: u16,
    pub total: Duration,
}

impl Notification {
    pub fn title(&self) -> &'static str {
        self.kind.title()
    }

    pub fn message(&self) -> String {
        format!(
            "Name: {}\nStatus Code: {}\nTotal: {:?}",
            self.target, self.status_code, self.total
        )
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, status {}, {:?})",
            self.title(),
            self.target,
            self.status_code,
            self.total
        )
    }
}

/// Decide which notification, if any, a finalized check should fire.
///
/// Failure (no response or 5xx) wins over slowness. A check is slow when its
/// total is strictly above a non-zero threshold.
pub fn evaluate(config: &TargetConfig, result: &CheckResult) -> Option<NotificationKind> {
    if !config.notification {
        return None;
    }

    if result.is_failure() {
        Some(NotificationKind::CheckFailed)
    } else if !config.notification_threshold.is_zero() && result.total > config.notification_threshold {
        Some(NotificationKind::AboveThreshold)
    } else {
        None
    }
}

/// Sink for notifications. Must not block the caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Shows notifications on the local desktop.
///
/// Delivery runs in a detached task; failures are logged and dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    fn notify(&self, notification: Notification) {
        tokio::spawn(async move {
            match tokio::time::timeout(DELIVERY_TIMEOUT, deliver(&notification)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!("Failed to deliver notification {}: {}", notification, e),
                Err(_) => tracing::debug!("Notification {} timed out", notification),
            }
        });
    }
}

async fn deliver(notification: &Notification) -> Result<(), String> {
    let mut command = desktop_command(notification.title(), &notification.message())?;

    let status = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await
        .map_err(|e| e.to_string())?;

    if status.success() {
        Ok(())
    } else {
        Err(format!("notifier exited with {}", status))
    }
}

fn desktop_command(title: &str, message: &str) -> Result<Command, String> {
    if cfg!(target_os = "macos") {
        let script = format!(
            "display notification {} with title {}",
            applescript_string(message),
            applescript_string(title)
        );
        let mut command = Command::new("osascript");
        command.arg("-e").arg(script);
        Ok(command)
    } else if cfg!(unix) {
        let mut command = Command::new("notify-send");
        command.arg(title).arg(message);
        Ok(command)
    } else {
        Err("desktop notifications are not supported on this platform".to_string())
    }
}

fn applescript_string(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}
