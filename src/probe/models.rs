//! Check result types.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Outcome of a single check against a target.
///
/// Created with zero-valued phases when the check starts, filled in by the
/// request tracer, and finalized exactly once when the check ends. A
/// `status_code` of 0 means no response was received.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckResult {
    pub start: DateTime<Utc>,
    pub dns_lookup: Duration,
    pub tcp_connection: Duration,
    pub tls_handshake: Duration,
    /// Request fully written until first response byte.
    pub server_processing: Duration,
    /// First response byte until the body was drained.
    pub content_transfer: Duration,
    pub total: Duration,
    pub status_code: u16,
}

impl CheckResult {
    /// A fresh result for a check starting at `start`.
    pub fn started(start: DateTime<Utc>) -> Self {
        Self {
            start,
            ..Default::default()
        }
    }

    /// Set the total duration and status code once the check has ended.
    pub fn finalize(&mut self, total: Duration, status_code: u16) {
        self.total = total;
        self.status_code = status_code;
    }

    /// No response, or a 5xx response.
    pub fn is_failure(&self) -> bool {
        self.status_code == 0 || self.status_code >= 500
    }
}
