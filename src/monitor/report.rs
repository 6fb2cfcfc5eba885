//! Periodic status summaries built from the clients' read accessors.

use std::time::Duration;

use super::MonitorClient;

/// One line describing a target's latest check and recent history.
pub fn summary_line(client: &MonitorClient) -> String {
    let history = client.history();
    let Some(latest) = history.last() else {
        return format!("{}: no checks yet", client.name());
    };
    let failures = history.iter().filter(|r| r.is_failure()).count();

    format!(
        "{}: status={} dns={} tcp={} tls={} server={} transfer={} total={} (failed {}/{})",
        client.name(),
        latest.status_code,
        millis(latest.dns_lookup),
        millis(latest.tcp_connection),
        millis(latest.tls_handshake),
        millis(latest.server_processing),
        millis(latest.content_transfer),
        millis(latest.total),
        failures,
        history.len(),
    )
}

fn millis(d: Duration) -> String {
    format!("{:.2}ms", d.as_secs_f64() * 1000.0)
}
