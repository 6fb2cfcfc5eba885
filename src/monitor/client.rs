//! Per-target monitor client.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use super::notify::{self, Notification, Notifier};
use super::ResultHistory;
use crate::config::TargetConfig;
use crate::probe::{run_traced_request, CheckResult, ProbeError, ProbeRequest, Transport};

/// Owns one target: its transport, its check loop and its history.
pub struct MonitorClient {
    config: TargetConfig,
    request: ProbeRequest,
    transport: Transport,
    history: ResultHistory,
    notifier: Arc<dyn Notifier>,
}

impl MonitorClient {
    /// Build a client, using the ambient proxy configuration.
    pub fn new(
        config: TargetConfig,
        history_capacity: usize,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ProbeError> {
        let transport = Transport::new(&config)?;
        Self::with_transport(config, transport, history_capacity, notifier)
    }

    pub fn with_transport(
        config: TargetConfig,
        transport: Transport,
        history_capacity: usize,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ProbeError> {
        Ok(Self {
            request: ProbeRequest::from_config(&config)?,
            config,
            transport,
            history: ResultHistory::new(history_capacity),
            notifier,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &TargetConfig {
        &self.config
    }

    /// Every retained result, oldest first.
    pub fn history(&self) -> Vec<CheckResult> {
        self.history.snapshot()
    }

    /// Most recent result, or the zero-value result before the first check.
    pub fn latest(&self) -> CheckResult {
        self.history.latest()
    }

    /// Check immediately, then once per interval, forever.
    ///
    /// The next wait only starts after the previous result was appended, so
    /// checks for one target never overlap.
    pub async fn run(self: Arc<Self>) {
        loop {
            self.check().await;
            tokio::time::sleep(self.config.interval).await;
        }
    }

    /// Perform one check and record its result.
    pub async fn check(&self) {
        let started = Instant::now();
        let mut result = CheckResult::started(Utc::now());

        let status_code = run_traced_request(&self.transport, &self.request, &mut result).await;
        result.finalize(started.elapsed(), status_code);

        if result.is_failure() {
            tracing::warn!(
                "Check failed for {}: status {} after {:?}",
                self.config.name,
                result.status_code,
                result.total
            );
        } else {
            tracing::debug!(
                "Check for {}: status {} in {:?}",
                self.config.name,
                result.status_code,
                result.total
            );
        }

        if let Some(kind) = notify::evaluate(&self.config, &result) {
            self.notifier.notify(Notification {
                kind,
                target: self.config.name.clone(),
                status_code: result.status_code,
                total: result.total,
            });
        }

        self.history.append(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::notify::testing::RecordingNotifier;
    use crate::monitor::NotificationKind;
    use crate::probe::ProxySettings;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio_test::assert_ok;

    async fn serve(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    fn client(config: TargetConfig, notifier: Arc<RecordingNotifier>) -> MonitorClient {
        let transport = Transport::with_proxy(&config, ProxySettings::default()).unwrap();
        MonitorClient::with_transport(config, transport, 1000, notifier).unwrap()
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<HeaderMap>>>);

    async fn capture(State(captured): State<Captured>, headers: HeaderMap) -> &'static str {
        captured.0.lock().unwrap().push(headers);
        "ok"
    }

    async fn authorization_headers(config: TargetConfig) -> Vec<String> {
        let captured = Captured::default();
        let addr = serve(Router::new().route("/", get(capture)).with_state(captured.clone())).await;

        let config = TargetConfig {
            url: format!("http://{}/", addr),
            ..config
        };
        let client = client(config, Arc::new(RecordingNotifier::default()));
        client.check().await;
        assert_eq!(client.latest().status_code, 200);

        let captured = captured.0.lock().unwrap();
        assert_eq!(captured.len(), 1);
        captured[0]
            .get_all("authorization")
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_basic_auth_sent() {
        let config = TargetConfig {
            username: Some("user".to_string()),
            password: Some("pass".to_string()),
            ..TargetConfig::new("basic", "http://placeholder")
        };
        assert_eq!(authorization_headers(config).await, vec!["Basic dXNlcjpwYXNz"]);
    }

    #[tokio::test]
    async fn test_bearer_token_sent_without_basic() {
        let config = TargetConfig {
            token: Some("t0ken".to_string()),
            ..TargetConfig::new("bearer", "http://placeholder")
        };
        let headers = authorization_headers(config).await;
        assert_eq!(headers, vec!["Bearer t0ken"]);
        assert!(!headers.iter().any(|h| h.starts_with("Basic")));
    }

    #[tokio::test]
    async fn test_both_credentials_sent() {
        let config = TargetConfig {
            username: Some("user".to_string()),
            password: Some("pass".to_string()),
            token: Some("t0ken".to_string()),
            ..TargetConfig::new("both", "http://placeholder")
        };
        assert_eq!(
            authorization_headers(config).await,
            vec!["Bearer t0ken", "Basic dXNlcjpwYXNz"]
        );
    }

    #[tokio::test]
    async fn test_successful_check_recorded() {
        let addr = serve(Router::new().route("/", get(|| async { "hello" }))).await;
        let client = client(
            TargetConfig::new("ok", &format!("http://{}/", addr)),
            Arc::new(RecordingNotifier::default()),
        );

        assert_eq!(client.latest(), CheckResult::default());
        client.check().await;

        let latest = client.latest();
        assert_eq!(latest.status_code, 200);
        assert!(latest.total >= latest.server_processing + latest.content_transfer);
        assert_eq!(client.history().len(), 1);
        assert_eq!(client.name(), "ok");
    }

    #[tokio::test]
    async fn test_timeout_aborts_request() {
        let router = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                "late"
            }),
        );
        let addr = serve(router).await;
        let config = TargetConfig {
            timeout: Duration::from_secs(1),
            ..TargetConfig::new("slow", &format!("http://{}/slow", addr))
        };
        let client = client(config, Arc::new(RecordingNotifier::default()));

        client.check().await;

        let latest = client.latest();
        assert_eq!(latest.status_code, 0);
        assert!(latest.total >= Duration::from_millis(950), "total {:?}", latest.total);
        assert!(latest.total < Duration::from_secs(2), "total {:?}", latest.total);
        assert_eq!(client.history().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_notification() {
        let router = Router::new().route("/", get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down") }));
        let addr = serve(router).await;
        let notifier = Arc::new(RecordingNotifier::default());
        let config = TargetConfig {
            notification: true,
            ..TargetConfig::new("down", &format!("http://{}/", addr))
        };
        let client = client(config, notifier.clone());

        client.check().await;

        let sent = notifier.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, NotificationKind::CheckFailed);
        assert_eq!(sent[0].target, "down");
        assert_eq!(sent[0].status_code, 503);
        assert_eq!(sent[0].total, client.latest().total);
    }

    #[tokio::test]
    async fn test_slow_notification() {
        let router = Router::new().route(
            "/",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                "slow"
            }),
        );
        let addr = serve(router).await;
        let notifier = Arc::new(RecordingNotifier::default());
        let config = TargetConfig {
            notification: true,
            notification_threshold: Duration::from_millis(100),
            ..TargetConfig::new("slow", &format!("http://{}/", addr))
        };
        let client = client(config, notifier.clone());

        client.check().await;

        let sent = notifier.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, NotificationKind::AboveThreshold);
        assert_eq!(sent[0].status_code, 200);
    }

    #[tokio::test]
    async fn test_slow_failure_only_notifies_failure() {
        let router = Router::new().route(
            "/",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                (StatusCode::SERVICE_UNAVAILABLE, "down")
            }),
        );
        let addr = serve(router).await;
        let notifier = Arc::new(RecordingNotifier::default());
        let config = TargetConfig {
            notification: true,
            notification_threshold: Duration::from_millis(100),
            ..TargetConfig::new("slowdown", &format!("http://{}/", addr))
        };
        let client = client(config, notifier.clone());

        client.check().await;

        let sent = notifier.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, NotificationKind::CheckFailed);
    }

    #[tokio::test]
    async fn test_notifications_disabled() {
        let router = Router::new().route("/", get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }));
        let addr = serve(router).await;
        let notifier = Arc::new(RecordingNotifier::default());
        let client = client(
            TargetConfig::new("quiet", &format!("http://{}/", addr)),
            notifier.clone(),
        );

        client.check().await;

        assert_eq!(client.latest().status_code, 500);
        assert!(notifier.sent.lock().is_empty());
    }

    #[derive(Clone, Default)]
    struct Concurrency {
        in_flight: Arc<AtomicUsize>,
        max_seen: Arc<AtomicUsize>,
        hits: Arc<AtomicUsize>,
    }

    async fn tracked(State(c): State<Concurrency>) -> &'static str {
        let now = c.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        c.max_seen.fetch_max(now, Ordering::SeqCst);
        c.hits.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(40)).await;
        c.in_flight.fetch_sub(1, Ordering::SeqCst);
        "ok"
    }

    #[tokio::test]
    async fn test_loop_checks_never_overlap() {
        let concurrency = Concurrency::default();
        let addr = serve(Router::new().route("/", get(tracked)).with_state(concurrency.clone())).await;
        let config = TargetConfig {
            interval: Duration::from_millis(10),
            ..TargetConfig::new("loop", &format!("http://{}/", addr))
        };
        let client = Arc::new(client(config, Arc::new(RecordingNotifier::default())));

        let task = tokio::spawn(client.clone().run());
        tokio::time::sleep(Duration::from_millis(600)).await;
        task.abort();

        let history = client.history();
        assert!(history.len() >= 3, "only {} checks ran", history.len());
        assert_eq!(concurrency.max_seen.load(Ordering::SeqCst), 1);

        // Each check starts only after the previous one finished.
        for pair in history.windows(2) {
            let previous_end = pair[0].start + chrono::Duration::from_std(pair[0].total).unwrap();
            assert!(pair[1].start >= previous_end);
        }
    }

    #[tokio::test]
    async fn test_first_check_runs_immediately() {
        let addr = serve(Router::new().route("/", get(|| async { "hello" }))).await;
        let config = TargetConfig {
            interval: Duration::from_secs(3600),
            ..TargetConfig::new("eager", &format!("http://{}/", addr))
        };
        let client = Arc::new(client(config, Arc::new(RecordingNotifier::default())));

        let task = tokio::spawn(client.clone().run());
        let waited = tokio::time::timeout(Duration::from_secs(2), async {
            while client.history().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        task.abort();

        assert_ok!(waited);
        assert_eq!(client.history().len(), 1);
    }

    #[test]
    fn test_invalid_target_rejected_at_construction() {
        let config = TargetConfig::new("bad", "not a url");
        let notifier: Arc<dyn Notifier> = Arc::new(RecordingNotifier::default());
        assert!(MonitorClient::new(config, 10, notifier).is_err());
    }
}
