//! Health polling and active backend election.
//!
//! Every cycle the [`ClusterMonitor`] polls all backends concurrently,
//! waits for every poll to finish, runs [`choose_active_backend`] on the
//! result and, if the winner changed, hands it to each subscriber in turn.
//! Subscribers are fixed before [`ClusterMonitor::run`] consumes the monitor.

pub mod client;
pub mod counters;
pub mod election;

use std::sync::Arc;
use std::time::Duration;

use hyper::StatusCode;
use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

use crate::domain::backend::same_backend;
use crate::domain::Backend;
use crate::server::shutdown_requested;
pub use client::{HealthClient, HealthReply, HttpHealthClient};
pub use counters::DecisionCounters;
pub use election::{choose_active_backend, BackendStatus};

/// The elected backend, or `None` when no backend is healthy.
pub type ActiveBackend = Option<Arc<Backend>>;

/// Poll cadence as a fraction of the healthcheck timeout.
const POLLS_PER_TIMEOUT: u32 = 5;

/// Body served by the Galera agent's status endpoint.
#[derive(Debug, Default, Deserialize)]
struct AgentStatus {
    #[serde(default)]
    healthy: bool,
    #[serde(default)]
    wsrep_local_index: u64,
}

#[derive(Debug)]
enum PollOutcome {
    /// A 200 with a decodable body.
    Answered { healthy: bool, index: u64 },
    /// An HTTP answer that cannot be trusted: non-200 or garbage body.
    Rejected { url: String, reason: String },
    /// No URL produced an HTTP answer.
    Unreachable { errors: Vec<String> },
}

pub struct ClusterMonitor {
    client: Arc<dyn HealthClient>,
    backends: Vec<Arc<Backend>>,
    healthcheck_timeout: Duration,
    subscribers: Vec<mpsc::Sender<ActiveBackend>>,
    use_lowest_index: bool,
    use_tls: bool,
}

impl ClusterMonitor {
    #[must_use]
    pub fn new(
        backends: Vec<Arc<Backend>>,
        client: Arc<dyn HealthClient>,
        healthcheck_timeout: Duration,
        use_lowest_index: bool,
        use_tls: bool,
    ) -> Self {
        Self {
            client,
            backends,
            healthcheck_timeout,
            subscribers: Vec::new(),
            use_lowest_index,
            use_tls,
        }
    }

    /// Add a subscriber for active backend changes. Each receiver holds at
    /// most one undelivered election and the monitor waits for room before
    /// moving on.
    pub fn register_backend_subscriber(&mut self) -> mpsc::Receiver<ActiveBackend> {
        let (tx, rx) = mpsc::channel(1);
        self.subscribers.push(tx);
        rx
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.healthcheck_timeout / POLLS_PER_TIMEOUT
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut statuses: Vec<(Arc<Backend>, BackendStatus)> = self
            .backends
            .iter()
            .map(|backend| (Arc::clone(backend), BackendStatus::default()))
            .collect();
        let mut active: ActiveBackend = None;
        let interval = self.poll_interval();

        tracing::info!(
            backends = statuses.len(),
            interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            use_lowest_index = self.use_lowest_index,
            use_tls = self.use_tls,
            "cluster monitor started"
        );

        loop {
            tokio::select! {
                () = shutdown_requested(&mut shutdown) => break,
                () = tokio::time::sleep(interval) => {}
            }

            tokio::select! {
                () = shutdown_requested(&mut shutdown) => break,
                () = self.poll_cycle(&mut statuses) => {}
            }

            let chosen = choose_active_backend(&statuses, self.use_lowest_index);
            if same_backend(chosen.as_ref(), active.as_ref()) {
                continue;
            }

            tracing::info!(
                from = active.as_ref().map_or("none", |b| b.name()),
                to = chosen.as_ref().map_or("none", |b| b.name()),
                "active backend changed"
            );
            active = chosen;

            if !self.publish(&active, &mut shutdown).await {
                break;
            }
        }

        tracing::info!("cluster monitor stopped");
    }

    async fn publish(&self, active: &ActiveBackend, shutdown: &mut watch::Receiver<bool>) -> bool {
        for subscriber in &self.subscribers {
            tokio::select! {
                result = subscriber.send(active.clone()) => {
                    if result.is_err() {
                        tracing::debug!("backend subscriber has gone away");
                    }
                }
                () = shutdown_requested(shutdown) => return false,
            }
        }
        true
    }

    /// Poll every backend and wait for all of them before touching state.
    async fn poll_cycle(&self, statuses: &mut [(Arc<Backend>, BackendStatus)]) {
        let mut polls = JoinSet::new();
        for (i, (backend, _)) in statuses.iter().enumerate() {
            let client = Arc::clone(&self.client);
            let urls = backend.healthcheck_urls(self.use_tls);
            polls.spawn(async move { (i, query_backend(client.as_ref(), &urls).await) });
        }

        let mut outcomes: Vec<Option<PollOutcome>> = statuses.iter().map(|_| None).collect();
        while let Some(joined) = polls.join_next().await {
            match joined {
                Ok((i, outcome)) => {
                    if let Some(slot) = outcomes.get_mut(i) {
                        *slot = Some(outcome);
                    }
                }
                Err(e) => tracing::error!(error = %e, "health poll task failed"),
            }
        }

        for ((backend, status), outcome) in statuses.iter_mut().zip(outcomes) {
            let outcome = outcome.unwrap_or_else(|| PollOutcome::Unreachable {
                errors: vec!["health poll task failed".into()],
            });
            apply_outcome(backend, status, outcome);
        }
    }
}

impl std::fmt::Debug for ClusterMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterMonitor")
            .field("backends", &self.backends.len())
            .field("subscribers", &self.subscribers.len())
            .field("healthcheck_timeout", &self.healthcheck_timeout)
            .field("use_lowest_index", &self.use_lowest_index)
            .field("use_tls", &self.use_tls)
            .finish_non_exhaustive()
    }
}

/// Walk the URL waterfall. Only a transport failure moves on to the next
/// URL; the first HTTP answer of any kind decides the outcome.
async fn query_backend(client: &dyn HealthClient, urls: &[String]) -> PollOutcome {
    let mut errors = Vec::new();
    for url in urls {
        match client.get(url).await {
            Ok(reply) => return decode_reply(url, &reply),
            Err(e) => errors.push(format!("{url}: {e}")),
        }
    }
    PollOutcome::Unreachable { errors }
}

fn decode_reply(url: &str, reply: &HealthReply) -> PollOutcome {
    if reply.status != StatusCode::OK {
        return PollOutcome::Rejected {
            url: url.to_string(),
            reason: format!("unexpected status {}", reply.status),
        };
    }
    match serde_json::from_slice::<AgentStatus>(&reply.body) {
        Ok(body) => PollOutcome::Answered {
            healthy: body.healthy,
            index: body.wsrep_local_index,
        },
        Err(e) => PollOutcome::Rejected {
            url: url.to_string(),
            reason: format!("malformed status body: {e}"),
        },
    }
}

fn apply_outcome(backend: &Backend, status: &mut BackendStatus, outcome: PollOutcome) {
    let should_log = status.counters.record_dial();

    match outcome {
        PollOutcome::Answered { healthy, index } => {
            status.counters.reset_unhealthy();
            status.index = Some(index);
            status.healthy = healthy;
        }
        PollOutcome::Rejected { url, reason } => {
            // `index` keeps its last answered value for diagnostics; an
            // unhealthy backend is never elected, so it cannot matter.
            status.counters.record_unhealthy();
            status.healthy = false;
            if should_log {
                tracing::error!(
                    backend = backend.name(),
                    url = %url,
                    reason = %reason,
                    consecutive_unhealthy_checks = status.counters.consecutive_unhealthy_checks(),
                    "backend health check rejected"
                );
            }
        }
        PollOutcome::Unreachable { errors } => {
            status.counters.record_unhealthy();
            status.healthy = false;
            if should_log {
                tracing::error!(
                    backend = backend.name(),
                    errors = ?errors,
                    consecutive_unhealthy_checks = status.counters.consecutive_unhealthy_checks(),
                    "backend health check failed"
                );
            }
        }
    }

    if status.healthy {
        backend.set_healthy();
    } else {
        backend.set_unhealthy();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;
    use crate::config::model::BackendConfig;
    use crate::domain::{BoxConn, CopyBridgeFactory, Dialer};
    use crate::error::SwitchboardError;

    struct NoDialer;

    #[async_trait]
    impl Dialer for NoDialer {
        async fn dial(&self, _addr: &str) -> std::io::Result<BoxConn> {
            Err(std::io::ErrorKind::Unsupported.into())
        }
    }

    /// Canned replies keyed by URL. Unknown URLs fail at the transport level.
    #[derive(Default)]
    struct ScriptedClient {
        replies: Mutex<HashMap<String, (StatusCode, String)>>,
        requested: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn reply(&self, url: &str, status: StatusCode, body: &str) {
            self.replies
                .lock()
                .unwrap()
                .insert(url.to_string(), (status, body.to_string()));
        }

        fn requested(&self) -> Vec<String> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HealthClient for ScriptedClient {
        async fn get(&self, url: &str) -> Result<HealthReply, SwitchboardError> {
            self.requested.lock().unwrap().push(url.to_string());
            let reply = self.replies.lock().unwrap().get(url).cloned();
            match reply {
                Some((status, body)) => Ok(HealthReply {
                    status,
                    body: Bytes::from(body),
                }),
                None => Err(SwitchboardError::HttpRequest {
                    source: "connection refused".into(),
                }),
            }
        }
    }

    fn backend(name: &str, host: &str) -> Arc<Backend> {
        Arc::new(Backend::new(
            &BackendConfig {
                name: name.into(),
                host: host.into(),
                port: 3306,
                status_port: 9201,
                status_endpoint: "status".into(),
            },
            Arc::new(NoDialer),
            Arc::new(CopyBridgeFactory),
        ))
    }

    #[tokio::test]
    async fn tls_waterfall_falls_back_on_transport_failure() {
        let client = ScriptedClient::default();
        client.reply(
            "http://10.0.0.1:9200/status",
            StatusCode::OK,
            r#"{"healthy": true, "wsrep_local_index": 2}"#,
        );
        let urls = backend("backend-0", "10.0.0.1").healthcheck_urls(true);

        let outcome = query_backend(&client, &urls).await;

        assert!(matches!(
            outcome,
            PollOutcome::Answered {
                healthy: true,
                index: 2
            }
        ));
        assert_eq!(client.requested().len(), 2);
    }

    #[tokio::test]
    async fn non_200_answer_stops_the_waterfall() {
        let client = ScriptedClient::default();
        client.reply(
            "https://10.0.0.1:9201/status",
            StatusCode::SERVICE_UNAVAILABLE,
            "",
        );
        client.reply(
            "http://10.0.0.1:9200/status",
            StatusCode::OK,
            r#"{"healthy": true}"#,
        );
        let urls = backend("backend-0", "10.0.0.1").healthcheck_urls(true);

        let outcome = query_backend(&client, &urls).await;

        assert!(matches!(outcome, PollOutcome::Rejected { .. }));
        assert_eq!(
            client.requested(),
            vec!["https://10.0.0.1:9201/status".to_string()]
        );
    }

    #[tokio::test]
    async fn every_url_failing_is_unreachable() {
        let client = ScriptedClient::default();
        let urls = backend("backend-0", "10.0.0.1").healthcheck_urls(true);

        let outcome = query_backend(&client, &urls).await;

        assert!(matches!(outcome, PollOutcome::Unreachable { ref errors } if errors.len() == 2));
    }

    #[test]
    fn missing_fields_default() {
        let reply = HealthReply {
            status: StatusCode::OK,
            body: Bytes::from_static(b"{}"),
        };
        assert!(matches!(
            decode_reply("u", &reply),
            PollOutcome::Answered {
                healthy: false,
                index: 0
            }
        ));
    }

    #[test]
    fn malformed_body_is_rejected() {
        let reply = HealthReply {
            status: StatusCode::OK,
            body: Bytes::from_static(b"<html>"),
        };
        assert!(matches!(
            decode_reply("u", &reply),
            PollOutcome::Rejected { .. }
        ));
    }

    #[test]
    fn apply_outcome_updates_backend_and_counters() {
        let backend = backend("backend-0", "10.0.0.1");
        let mut status = BackendStatus::default();

        apply_outcome(
            &backend,
            &mut status,
            PollOutcome::Answered {
                healthy: true,
                index: 1,
            },
        );
        assert!(backend.healthy());
        assert_eq!(status.index, Some(1));

        apply_outcome(
            &backend,
            &mut status,
            PollOutcome::Unreachable { errors: vec![] },
        );
        apply_outcome(
            &backend,
            &mut status,
            PollOutcome::Unreachable { errors: vec![] },
        );
        assert!(!backend.healthy());
        assert_eq!(status.counters.consecutive_unhealthy_checks(), 2);
        assert_eq!(status.counters.dials(), 3);

        apply_outcome(
            &backend,
            &mut status,
            PollOutcome::Rejected {
                url: "http://10.0.0.1:9201/status".into(),
                reason: "malformed status body".into(),
            },
        );
        assert!(!status.healthy);
        // last good index is kept for diagnostics
        assert_eq!(status.index, Some(1));
    }

    #[test]
    fn poll_interval_is_a_fifth_of_the_timeout() {
        let monitor = ClusterMonitor::new(
            vec![],
            Arc::new(ScriptedClient::default()),
            Duration::from_millis(5000),
            true,
            false,
        );
        assert_eq!(monitor.poll_interval(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_only_on_change() {
        let client = Arc::new(ScriptedClient::default());
        client.reply(
            "http://10.0.0.1:9201/status",
            StatusCode::OK,
            r#"{"healthy": true, "wsrep_local_index": 0}"#,
        );
        client.reply(
            "http://10.0.0.2:9201/status",
            StatusCode::OK,
            r#"{"healthy": true, "wsrep_local_index": 1}"#,
        );
        let backends = vec![backend("backend-0", "10.0.0.1"), backend("backend-1", "10.0.0.2")];

        let mut monitor = ClusterMonitor::new(
            backends.clone(),
            client.clone(),
            Duration::from_millis(500),
            true,
            false,
        );
        let mut events = monitor.register_backend_subscriber();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let running = tokio::spawn(monitor.run(shutdown_rx));

        let first = events.recv().await.unwrap();
        assert!(Arc::ptr_eq(first.as_ref().unwrap(), &backends[0]));

        // a few more identical cycles publish nothing
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(events.try_recv().is_err());

        client.reply(
            "http://10.0.0.1:9201/status",
            StatusCode::OK,
            r#"{"healthy": false, "wsrep_local_index": 0}"#,
        );
        let second = events.recv().await.unwrap();
        assert!(Arc::ptr_eq(second.as_ref().unwrap(), &backends[1]));
        assert!(!backends[0].healthy());

        client.reply(
            "http://10.0.0.2:9201/status",
            StatusCode::INTERNAL_SERVER_ERROR,
            "",
        );
        let third = events.recv().await.unwrap();
        assert!(third.is_none());

        shutdown_tx.send_replace(true);
        running.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_the_monitor() {
        let client = Arc::new(ScriptedClient::default());
        client.reply(
            "http://10.0.0.1:9201/status",
            StatusCode::OK,
            r#"{"healthy": true}"#,
        );
        let mut monitor = ClusterMonitor::new(
            vec![backend("backend-0", "10.0.0.1")],
            client.clone(),
            Duration::from_millis(500),
            true,
            false,
        );
        let _events = monitor.register_backend_subscriber();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let running = tokio::spawn(monitor.run(shutdown_rx));

        tokio::time::sleep(Duration::from_secs(1)).await;
        shutdown_tx.send_replace(true);

        tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .unwrap()
            .unwrap();
    }
}
