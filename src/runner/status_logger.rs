//! Periodic cluster status line.
//!
//! The [`StatusLogger`] follows elections on its own subscription, keeps a
//! [`FailoverTracker`], and on every tick emits one structured event built
//! from a [`StatusReport`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::sync::{mpsc, watch};

use crate::domain::backend::same_backend;
use crate::domain::Backend;
use crate::monitor::ActiveBackend;
use crate::server::shutdown_requested;

/// The most recent failover. Never cleared once set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailoverRecord {
    pub at: DateTime<Utc>,
    pub from: String,
    pub count: u64,
}

#[derive(Debug, Default)]
pub struct FailoverTracker {
    active: ActiveBackend,
    last: Option<FailoverRecord>,
}

impl FailoverTracker {
    /// Record a new election. Replacing a non-empty active backend with
    /// anything else, including nothing, counts as a failover.
    pub fn observe(&mut self, next: ActiveBackend, now: DateTime<Utc>) {
        if let Some(previous) = self.active.as_ref() {
            if !same_backend(Some(previous), next.as_ref()) {
                let count = self.last.as_ref().map_or(0, |r| r.count) + 1;
                self.last = Some(FailoverRecord {
                    at: now,
                    from: previous.name().to_string(),
                    count,
                });
            }
        }
        self.active = next;
    }

    #[must_use]
    pub fn active(&self) -> &ActiveBackend {
        &self.active
    }

    #[must_use]
    pub fn last_failover(&self) -> Option<&FailoverRecord> {
        self.last.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub total_backends: usize,
    pub healthy_backends: usize,
    pub unhealthy_backends: Vec<String>,
    pub total_connections: usize,
    pub active_backend: String,
    pub failover: Option<FailoverRecord>,
}

impl StatusReport {
    #[must_use]
    pub fn collect(backends: &[Arc<Backend>], tracker: &FailoverTracker) -> Self {
        let mut healthy_backends = 0;
        let mut unhealthy_backends = Vec::new();
        let mut total_connections = 0;

        for backend in backends {
            let snapshot = backend.as_json();
            total_connections += snapshot.current_session_count;
            if snapshot.healthy {
                healthy_backends += 1;
            } else {
                unhealthy_backends.push(snapshot.name);
            }
        }

        Self {
            total_backends: backends.len(),
            healthy_backends,
            unhealthy_backends,
            total_connections,
            active_backend: tracker
                .active()
                .as_ref()
                .map_or_else(|| "none".to_string(), |b| b.name().to_string()),
            failover: tracker.last_failover().cloned(),
        }
    }

    pub fn emit(&self) {
        let unhealthy = (!self.unhealthy_backends.is_empty())
            .then(|| tracing::field::debug(&self.unhealthy_backends));
        let last_failover_at = self
            .failover
            .as_ref()
            .map(|f| f.at.to_rfc3339_opts(SecondsFormat::Secs, true));

        tracing::info!(
            total_backends = self.total_backends,
            healthy_backends = self.healthy_backends,
            unhealthy_backends = unhealthy,
            total_connections = self.total_connections,
            active_backend = self.active_backend.as_str(),
            total_failovers = self.failover.as_ref().map(|f| f.count),
            last_failover_at = last_failover_at.as_deref(),
            last_failover_from = self.failover.as_ref().map(|f| f.from.as_str()),
            "status update"
        );
    }
}

pub struct StatusLogger {
    backends: Vec<Arc<Backend>>,
    active_backends: mpsc::Receiver<ActiveBackend>,
    interval: Duration,
}

impl StatusLogger {
    #[must_use]
    pub fn new(
        backends: Vec<Arc<Backend>>,
        active_backends: mpsc::Receiver<ActiveBackend>,
        interval: Duration,
    ) -> Self {
        Self {
            backends,
            active_backends,
            interval,
        }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            backend_count = self.backends.len(),
            "status logger starting"
        );

        let mut tracker = FailoverTracker::default();
        let start = tokio::time::Instant::now() + self.interval;
        let mut ticker = tokio::time::interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = shutdown_requested(&mut shutdown) => break,
                Some(next) = self.active_backends.recv() => tracker.observe(next, Utc::now()),
                _ = ticker.tick() => StatusReport::collect(&self.backends, &tracker).emit(),
            }
        }

        tracing::info!("status logger received shutdown signal");
    }
}

impl std::fmt::Debug for StatusLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusLogger")
            .field("backends", &self.backends.len())
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}
