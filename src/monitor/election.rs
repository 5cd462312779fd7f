//! Active backend election over one completed poll cycle.

use std::cmp::Ordering;
use std::sync::Arc;

use super::counters::DecisionCounters;
use crate::domain::Backend;

/// What the monitor knows about one backend after its latest poll.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BackendStatus {
    /// `wsrep_local_index` from the last successful poll.
    pub index: Option<u64>,
    pub healthy: bool,
    pub counters: DecisionCounters,
}

/// Pick the healthy backend with the lowest (or highest) index.
///
/// Backends with the same index are ordered by name, in the same direction
/// as the index, so the outcome never depends on config order. A healthy
/// backend with no index yet sorts below every indexed one.
#[must_use]
pub fn choose_active_backend(
    statuses: &[(Arc<Backend>, BackendStatus)],
    use_lowest_index: bool,
) -> Option<Arc<Backend>> {
    let healthy = statuses.iter().filter(|(_, status)| status.healthy);

    let chosen = if use_lowest_index {
        healthy.min_by(|a, b| compare(a, b))
    } else {
        healthy.max_by(|a, b| compare(a, b))
    };

    chosen.map(|(backend, _)| Arc::clone(backend))
}

fn compare(a: &(Arc<Backend>, BackendStatus), b: &(Arc<Backend>, BackendStatus)) -> Ordering {
    a.1.index
        .cmp(&b.1.index)
        .then_with(|| a.0.name().cmp(b.0.name()))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::config::model::BackendConfig;
    use crate::domain::{BoxConn, CopyBridgeFactory, Dialer};

    struct NoDialer;

    #[async_trait]
    impl Dialer for NoDialer {
        async fn dial(&self, _addr: &str) -> std::io::Result<BoxConn> {
            Err(std::io::ErrorKind::Unsupported.into())
        }
    }

    fn backend(name: &str) -> Arc<Backend> {
        Arc::new(Backend::new(
            &BackendConfig {
                name: name.into(),
                host: "127.0.0.1".into(),
                port: 3306,
                status_port: 9201,
                status_endpoint: "status".into(),
            },
            Arc::new(NoDialer),
            Arc::new(CopyBridgeFactory),
        ))
    }

    fn status(index: u64, healthy: bool) -> BackendStatus {
        BackendStatus {
            index: Some(index),
            healthy,
            counters: DecisionCounters::default(),
        }
    }

    fn elected(
        statuses: &[(Arc<Backend>, BackendStatus)],
        use_lowest_index: bool,
    ) -> Option<String> {
        choose_active_backend(statuses, use_lowest_index).map(|b| b.name().to_string())
    }

    #[test]
    fn no_backends_elects_none() {
        assert_eq!(elected(&[], true), None);
        assert_eq!(elected(&[], false), None);
    }

    #[test]
    fn no_healthy_backend_elects_none() {
        let statuses = vec![
            (backend("backend-0"), status(0, false)),
            (backend("backend-1"), status(1, false)),
        ];
        assert_eq!(elected(&statuses, true), None);
    }

    #[test]
    fn single_healthy_backend_wins_under_either_policy() {
        let statuses = vec![
            (backend("backend-0"), status(0, false)),
            (backend("backend-1"), status(1, true)),
            (backend("backend-2"), status(2, false)),
        ];
        assert_eq!(elected(&statuses, true).as_deref(), Some("backend-1"));
        assert_eq!(elected(&statuses, false).as_deref(), Some("backend-1"));
    }

    #[test]
    fn distinct_indices_follow_the_policy() {
        let statuses = vec![
            (backend("backend-0"), status(2, true)),
            (backend("backend-1"), status(0, true)),
            (backend("backend-2"), status(1, true)),
        ];
        assert_eq!(elected(&statuses, true).as_deref(), Some("backend-1"));
        assert_eq!(elected(&statuses, false).as_deref(), Some("backend-0"));
    }

    #[test]
    fn index_ties_break_on_name() {
        let statuses = vec![
            (backend("backend-b"), status(0, true)),
            (backend("backend-a"), status(0, true)),
            (backend("backend-c"), status(0, true)),
        ];
        assert_eq!(elected(&statuses, true).as_deref(), Some("backend-a"));
        assert_eq!(elected(&statuses, false).as_deref(), Some("backend-c"));

        let reversed: Vec<_> = statuses.into_iter().rev().collect();
        assert_eq!(elected(&reversed, true).as_deref(), Some("backend-a"));
        assert_eq!(elected(&reversed, false).as_deref(), Some("backend-c"));
    }

    #[test]
    fn unindexed_backend_sorts_lowest() {
        let statuses = vec![
            (backend("backend-0"), status(0, true)),
            (
                backend("backend-1"),
                BackendStatus {
                    index: None,
                    healthy: true,
                    counters: DecisionCounters::default(),
                },
            ),
        ];
        assert_eq!(elected(&statuses, true).as_deref(), Some("backend-1"));
        assert_eq!(elected(&statuses, false).as_deref(), Some("backend-0"));
    }
}
