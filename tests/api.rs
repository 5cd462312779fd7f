//! Integration tests for the admin API: auth, traffic switch, backend
//! snapshots, health and metrics.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::sync::mpsc;

use switchboard::api::{ClusterApi, ClusterJson, Credentials};
use switchboard::config::model::BackendConfig;
use switchboard::config::ConfigVersion;
use switchboard::domain::{new_backends, BackendJson, BridgeFactory, CopyBridgeFactory, Dialer, TcpDialer};
use switchboard::health::HealthResponse;
use switchboard::server::{self, AppState};

const USER: &str = "admin";
const PASS: &str = "secret";

struct TestServer {
    addr: SocketAddr,
    traffic: mpsc::Receiver<bool>,
    shutdown: tokio::sync::oneshot::Sender<()>,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }
}

async fn start_test_server(with_metrics: bool) -> TestServer {
    let configs = [
        BackendConfig {
            name: "mysql-0".into(),
            host: "192.0.2.10".into(),
            port: 3306,
            status_port: 9200,
            status_endpoint: "api/v1/status".into(),
        },
        BackendConfig {
            name: "mysql-1".into(),
            host: "192.0.2.11".into(),
            port: 3306,
            status_port: 9200,
            status_endpoint: "api/v1/status".into(),
        },
    ];
    let dialer: Arc<dyn Dialer> = Arc::new(TcpDialer);
    let factory: Arc<dyn BridgeFactory> = Arc::new(CopyBridgeFactory);
    let backends = new_backends(&configs, &dialer, &factory);
    backends[0].set_healthy();

    let mut cluster = ClusterApi::new();
    let traffic = cluster.register_traffic_enabled_channel();

    let state = Arc::new(AppState {
        cluster: Arc::new(cluster),
        backends,
        credentials: Credentials {
            username: USER.into(),
            password: PASS.into(),
        },
        metrics: with_metrics.then(|| PrometheusBuilder::new().build_recorder().handle()),
        config_source: "test".into(),
        config_version: ConfigVersion::Hash("test-hash".into()),
        start_time: Instant::now(),
    });

    let router = server::build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (shutdown, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .unwrap();
    });

    TestServer {
        addr,
        traffic,
        shutdown,
    }
}

#[tokio::test]
async fn cluster_requires_basic_auth() {
    let server = start_test_server(false).await;
    let client = reqwest::Client::new();

    let resp = client.get(server.url("/v0/cluster")).send().await.unwrap();
    assert_eq!(resp.status(), 401);
    assert!(resp.headers().contains_key("www-authenticate"));

    let resp = client
        .get(server.url("/v0/cluster"))
        .basic_auth(USER, Some("wrong"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = client
        .get(server.url("/v0/backends"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let _ = server.shutdown.send(());
}

#[tokio::test]
async fn get_cluster_starts_with_traffic_enabled() {
    let server = start_test_server(false).await;

    let cluster: ClusterJson = reqwest::Client::new()
        .get(server.url("/v0/cluster"))
        .basic_auth(USER, Some(PASS))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert!(cluster.traffic_enabled);
    assert!(cluster.active_backend.is_none());
    assert!(cluster.last_updated.is_none());

    let _ = server.shutdown.send(());
}

#[tokio::test]
async fn patch_cluster_toggles_traffic_and_notifies_runners() {
    let mut server = start_test_server(false).await;
    let client = reqwest::Client::new();

    let resp = client
        .patch(server.url("/v0/cluster?trafficEnabled=false&message=maintenance"))
        .basic_auth(USER, Some(PASS))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let cluster: ClusterJson = resp.json().await.unwrap();
    assert!(!cluster.traffic_enabled);
    assert_eq!(cluster.message, "maintenance");
    assert!(cluster.last_updated.is_some());

    let published = tokio::time::timeout(Duration::from_secs(2), server.traffic.recv())
        .await
        .unwrap();
    assert_eq!(published, Some(false));

    let resp = client
        .patch(server.url("/v0/cluster?trafficEnabled=1"))
        .basic_auth(USER, Some(PASS))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let cluster: ClusterJson = resp.json().await.unwrap();
    assert!(cluster.traffic_enabled);
    assert_eq!(server.traffic.recv().await, Some(true));

    let _ = server.shutdown.send(());
}

#[tokio::test]
async fn patch_cluster_rejects_bad_input() {
    let server = start_test_server(false).await;
    let client = reqwest::Client::new();

    for query in ["", "?trafficEnabled=maybe", "?trafficEnabled=false"] {
        let resp = client
            .patch(server.url(&format!("/v0/cluster{query}")))
            .basic_auth(USER, Some(PASS))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "query {query:?}");
    }

    // nothing was recorded
    let cluster: ClusterJson = client
        .get(server.url("/v0/cluster"))
        .basic_auth(USER, Some(PASS))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(cluster.traffic_enabled);
    assert!(cluster.last_updated.is_none());

    let _ = server.shutdown.send(());
}

#[tokio::test]
async fn backends_lists_every_backend() {
    let server = start_test_server(false).await;

    let resp = reqwest::Client::new()
        .get(server.url("/v0/backends"))
        .basic_auth(USER, Some(PASS))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let raw: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(raw[0]["currentSessionCount"], 0);

    let backends: Vec<BackendJson> = serde_json::from_value(raw).unwrap();
    assert_eq!(backends.len(), 2);
    assert_eq!(backends[0].name, "mysql-0");
    assert!(backends[0].healthy);
    assert_eq!(backends[1].host, "192.0.2.11");
    assert!(!backends[1].healthy);

    let _ = server.shutdown.send(());
}

#[tokio::test]
async fn health_is_public() {
    let server = start_test_server(false).await;

    let resp = reqwest::get(server.url("/health")).await.unwrap();
    assert_eq!(resp.status(), 200);

    let health: HealthResponse = resp.json().await.unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.config.source, "test");
    assert_eq!(health.backends.total, 2);
    assert_eq!(health.backends.healthy, 1);
    assert!(health.traffic_enabled);
    assert!(health.active_backend.is_none());

    let _ = server.shutdown.send(());
}

#[tokio::test]
async fn metrics_follow_the_recorder() {
    let enabled = start_test_server(true).await;
    let resp = reqwest::get(enabled.url("/metrics")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let _ = enabled.shutdown.send(());

    let disabled = start_test_server(false).await;
    let resp = reqwest::get(disabled.url("/metrics")).await.unwrap();
    assert_eq!(resp.status(), 404);
    let _ = disabled.shutdown.send(());
}
