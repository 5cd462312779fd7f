//! `switchboard run`: start the proxy.
//!
//! Loads configuration, builds the backends, wires monitors to their
//! subscribers (proxy runners, status logger, cluster API) and serves
//! until SIGTERM / Ctrl+C. Every long-running piece gets its own task and
//! `component` span, and all of them stop on one shared watch channel.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::api::{ClusterApi, Credentials};
use crate::cli::RunArgs;
use crate::config::model::Config;
use crate::config::{self, ConfigOverrides, ConfigVersion};
use crate::domain::{new_backends, BridgeFactory, CopyBridgeFactory, Dialer, TcpDialer};
use crate::error::SwitchboardError;
use crate::monitor::{ClusterMonitor, HealthClient, HttpHealthClient};
use crate::runner::{BridgeRunner, StatusLogger};
use crate::server::{self, shutdown_requested, AppState};
use crate::{logging, metrics};

fn component(name: &'static str) -> tracing::Span {
    tracing::info_span!("switchboard", component = name)
}

fn socket_addr(config: &Config, port: u16) -> Result<SocketAddr, SwitchboardError> {
    Ok(format!("{}:{port}", config.bind_address).parse()?)
}

async fn bind(config: &Config, port: u16) -> Result<TcpListener, SwitchboardError> {
    let addr = socket_addr(config, port)?;
    Ok(TcpListener::bind(addr).await?)
}

pub async fn execute(args: RunArgs) -> Result<(), SwitchboardError> {
    let log_format = logging::resolve_format(args.pretty, args.json);
    logging::init(&args.log_level, log_format);

    #[cfg(feature = "sentry-integration")]
    let _sentry_guard = args
        .sentry_dsn
        .as_ref()
        .map(|dsn| crate::sentry_integration::init(dsn, args.sentry_environment.as_deref()));

    let overrides = ConfigOverrides {
        api_username: args.api_username.clone(),
        api_password: args.api_password.clone(),
    };
    let (config, version, path) = config::load(args.config.as_deref(), &overrides).await?;
    for warning in config::validation::warnings(&config) {
        tracing::warn!(%warning, "config warning");
    }

    let metrics = if args.no_metrics {
        None
    } else {
        Some(metrics::install_recorder()?)
    };

    let source = path.display().to_string();
    serve(config, version, source, metrics, server::shutdown_signal()).await
}

/// Run every component until `signal` resolves, then drain and return.
pub async fn serve(
    config: Config,
    version: ConfigVersion,
    config_source: String,
    metrics: Option<metrics_exporter_prometheus::PrometheusHandle>,
    signal: impl std::future::Future<Output = ()>,
) -> Result<(), SwitchboardError> {
    let http_client = server::build_http_client(&config.galera_agent_tls)?;
    let health_client: Arc<dyn HealthClient> = Arc::new(HttpHealthClient::new(
        http_client,
        config.proxy.healthcheck_timeout(),
    ));
    let dialer: Arc<dyn Dialer> = Arc::new(TcpDialer);
    let bridge_factory: Arc<dyn BridgeFactory> = Arc::new(CopyBridgeFactory);

    let backends = new_backends(&config.proxy.backends, &dialer, &bridge_factory);
    let use_tls = config.galera_agent_tls.enabled;
    let timeout = config.proxy.healthcheck_timeout();

    let mut cluster = ClusterApi::new();

    let mut active_monitor = ClusterMonitor::new(
        backends.clone(),
        Arc::clone(&health_client),
        timeout,
        true,
        use_tls,
    );
    let active_runner = BridgeRunner::new(
        active_monitor.register_backend_subscriber(),
        cluster.register_traffic_enabled_channel(),
        config.proxy.shutdown_delay(),
    );
    let status_logger = StatusLogger::new(
        backends.clone(),
        active_monitor.register_backend_subscriber(),
        config.status_log_interval(),
    );
    let cluster_elections = active_monitor.register_backend_subscriber();

    // The inactive pair elects the highest index, so it lands on a
    // secondary node while the active port stays on the primary.
    let inactive = config.proxy.inactive_mysql_port.map(|port| {
        let mut monitor = ClusterMonitor::new(
            backends.clone(),
            Arc::clone(&health_client),
            timeout,
            false,
            use_tls,
        );
        let runner = BridgeRunner::new(
            monitor.register_backend_subscriber(),
            cluster.register_traffic_enabled_channel(),
            Duration::ZERO,
        );
        (port, monitor, runner)
    });

    let cluster = Arc::new(cluster);

    let active_listener = bind(&config, config.proxy.port).await?;
    let inactive = match inactive {
        Some((port, monitor, runner)) => Some((bind(&config, port).await?, monitor, runner)),
        None => None,
    };
    let api_listener = bind(&config, config.api.port).await?;
    let health_listener = match config.health_port {
        Some(port) if port != config.api.port => Some(bind(&config, port).await?),
        _ => None,
    };

    let state = Arc::new(AppState {
        cluster: Arc::clone(&cluster),
        backends: backends.clone(),
        credentials: Credentials {
            username: config.api.username.clone(),
            password: config.api.password.clone(),
        },
        metrics,
        config_source,
        config_version: version,
        start_time: Instant::now(),
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = JoinSet::new();

    tasks.spawn(
        active_monitor
            .run(shutdown_rx.clone())
            .instrument(component("active-monitor")),
    );
    tasks.spawn(
        active_runner
            .run(active_listener, shutdown_rx.clone())
            .instrument(component("active-proxy")),
    );
    tasks.spawn(
        status_logger
            .run(shutdown_rx.clone())
            .instrument(component("status-logger")),
    );
    tasks.spawn(
        Arc::clone(&cluster)
            .listen_for_active_backend(cluster_elections, shutdown_rx.clone())
            .instrument(component("cluster-api")),
    );

    if let Some((listener, monitor, runner)) = inactive {
        tasks.spawn(
            monitor
                .run(shutdown_rx.clone())
                .instrument(component("inactive-monitor")),
        );
        tasks.spawn(
            runner
                .run(listener, shutdown_rx.clone())
                .instrument(component("inactive-proxy")),
        );
    }

    tasks.spawn(
        serve_http(
            api_listener,
            server::build_router(Arc::clone(&state)),
            shutdown_rx.clone(),
        )
        .instrument(component("api")),
    );

    if let Some(listener) = health_listener {
        tasks.spawn(
            serve_http(
                listener,
                server::build_health_router(Arc::clone(&state)),
                shutdown_rx.clone(),
            )
            .instrument(component("health")),
        );
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("SWITCHBOARD_GIT_SHORT"),
        proxy_port = config.proxy.port,
        inactive_proxy_port = config.proxy.inactive_mysql_port,
        api_port = config.api.port,
        health_port = config.health_port,
        backends = backends.len(),
        "switchboard started"
    );

    signal.await;
    shutdown_tx.send_replace(true);

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "component task failed");
        }
    }

    tracing::info!("switchboard stopped");
    Ok(())
}

async fn serve_http(listener: TcpListener, router: axum::Router, mut shutdown: watch::Receiver<bool>) {
    let addr = listener.local_addr().ok();
    tracing::info!(addr = ?addr, "http listening");

    let result = axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown_requested(&mut shutdown).await })
        .await;

    if let Err(e) = result {
        tracing::error!(error = %e, "http server failed");
    }
}
