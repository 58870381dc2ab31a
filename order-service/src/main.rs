//! Order service HTTP server.
//!
//! Wires the order pipeline to `PostgreSQL`, Redis, `RabbitMQ` and the product
//! service, serves the HTTP API, and shuts down in order:
//!
//! ```text
//! SIGINT/SIGTERM ─► stop accepting HTTP ─► stop consumers ─► drain pipeline ─► close bus
//!                                          └ bounded by SHUTDOWN_TIMEOUT ─┘
//! ```

mod config;

use anyhow::Context;
use axum::{Router, routing::get};
use config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use orderflow_catalog::HttpProductCatalog;
use orderflow_core::bus::MessageBus;
use orderflow_core::redact_url;
use orderflow_postgres::{PoolSettings, PostgresOrderStore};
use orderflow_rabbitmq::ResilientBus;
use orderflow_redis::RedisCache;
use orderflow_runtime::metrics::MetricsRecorder;
use orderflow_runtime::{Collaborators, OrderService, inbound};
use orderflow_web::AppState;
use std::sync::Arc;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "order_service=info,orderflow=info,tower_http=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting order service");

    let config = Config::from_env();
    info!(
        database_url = %redact_url(&config.database.url),
        redis_url = %redact_url(&config.redis.url),
        rabbitmq_url = %redact_url(&config.rabbitmq.url),
        product_service_url = %config.catalog.base_url,
        "Configuration loaded"
    );

    let metrics_server = match config.server.metrics_port {
        Some(port) => Some(start_metrics_server(&config.server.host, port).await?),
        None => None,
    };

    info!("Connecting to order database...");
    let storage = PostgresOrderStore::connect(
        &config.database.url,
        PoolSettings {
            max_connections: config.database.max_connections,
            statement_timeout: config.database.statement_timeout,
        },
    )
    .await
    .context("PostgreSQL connection failed")?;
    storage.migrate().await.context("Schema bootstrap failed")?;

    info!("Connecting to Redis...");
    let cache = RedisCache::connect(&config.redis.url)
        .await
        .context("Redis connection failed")?;

    info!("Connecting to RabbitMQ...");
    let bus = Arc::new(
        ResilientBus::builder()
            .url(&config.rabbitmq.url)
            .exchange(&config.rabbitmq.exchange)
            .service_name(&config.rabbitmq.service_name)
            .reconnect_interval(config.rabbitmq.reconnect_interval)
            .connect()
            .await
            .context("RabbitMQ connection failed")?,
    );
    let shared_bus: Arc<dyn MessageBus> = bus.clone();

    let catalog = HttpProductCatalog::builder()
        .base_url(&config.catalog.base_url)
        .timeout(config.catalog.timeout)
        .build()
        .context("Product catalog client setup failed")?;

    let service = Arc::new(OrderService::start(
        Collaborators::new(
            Arc::new(storage),
            Arc::new(cache),
            Arc::new(catalog),
            Arc::clone(&shared_bus),
        ),
        &config.pipeline,
    ));

    inbound::subscribe(shared_bus.as_ref(), Arc::clone(&service))
        .await
        .context("Failed to subscribe to order.updated")?;
    info!("Subscriptions ready");

    let app = orderflow_web::router(AppState::new(Arc::clone(&service), shared_bus));

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(address = %addr, "Order service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;
    info!("HTTP server stopped");

    if tokio::time::timeout(config.server.shutdown_timeout, service.close())
        .await
        .is_err()
    {
        warn!(
            timeout_secs = config.server.shutdown_timeout.as_secs(),
            "Pipeline did not drain before the shutdown timeout"
        );
    }

    if let Err(e) = bus.close().await {
        error!(error = %e, "Failed to close message bus");
    }

    if let Some(handle) = metrics_server {
        handle.abort();
    }

    info!("Order service stopped");
    Ok(())
}

/// Install the Prometheus recorder and serve `/metrics` on its own port.
async fn start_metrics_server(host: &str, port: u16) -> anyhow::Result<JoinHandle<()>> {
    let mut recorder = MetricsRecorder::new();
    recorder.install().context("Failed to install metrics recorder")?;
    let handle = recorder
        .handle()
        .context("Metrics recorder was not installed")?;

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind metrics listener {addr}"))?;
    info!(address = %addr, "Metrics endpoint listening");

    let app = Router::new().route("/metrics", get(move || render_metrics(handle.clone())));
    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Metrics server failed");
        }
    }))
}

#[allow(clippy::unused_async)]
async fn render_metrics(handle: PrometheusHandle) -> String {
    handle.render()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
