//! Prometheus metrics for the order pipeline.
//!
//! Components record through the small recorder types below; the binary
//! decides whether a Prometheus recorder is installed at all. Without one,
//! the `metrics` macros are no-ops.
//!
//! # Example
//!
//! ```rust,no_run
//! use orderflow_runtime::metrics::MetricsRecorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut recorder = MetricsRecorder::new();
//! recorder.install()?;
//! let _text = recorder.render();
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, gauge, histogram};

/// Label value for the outbound event queue.
pub const QUEUE_PUBLISH: &str = "publish";

/// Label value for the cache invalidation queue.
pub const QUEUE_INVALIDATION: &str = "invalidation";

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder handle.
///
/// Installing is process-global; a second install is logged and ignored.
#[derive(Default)]
pub struct MetricsRecorder {
    handle: Option<PrometheusHandle>,
}

impl MetricsRecorder {
    /// Create an uninstalled recorder
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Describe all pipeline metrics and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError`] if the exporter cannot be built or installed.
    pub fn install(&mut self) -> Result<(), MetricsError> {
        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                register_metrics();
                tracing::info!("Prometheus metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Handle for rendering, if this instance installed the recorder.
    #[must_use]
    pub fn handle(&self) -> Option<PrometheusHandle> {
        self.handle.clone()
    }

    /// Render current metrics in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!("orderflow_orders_created_total", "Orders persisted by the orchestrator");
    describe_counter!(
        "orderflow_product_cache_hits_total",
        "Product lookups answered from the cache"
    );
    describe_counter!(
        "orderflow_product_cache_misses_total",
        "Product lookups that went to the catalog"
    );
    describe_histogram!(
        "orderflow_catalog_fetch_duration_seconds",
        "Latency of catalog product fetches"
    );

    describe_counter!("orderflow_events_published_total", "order.created events published");
    describe_counter!(
        "orderflow_event_publish_failures_total",
        "order.created events dropped after a failed publish"
    );
    describe_counter!(
        "orderflow_queue_overflow_total",
        "Submissions handed to a tracked task because the queue was full"
    );
    describe_counter!(
        "orderflow_submissions_rejected_total",
        "Submissions dropped because the pipeline was closing"
    );

    describe_counter!("orderflow_invalidation_flushes_total", "Invalidator flushes with work");
    describe_counter!(
        "orderflow_order_lists_refreshed_total",
        "Order-list cache entries rewritten from storage"
    );
    describe_histogram!(
        "orderflow_invalidation_flush_duration_seconds",
        "Time taken by one invalidator flush"
    );

    describe_counter!(
        "orderflow_bus_reconnect_attempts_total",
        "Dials made by the bus client after a connection loss"
    );

    describe_counter!("orderflow_inbound_updates_applied_total", "order.updated events applied");
    describe_counter!(
        "orderflow_inbound_updates_dropped_total",
        "Malformed order.updated events dropped"
    );
}

/// Orchestrator metrics recorder.
pub struct OrderMetrics;

impl OrderMetrics {
    /// Record a persisted order.
    pub fn record_created() {
        counter!("orderflow_orders_created_total").increment(1);
    }

    /// Record a product cache hit.
    pub fn record_cache_hit() {
        counter!("orderflow_product_cache_hits_total").increment(1);
    }

    /// Record a product cache miss and the catalog fetch it caused.
    pub fn record_cache_miss(fetch: Duration) {
        counter!("orderflow_product_cache_misses_total").increment(1);
        histogram!("orderflow_catalog_fetch_duration_seconds").record(fetch.as_secs_f64());
    }
}

/// Queue and publisher metrics recorder.
pub struct PipelineMetrics;

impl PipelineMetrics {
    /// Record a published event.
    pub fn record_published() {
        counter!("orderflow_events_published_total").increment(1);
    }

    /// Record a dropped publish.
    pub fn record_publish_failure() {
        counter!("orderflow_event_publish_failures_total").increment(1);
    }

    /// Record a full-queue fallback.
    pub fn record_overflow(queue: &'static str) {
        counter!("orderflow_queue_overflow_total", "queue" => queue).increment(1);
    }

    /// Record a submission rejected during shutdown.
    pub fn record_rejected(queue: &'static str) {
        counter!("orderflow_submissions_rejected_total", "queue" => queue).increment(1);
    }
}

/// Invalidator metrics recorder.
pub struct InvalidationMetrics;

impl InvalidationMetrics {
    /// Record a flush covering `products` dirty product ids.
    pub fn record_flush(products: usize, duration: Duration) {
        counter!("orderflow_invalidation_flushes_total").increment(1);
        counter!("orderflow_order_lists_refreshed_total").increment(products as u64);
        histogram!("orderflow_invalidation_flush_duration_seconds").record(duration.as_secs_f64());
    }
}

/// Inbound handler metrics recorder.
pub struct InboundMetrics;

impl InboundMetrics {
    /// Record an applied status update.
    pub fn record_applied() {
        counter!("orderflow_inbound_updates_applied_total").increment(1);
    }

    /// Record a dropped malformed update.
    pub fn record_dropped() {
        counter!("orderflow_inbound_updates_dropped_total").increment(1);
    }
}
