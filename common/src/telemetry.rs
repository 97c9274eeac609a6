// Telemetry module for structured logging and metrics

use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize structured logging with JSON formatting
///
/// This function sets up the tracing subscriber with:
/// - JSON formatting for structured logs
/// - Log levels from configuration or environment
pub fn init_logging(log_level: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_target(true)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(json_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;

    tracing::info!(
        log_level = log_level,
        "Structured logging initialized with JSON formatting"
    );

    Ok(())
}

/// Initialize Prometheus metrics exporter
///
/// Registers all engine metrics:
/// - task_dispatched_total: Counter for completed task dispatches
/// - task_failed_total: Counter for failed task dispatches
/// - task_duration_seconds: Histogram for callback execution duration
/// - queue_depth: Gauge for current per-tier queue depth
pub fn init_metrics(metrics_port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid metrics port: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_counter!(
        "task_dispatched_total",
        "Total number of task dispatches that ran to completion"
    );
    describe_counter!("task_failed_total", "Total number of failed task dispatches");
    describe_histogram!(
        "task_duration_seconds",
        "Duration of task callback execution in seconds"
    );
    describe_gauge!("queue_depth", "Current number of tasks queued per tier");

    tracing::info!(
        metrics_port = metrics_port,
        "Prometheus metrics exporter initialized"
    );

    Ok(())
}

/// Record a task dispatch that ran to completion
#[inline]
pub fn record_dispatch(tier: &'static str) {
    counter!("task_dispatched_total", "tier" => tier).increment(1);
}

/// Record a failed task dispatch
#[inline]
pub fn record_dispatch_failure(tier: &'static str, reason: &'static str) {
    counter!("task_failed_total", "tier" => tier, "reason" => reason).increment(1);
}

/// Record the duration of a task callback
#[inline]
pub fn record_task_duration(tier: &'static str, duration_seconds: f64) {
    histogram!("task_duration_seconds", "tier" => tier).record(duration_seconds);
}

/// Update the per-tier queue depth gauge
#[inline]
pub fn update_queue_depth(tier: &'static str, depth: usize) {
    gauge!("queue_depth", "tier" => tier).set(depth as f64);
}
