/*!
Observability infrastructure for Podsnap.

This module provides:
- Structured logging setup on top of `tracing-subscriber`
- Prometheus metrics for checkpoints, deletions and session cleanup (behind
  the `metrics` feature)
*/

#[cfg(feature = "metrics")]
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, Registry, TextEncoder};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;
use std::time::Duration;
use tracing::subscriber::set_global_default;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry as TracingRegistry};

use crate::{Result, SnapshotError};

/// Global metrics instance
#[cfg(feature = "metrics")]
static METRICS: OnceLock<PodsnapMetrics> = OnceLock::new();

/// Metrics collection for snapshot lifecycle operations
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct PodsnapMetrics {
    pub checkpoints_total: Counter,
    pub checkpoint_failures_total: Counter,
    pub checkpoint_timeouts_total: Counter,
    pub checkpoint_duration_seconds: Histogram,
    pub snapshots_deleted_total: Counter,
    pub deletion_failures_total: Counter,
    pub cleanup_failures_total: Counter,

    registry: Registry,
}

#[cfg(feature = "metrics")]
fn counter(registry: &Registry, name: &str, help: &str) -> Result<Counter> {
    let counter = Counter::new(name, help)
        .map_err(|e| SnapshotError::api(format!("Failed to create {name} metric: {e}")))?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| SnapshotError::api(format!("Failed to register {name}: {e}")))?;
    Ok(counter)
}

#[cfg(feature = "metrics")]
impl PodsnapMetrics {
    fn new() -> Result<Self> {
        let registry = Registry::new();

        let checkpoint_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "podsnap_checkpoint_duration_seconds",
                "Time from trigger creation to a terminal checkpoint state",
            )
            .buckets(vec![1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        )
        .map_err(|e| {
            SnapshotError::api(format!(
                "Failed to create checkpoint_duration_seconds metric: {e}"
            ))
        })?;
        registry
            .register(Box::new(checkpoint_duration_seconds.clone()))
            .map_err(|e| {
                SnapshotError::api(format!("Failed to register checkpoint_duration_seconds: {e}"))
            })?;

        Ok(Self {
            checkpoints_total: counter(
                &registry,
                "podsnap_checkpoints_total",
                "Checkpoints that completed successfully",
            )?,
            checkpoint_failures_total: counter(
                &registry,
                "podsnap_checkpoint_failures_total",
                "Checkpoints the controller reported as failed",
            )?,
            checkpoint_timeouts_total: counter(
                &registry,
                "podsnap_checkpoint_timeouts_total",
                "Checkpoints that missed their deadline",
            )?,
            checkpoint_duration_seconds,
            snapshots_deleted_total: counter(
                &registry,
                "podsnap_snapshots_deleted_total",
                "PodSnapshot resources deleted",
            )?,
            deletion_failures_total: counter(
                &registry,
                "podsnap_deletion_failures_total",
                "PodSnapshot deletions that failed",
            )?,
            cleanup_failures_total: counter(
                &registry,
                "podsnap_cleanup_failures_total",
                "Session cleanup deletions that failed and were suppressed",
            )?,
            registry,
        })
    }

    /// Get or initialize global metrics instance
    pub fn global() -> &'static PodsnapMetrics {
        METRICS.get_or_init(|| Self::new().expect("Failed to initialize Podsnap metrics"))
    }

    /// Gather metrics in Prometheus text format
    pub fn gather_metrics(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| SnapshotError::api(format!("Failed to encode metrics: {e}")))?;

        String::from_utf8(buffer)
            .map_err(|e| SnapshotError::api(format!("Failed to convert metrics to string: {e}")))
    }
}

/// Terminal outcome of a checkpoint, for metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointResult {
    Succeeded,
    Failed,
    TimedOut,
}

/// Record a finished checkpoint
pub fn record_checkpoint(result: CheckpointResult, duration: Duration) {
    #[cfg(feature = "metrics")]
    {
        let metrics = PodsnapMetrics::global();
        metrics
            .checkpoint_duration_seconds
            .observe(duration.as_secs_f64());
        match result {
            CheckpointResult::Succeeded => metrics.checkpoints_total.inc(),
            CheckpointResult::Failed => metrics.checkpoint_failures_total.inc(),
            CheckpointResult::TimedOut => metrics.checkpoint_timeouts_total.inc(),
        }
    }
    #[cfg(not(feature = "metrics"))]
    let _ = (result, duration);
}

/// Record the outcome of a snapshot deletion batch
pub fn record_deletions(deleted: usize, failed: usize) {
    #[cfg(feature = "metrics")]
    {
        let metrics = PodsnapMetrics::global();
        metrics.snapshots_deleted_total.inc_by(deleted as f64);
        metrics.deletion_failures_total.inc_by(failed as f64);
    }
    #[cfg(not(feature = "metrics"))]
    let _ = (deleted, failed);
}

/// Record suppressed cleanup failures
pub fn record_cleanup_failures(failed: usize) {
    #[cfg(feature = "metrics")]
    PodsnapMetrics::global()
        .cleanup_failures_total
        .inc_by(failed as f64);
    #[cfg(not(feature = "metrics"))]
    let _ = failed;
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

/// Initialize the global tracing subscriber
///
/// `RUST_LOG` takes precedence; otherwise `default_level` applies to
/// Podsnap's own crates.
pub fn init_observability(format: LogFormat, default_level: &str) -> Result<()> {
    #[cfg(feature = "metrics")]
    PodsnapMetrics::global();

    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(format!(
            "warn,podsnap_core={default_level},podsnap_poll={default_level},podsnap={default_level}"
        ))
    });
    let filter = filter
        .map_err(|e| SnapshotError::validation(format!("Invalid log filter: {e}")))?;

    let result = match format {
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_target(false)
                .with_current_span(false)
                .with_writer(std::io::stderr);
            set_global_default(TracingRegistry::default().with(filter).with(fmt_layer))
        }
        LogFormat::Plain => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr);
            set_global_default(TracingRegistry::default().with(filter).with(fmt_layer))
        }
    };
    result.map_err(|e| {
        SnapshotError::validation(format!("Failed to set global tracing subscriber: {e}"))
    })?;

    tracing::debug!("Podsnap observability initialized");
    Ok(())
}

/// Initialize observability with default settings
pub fn init_default_observability() -> Result<()> {
    init_observability(LogFormat::Plain, "info")
}
