// src/metrics.rs

#[cfg(feature = "observability")]
pub use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};

// NOTE: When observability feature is disabled, provide stub implementations
#[cfg(not(feature = "observability"))]
pub enum Unit {}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! counter {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
    ($name:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! histogram {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_counter {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_histogram {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
use crate::{counter, describe_counter, describe_histogram, histogram};

/// Registers metric descriptions. Call once at startup.
pub fn describe_metrics() {
    describe_counter!(
        "dlmm_pool_fetch_failures_total",
        Unit::Count,
        "Pools skipped during a wallet sync after retries were exhausted."
    );
    describe_counter!(
        "dlmm_position_skipped_total",
        Unit::Count,
        "Positions skipped during a wallet sync, labeled by reason."
    );
    describe_counter!(
        "dlmm_positions_upserted_total",
        Unit::Count,
        "Position rows written by the reconciler."
    );
    describe_counter!(
        "dlmm_sync_cache_hits_total",
        Unit::Count,
        "Wallet syncs answered from the position cache."
    );
    describe_counter!(
        "dlmm_tx_transitions_total",
        Unit::Count,
        "Transaction state transitions, labeled by phase and state."
    );
    describe_histogram!(
        "dlmm_sync_duration_seconds",
        Unit::Seconds,
        "Wall time of a chain-backed wallet sync."
    );
}

/// Installs the Prometheus exporter on `addr`.
#[cfg(feature = "observability")]
pub fn install_prometheus_exporter(addr: std::net::SocketAddr) -> anyhow::Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    describe_metrics();
    Ok(())
}

/// Installs a `tracing` subscriber honoring `[log]`. Also forwards `log` records.
#[cfg(feature = "observability")]
pub fn init_tracing(log: &crate::settings::LogSettings) -> anyhow::Result<()> {
    let level: tracing::Level = log
        .level
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid log level '{}'", log.level))?;
    let builder = tracing_subscriber::fmt().with_max_level(level);
    let installed = match log.format {
        crate::settings::LogFormat::Json => builder.json().try_init(),
        crate::settings::LogFormat::Pretty => builder.try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))
}

pub fn increment_pool_fetch_failures() {
    counter!("dlmm_pool_fetch_failures_total", 1);
}

pub fn increment_position_skipped(reason: &'static str) {
    counter!("dlmm_position_skipped_total", 1, "reason" => reason);
}

pub fn increment_positions_upserted(count: u64) {
    counter!("dlmm_positions_upserted_total", count);
}

pub fn increment_sync_cache_hit() {
    counter!("dlmm_sync_cache_hits_total", 1);
}

pub fn increment_tx_transition(phase: &'static str, state: &'static str) {
    counter!("dlmm_tx_transitions_total", 1, "phase" => phase, "state" => state);
}

pub fn record_sync_duration(duration: std::time::Duration) {
    histogram!("dlmm_sync_duration_seconds", duration.as_secs_f64());
}
