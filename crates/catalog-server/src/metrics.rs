//! Prometheus exporter for the cache metrics.
//!
//! The cache records through the `metrics` facade; this module installs the
//! recorder those calls land in and renders it for `/metrics`.

use catalog_cache::metrics::names;
use metrics::{Unit, describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder.
///
/// Returns `false` if a recorder was already installed (by this process or
/// another library), in which case `/metrics` renders nothing.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        return false;
    }

    let handle = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Prometheus recorder");
            return false;
        }
    };
    if PROMETHEUS_HANDLE.set(handle).is_err() {
        return false;
    }

    describe_cache_metrics();
    tracing::info!("Prometheus metrics initialized");
    true
}

/// Prometheus text exposition, or `None` before [`init_metrics`].
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(PrometheusHandle::render)
}

fn describe_cache_metrics() {
    describe_counter!(
        names::CACHE_HITS_TOTAL,
        Unit::Count,
        "Lookups answered by a cache tier"
    );
    describe_counter!(
        names::CACHE_MISSES_TOTAL,
        Unit::Count,
        "Lookups answered by neither tier"
    );
    describe_counter!(
        names::CACHE_PROMOTIONS_TOTAL,
        Unit::Count,
        "Remote hits copied into the local tier"
    );
    describe_counter!(
        names::CACHE_TIER_ERRORS_TOTAL,
        Unit::Count,
        "Failed tier operations, degraded to a miss or no-op"
    );
    describe_gauge!(names::CACHE_ENTRIES, "Entries held by a cache tier");
}
