//! Tracing setup with a log level that can be changed after startup.
//!
//! `RUST_LOG` wins over the configured level whenever it is set.

use std::sync::OnceLock;
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

static LOG_RELOAD_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// Install the global subscriber at `info` (or `RUST_LOG`).
pub fn init_tracing() {
    init_tracing_with_level("info");
}

pub fn init_tracing_with_level(level: &str) {
    let base_filter = rust_log_filter().unwrap_or_else(|| EnvFilter::new(level));

    let (reload_layer, handle) = reload::Layer::new(base_filter);
    let _ = LOG_RELOAD_HANDLE.set(handle);

    let _ = tracing_subscriber::registry()
        .with(reload_layer)
        .with(fmt::layer().with_target(true))
        .try_init();
}

/// Switch to the configured level once the config file has been read.
///
/// An unparsable directive keeps the current filter and is reported.
pub fn apply_logging_level(level: &str) {
    if rust_log_filter().is_some() {
        tracing::debug!("RUST_LOG is set, ignoring configured log level");
        return;
    }
    let filter = match EnvFilter::try_new(level) {
        Ok(filter) => filter,
        Err(e) => {
            tracing::warn!(level = %level, error = %e, "Invalid log level, keeping current filter");
            return;
        }
    };
    if let Some(handle) = LOG_RELOAD_HANDLE.get() {
        if let Err(e) = handle.modify(|f| *f = filter) {
            tracing::warn!(error = %e, "Failed to apply log level");
        }
    }
}

pub fn shutdown_tracing() {
    // The fmt layer writes synchronously; nothing is buffered.
}

fn rust_log_filter() -> Option<EnvFilter> {
    std::env::var_os("RUST_LOG")?;
    EnvFilter::try_from_default_env().ok()
}
