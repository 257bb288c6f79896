//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

/// Initialize tracing/logging for the process.
///
/// JSON logs, filter configurable via `RUST_LOG` (default `info`). Safe to
/// call multiple times (subsequent calls are no-ops); `service` tags every
/// line so api and worker logs stay distinguishable in shared pipelines.
pub fn init(service: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();

    tracing::info!(service, "telemetry initialized");
}
