//! `despacho-observability` — process-wide telemetry bootstrap.

mod tracing_init;

pub use tracing_init::init;
