//! Signwall Telemetry - Observability Infrastructure
//!
//! JSON structured logging through tracing-subscriber and Prometheus metrics
//! exposed on `/metrics`.

pub mod metrics;
pub mod middleware;
pub mod tracer;

pub use metrics::{metrics, metrics_handler, SignwallMetrics, METRICS};
pub use middleware::observability_middleware;
pub use tracer::{init_tracing, TelemetryConfig};
