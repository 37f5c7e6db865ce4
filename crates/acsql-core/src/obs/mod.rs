//! Observability: process-local telemetry counters and sink abstractions.
//!
//! Engine code records `MetricsEvent`s through `sink::record`; it never
//! touches the counter state directly.

pub(crate) mod metrics;
pub(crate) mod sink;

// re-exports
pub use metrics::{CollectionCounters, EventOps, EventReport};
pub use sink::{MetricsEvent, MetricsSink, metrics_report, metrics_reset_all, with_metrics_sink};
