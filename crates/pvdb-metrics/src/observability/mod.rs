//! Observability: exporter self-metrics.

pub mod metrics;

pub use metrics::ExporterMetrics;
