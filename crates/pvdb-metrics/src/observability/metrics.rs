//! Exporter self-metrics.
//!
//! The warehouse gauges come from collectors. These metrics describe the
//! exporter itself: they live in a `prometheus_client` registry owned by
//! the collector `Registry` and are encoded after the warehouse families
//! on every scrape.
//!
//! All metrics use the `pvdb_exporter_` prefix. The encoder adds the
//! `_total` suffix to counter samples and `_seconds` to the duration
//! histograms.
//!
//! # Cardinality
//!
//! - `query`: bounded by the warehouse catalogue (9 values)
//! - `reason`: bounded by `QueryError` variants (database, timeout, invalid_result)

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::{Registry, Unit};
use std::time::Duration;

pub const QUERY_DURATION: &str = "pvdb_exporter_query_duration";
pub const QUERY_FAILURES: &str = "pvdb_exporter_query_failures";
pub const QUERY_UP: &str = "pvdb_exporter_query_up";
pub const SCRAPE_DURATION: &str = "pvdb_exporter_scrape_duration";
pub const SCRAPE_FAILED_QUERIES: &str = "pvdb_exporter_scrape_failed_queries";

/// Fast indexed counts up to the default 5 second query timeout.
const QUERY_DURATION_BUCKETS: &[f64] = &[
    0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000,
];

const SCRAPE_DURATION_BUCKETS: &[f64] = &[
    0.010, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
];

/// Labels for per-query metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct QueryLabels {
    /// Catalogue operation name (e.g., "eod_daily")
    pub query: String,
}

/// Labels for the failure counter.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct FailureLabels {
    pub query: String,
    /// Bounded failure reason from `QueryError::reason`
    pub reason: String,
}

/// Handles to every exporter self-metric.
///
/// Cloning shares the underlying metrics, so the collector and the
/// registry record into the same series.
#[derive(Clone, Debug)]
pub struct ExporterMetrics {
    query_duration: Family<QueryLabels, Histogram>,
    query_failures: Family<FailureLabels, Counter>,
    query_up: Family<QueryLabels, Gauge>,
    scrape_duration: Histogram,
    scrape_failed_queries: Gauge,
}

impl Default for ExporterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ExporterMetrics {
    /// Create the metrics without registering them anywhere.
    pub fn new() -> Self {
        Self {
            query_duration: Family::<QueryLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(QUERY_DURATION_BUCKETS.iter().copied())
            }),
            query_failures: Family::default(),
            query_up: Family::default(),
            scrape_duration: Histogram::new(SCRAPE_DURATION_BUCKETS.iter().copied()),
            scrape_failed_queries: Gauge::default(),
        }
    }

    /// Register every metric with `registry`.
    pub fn register(&self, registry: &mut Registry) {
        registry.register_with_unit(
            QUERY_DURATION,
            "Duration of a single warehouse count query",
            Unit::Seconds,
            self.query_duration.clone(),
        );
        registry.register(
            QUERY_FAILURES,
            "Number of failed warehouse count queries",
            self.query_failures.clone(),
        );
        registry.register(
            QUERY_UP,
            "Whether the last execution of a warehouse count query succeeded (1) or failed (0)",
            self.query_up.clone(),
        );
        registry.register_with_unit(
            SCRAPE_DURATION,
            "Duration of a full collection pass",
            Unit::Seconds,
            self.scrape_duration.clone(),
        );
        registry.register(
            SCRAPE_FAILED_QUERIES,
            "Number of warehouse queries that failed during the last collection pass",
            self.scrape_failed_queries.clone(),
        );
    }

    // ========================================================================
    // Query Metrics
    // ========================================================================

    /// Record one warehouse query execution.
    ///
    /// Metric: `pvdb_exporter_query_duration_seconds`, `pvdb_exporter_query_up`,
    /// `pvdb_exporter_query_failures_total`
    /// Labels: `query`, `reason` (failures only)
    ///
    /// `failure` is the bounded failure reason, `None` on success.
    pub fn record_query(&self, query: &str, failure: Option<&str>, duration: Duration) {
        let labels = QueryLabels {
            query: query.to_string(),
        };

        self.query_duration
            .get_or_create(&labels)
            .observe(duration.as_secs_f64());

        match failure {
            None => {
                self.query_up.get_or_create(&labels).set(1);
            }
            Some(reason) => {
                self.query_up.get_or_create(&labels).set(0);
                self.query_failures
                    .get_or_create(&FailureLabels {
                        query: labels.query,
                        reason: reason.to_string(),
                    })
                    .inc();
            }
        }
    }

    // ========================================================================
    // Scrape Metrics
    // ========================================================================

    /// Record a completed gather pass.
    ///
    /// Metric: `pvdb_exporter_scrape_duration_seconds`
    pub fn record_scrape(&self, duration: Duration) {
        self.scrape_duration.observe(duration.as_secs_f64());
    }

    /// Record how many warehouse queries failed in the last collection pass.
    ///
    /// Metric: `pvdb_exporter_scrape_failed_queries`
    pub fn set_failed_queries(&self, failed: usize) {
        self.scrape_failed_queries
            .set(i64::try_from(failed).unwrap_or(i64::MAX));
    }
}
