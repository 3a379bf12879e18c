//! Fail-soft query functions.
//!
//! Each scrape evaluates every catalogue query through `evaluate`. A
//! failed query is logged and reported as `0.0` so one broken table never
//! blocks the remaining metrics or fails the scrape.

use crate::errors::QueryError;
use crate::observability::ExporterMetrics;
use crate::repositories::{CountSource, WarehouseCount};
use std::time::{Duration, Instant};

/// Value reported for a query that failed.
pub const FALLBACK_VALUE: f64 = 0.0;

/// Default upper bound for a single query, including pool acquisition.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Run one count query, bounded by `timeout`.
///
/// # Errors
///
/// Returns `QueryError::Timeout` if the source does not answer within
/// `timeout`, `QueryError::InvalidResult` for a negative count, and the
/// source's own error otherwise.
pub async fn count(
    source: &dyn CountSource,
    query: WarehouseCount,
    timeout: Duration,
) -> Result<f64, QueryError> {
    let count = tokio::time::timeout(timeout, source.count(query))
        .await
        .map_err(|_| QueryError::Timeout(timeout))??;

    if count < 0 {
        return Err(QueryError::InvalidResult(count));
    }

    Ok(count as f64)
}

/// Value of one query evaluation, with whether it fell back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryOutcome {
    pub value: f64,
    pub failed: bool,
}

/// Run one count query, absorbing any failure as `FALLBACK_VALUE`.
///
/// Emits one error log record per failure and updates the query
/// self-metrics either way.
pub async fn evaluate(
    source: &dyn CountSource,
    query: WarehouseCount,
    timeout: Duration,
    metrics: &ExporterMetrics,
) -> QueryOutcome {
    let start = Instant::now();
    let result = count(source, query, timeout).await;
    let duration = start.elapsed();

    match result {
        Ok(value) => {
            metrics.record_query(query.operation(), None, duration);
            QueryOutcome {
                value,
                failed: false,
            }
        }
        Err(e) => {
            metrics.record_query(query.operation(), Some(e.reason()), duration);
            tracing::error!(
                target: "pvdb.queries",
                query = query.operation(),
                error = %e,
                "failed to retrieve {}",
                query.operation()
            );
            QueryOutcome {
                value: FALLBACK_VALUE,
                failed: true,
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::repositories::MockCountSource;
    use std::io;
    use std::sync::{Arc, Mutex};

    /// Shared in-memory log sink.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        (buffer, guard)
    }

    #[tokio::test]
    async fn test_count_converts_to_float() {
        let source = MockCountSource::with_counts([(WarehouseCount::EodDaily, 42)]);

        let value = count(&source, WarehouseCount::EodDaily, DEFAULT_QUERY_TIMEOUT)
            .await
            .unwrap();

        assert_eq!(value, 42.0);
    }

    #[tokio::test]
    async fn test_count_rejects_negative_result() {
        let source = MockCountSource::with_counts([(WarehouseCount::EodDaily, -3)]);

        let result = count(&source, WarehouseCount::EodDaily, DEFAULT_QUERY_TIMEOUT).await;

        assert!(matches!(result, Err(QueryError::InvalidResult(-3))));
    }

    async fn evaluate_value(
        source: &MockCountSource,
        query: WarehouseCount,
        timeout: Duration,
    ) -> f64 {
        evaluate(source, query, timeout, &ExporterMetrics::new())
            .await
            .value
    }

    #[tokio::test]
    async fn test_evaluate_passes_through_success() {
        let source = MockCountSource::with_counts([(WarehouseCount::AssetsNew, 5)]);

        let value =
            evaluate_value(&source, WarehouseCount::AssetsNew, DEFAULT_QUERY_TIMEOUT).await;

        assert_eq!(value, 5.0);
    }

    #[tokio::test]
    async fn test_evaluate_absorbs_database_error() {
        let (logs, _guard) = capture_logs();
        let source = MockCountSource::with_counts([(WarehouseCount::AssetsNew, 5)])
            .failing_on(WarehouseCount::AssetsNew);

        let value =
            evaluate_value(&source, WarehouseCount::AssetsNew, DEFAULT_QUERY_TIMEOUT).await;

        assert_eq!(value, FALLBACK_VALUE);
        let output = logs.contents();
        assert!(output.contains("ERROR"), "{output}");
        assert!(output.contains("failed to retrieve assets_new"), "{output}");
        assert!(output.contains("Database error"), "{output}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_evaluate_absorbs_timeout() {
        let (logs, _guard) = capture_logs();
        let source = MockCountSource::with_counts([(WarehouseCount::ZacksFinanceDaily, 88)])
            .delayed(WarehouseCount::ZacksFinanceDaily, Duration::from_secs(60));

        let value = evaluate_value(
            &source,
            WarehouseCount::ZacksFinanceDaily,
            Duration::from_secs(5),
        )
        .await;

        assert_eq!(value, FALLBACK_VALUE);
        let output = logs.contents();
        assert!(output.contains("Query timed out after 5s"), "{output}");
        assert_eq!(output.matches("failed to retrieve").count(), 1);
    }

    #[tokio::test]
    async fn test_evaluate_flags_fallback() {
        let source = MockCountSource::with_counts([(WarehouseCount::AssetsNoCusip, 0)])
            .failing_on(WarehouseCount::AssetsRetired);
        let metrics = ExporterMetrics::new();

        let real_zero = evaluate(
            &source,
            WarehouseCount::AssetsNoCusip,
            DEFAULT_QUERY_TIMEOUT,
            &metrics,
        )
        .await;
        let fallback = evaluate(
            &source,
            WarehouseCount::AssetsRetired,
            DEFAULT_QUERY_TIMEOUT,
            &metrics,
        )
        .await;

        assert_eq!(
            real_zero,
            QueryOutcome {
                value: 0.0,
                failed: false
            }
        );
        assert_eq!(
            fallback,
            QueryOutcome {
                value: 0.0,
                failed: true
            }
        );
    }

    #[tokio::test]
    async fn test_evaluate_records_failure_reason() {
        let mut registry = prometheus_client::registry::Registry::default();
        let metrics = ExporterMetrics::new();
        metrics.register(&mut registry);
        let source = MockCountSource::with_counts([(WarehouseCount::EodDaily, -1)]);

        evaluate(&source, WarehouseCount::EodDaily, DEFAULT_QUERY_TIMEOUT, &metrics).await;

        let mut text = String::new();
        prometheus_client::encoding::text::encode(&mut text, &registry).unwrap();
        assert!(
            text.contains(
                "pvdb_exporter_query_failures_total{query=\"eod_daily\",reason=\"invalid_result\"} 1\n"
            ),
            "{text}"
        );
        assert!(text.contains("pvdb_exporter_query_up{query=\"eod_daily\"} 0\n"), "{text}");
    }

    #[tokio::test]
    async fn test_evaluate_success_logs_nothing() {
        let (logs, _guard) = capture_logs();
        let source = MockCountSource::with_counts([(WarehouseCount::EodNoFigi, 3)]);

        evaluate_value(&source, WarehouseCount::EodNoFigi, DEFAULT_QUERY_TIMEOUT).await;

        assert!(logs.contents().is_empty());
    }
}
