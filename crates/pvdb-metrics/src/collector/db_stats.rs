//! Warehouse statistics collector.
//!
//! Binds each catalogue descriptor to its warehouse count query. A
//! collection pass runs all queries concurrently against the shared source
//! and returns one unlabeled gauge sample per descriptor, in catalogue
//! order. Failed queries are already absorbed by `queries::evaluate`,
//! so a pass always yields the full set.

use super::catalogue::{self, CatalogueEntry, CATALOGUE};
use super::{Collector, DescriptorSet, MetricDesc, Sample};
use crate::errors::RegistryError;
use crate::observability::ExporterMetrics;
use crate::queries;
use crate::repositories::{CountSource, WarehouseCount};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Collector for the warehouse freshness and quality gauges.
pub struct DbStatsCollector {
    source: Arc<dyn CountSource>,
    descriptors: DescriptorSet,
    /// Query for each descriptor, same index.
    queries: Vec<WarehouseCount>,
    query_timeout: Duration,
    metrics: ExporterMetrics,
}

impl DbStatsCollector {
    /// Create a collector over the full warehouse catalogue.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError` if the catalogue is malformed. Callers treat
    /// this as fatal at startup.
    pub fn new(
        source: Arc<dyn CountSource>,
        query_timeout: Duration,
        metrics: ExporterMetrics,
    ) -> Result<Self, RegistryError> {
        Self::with_catalogue(source, query_timeout, metrics, &CATALOGUE)
    }

    /// Create a collector over an explicit set of catalogue entries.
    pub fn with_catalogue(
        source: Arc<dyn CountSource>,
        query_timeout: Duration,
        metrics: ExporterMetrics,
        entries: &[CatalogueEntry],
    ) -> Result<Self, RegistryError> {
        Ok(Self {
            source,
            descriptors: catalogue::descriptors(entries)?,
            queries: entries.iter().map(|e| e.query).collect(),
            query_timeout,
            metrics,
        })
    }

    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }
}

#[async_trait::async_trait]
impl Collector for DbStatsCollector {
    fn describe(&self) -> std::slice::Iter<'_, Arc<MetricDesc>> {
        self.descriptors.iter()
    }

    #[instrument(skip_all, name = "pvdb.collector.db_stats")]
    async fn collect(&self) -> Vec<Sample> {
        let source = self.source.as_ref();
        let timeout = self.query_timeout;
        let metrics = &self.metrics;

        let passes = self
            .descriptors
            .iter()
            .zip(self.queries.iter().copied())
            .map(|(desc, query)| async move {
                let outcome = queries::evaluate(source, query, timeout, metrics).await;
                (Sample::unlabeled(Arc::clone(desc), outcome.value), outcome.failed)
            });

        let results = join_all(passes).await;

        let failed = results.iter().filter(|(_, failed)| *failed).count();
        self.metrics.set_failed_queries(failed);
        if failed > 0 {
            tracing::warn!(
                target: "pvdb.collector",
                failed,
                total = results.len(),
                "Collection pass completed with failed queries"
            );
        }

        results.into_iter().map(|(sample, _)| sample).collect()
    }
}
