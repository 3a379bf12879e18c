//! Collector registry.
//!
//! Accepts collector registration, validates that no two collectors declare
//! the same metric, and runs one gather pass per scrape. The gather pass
//! only emits families for declared descriptors.
//!
//! The registry also owns the exporter self-metrics and the
//! `prometheus_client` registry they are encoded from.

use crate::collector::{Collector, MetricDesc, Sample};
use crate::errors::RegistryError;
use crate::observability::ExporterMetrics;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// A descriptor and the samples produced for it in one gather pass.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub desc: Arc<MetricDesc>,
    pub samples: Vec<Sample>,
}

/// Set of registered collectors.
pub struct Registry {
    collectors: Vec<Arc<dyn Collector>>,
    names: HashSet<String>,
    metrics: ExporterMetrics,
    self_metrics: prometheus_client::registry::Registry,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        let metrics = ExporterMetrics::new();
        let mut self_metrics = prometheus_client::registry::Registry::default();
        metrics.register(&mut self_metrics);

        Self {
            collectors: Vec::new(),
            names: HashSet::new(),
            metrics,
            self_metrics,
        }
    }

    /// Self-metric handles to share with collectors.
    pub fn metrics(&self) -> &ExporterMetrics {
        &self.metrics
    }

    /// Registry holding the exporter self-metrics.
    pub fn self_metrics(&self) -> &prometheus_client::registry::Registry {
        &self.self_metrics
    }

    /// Register a collector.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::DuplicateDescriptor` if any descriptor of
    /// `collector` shares its name with one already registered (or with
    /// another of its own). The registry is left unchanged on error.
    pub fn register(&mut self, collector: Arc<dyn Collector>) -> Result<(), RegistryError> {
        let mut incoming = HashSet::new();
        for desc in collector.describe() {
            let name = desc.fq_name();
            if self.names.contains(name) || !incoming.insert(name.to_string()) {
                return Err(RegistryError::DuplicateDescriptor(name.to_string()));
            }
        }

        tracing::debug!(
            target: "pvdb.registry",
            descriptors = incoming.len(),
            "Collector registered"
        );

        self.names.extend(incoming);
        self.collectors.push(collector);
        Ok(())
    }

    /// Every registered descriptor, in registration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &Arc<MetricDesc>> {
        self.collectors.iter().flat_map(|c| c.describe())
    }

    /// Run every collector once and group the samples by descriptor.
    ///
    /// Families come back in registration and declaration order. Samples
    /// for undeclared descriptors are dropped.
    #[instrument(skip_all, name = "pvdb.registry.gather")]
    pub async fn gather(&self) -> Vec<MetricFamily> {
        let start = Instant::now();
        let mut families = Vec::new();

        for collector in &self.collectors {
            let mut index: HashMap<String, usize> = HashMap::new();
            let mut grouped: Vec<MetricFamily> = Vec::new();
            for desc in collector.describe() {
                index.insert(desc.fq_name().to_string(), grouped.len());
                grouped.push(MetricFamily {
                    desc: Arc::clone(desc),
                    samples: Vec::new(),
                });
            }

            for sample in collector.collect().await {
                let name = sample.desc().fq_name();
                match index.get(name).and_then(|&i| grouped.get_mut(i)) {
                    Some(family) => family.samples.push(sample),
                    None => {
                        tracing::warn!(
                            target: "pvdb.registry",
                            metric = %name,
                            "Dropping sample for undeclared descriptor"
                        );
                    }
                }
            }

            for family in &grouped {
                if family.samples.is_empty() {
                    tracing::warn!(
                        target: "pvdb.registry",
                        metric = %family.desc.fq_name(),
                        "Declared descriptor produced no sample"
                    );
                }
            }

            families.extend(grouped);
        }

        self.metrics.record_scrape(start.elapsed());
        families
    }
}
