//! Pull-based metric collection.
//!
//! A `Collector` exposes a fixed set of `MetricDesc`s (describe phase) and,
//! on every scrape, produces exactly one fresh `Sample` per descriptor
//! (collect phase). The `Registry` drives both phases.
//!
//! # Modules
//!
//! - `catalogue` - the warehouse metrics this exporter publishes
//! - `db_stats` - collector binding the catalogue to warehouse queries

pub mod catalogue;
pub mod db_stats;

pub use db_stats::DbStatsCollector;

use crate::errors::RegistryError;
use prometheus_client::metrics::MetricType;
use std::collections::HashSet;
use std::sync::Arc;

/// Separator joining namespace, subsystem and name.
const NAME_SEPARATOR: &str = "_";

/// Kind of value a metric carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// Point-in-time measurement, no monotonicity guarantee.
    Gauge,
}

impl ValueType {
    /// Metric type handed to the exposition encoder.
    pub fn metric_type(&self) -> MetricType {
        match self {
            ValueType::Gauge => MetricType::Gauge,
        }
    }
}

/// Immutable identity and metadata of one exported metric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDesc {
    fq_name: String,
    help: String,
    label_names: Vec<String>,
    value_type: ValueType,
}

impl MetricDesc {
    /// Build a gauge descriptor named `namespace_subsystem_name`.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::InvalidName` if the joined name is not a valid
    /// Prometheus metric name, or `RegistryError::InvalidLabelName` for a bad
    /// label name.
    pub fn gauge(
        namespace: &str,
        subsystem: &str,
        name: &str,
        help: &str,
        label_names: &[&str],
    ) -> Result<Self, RegistryError> {
        let fq_name = fq_name(namespace, subsystem, name);
        if !is_valid_metric_name(&fq_name) {
            return Err(RegistryError::InvalidName(fq_name));
        }

        for label in label_names {
            if !is_valid_label_name(label) {
                return Err(RegistryError::InvalidLabelName {
                    metric: fq_name,
                    label: (*label).to_string(),
                });
            }
        }

        Ok(Self {
            fq_name,
            help: help.to_string(),
            label_names: label_names.iter().map(|l| (*l).to_string()).collect(),
            value_type: ValueType::Gauge,
        })
    }

    pub fn fq_name(&self) -> &str {
        &self.fq_name
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }
}

/// Join non-empty name parts with `_`.
pub fn fq_name(namespace: &str, subsystem: &str, name: &str) -> String {
    [namespace, subsystem, name]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(NAME_SEPARATOR)
}

/// `[a-zA-Z_:][a-zA-Z0-9_:]*`
fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// `[a-zA-Z_][a-zA-Z0-9_]*`, with the `__` prefix reserved.
fn is_valid_label_name(name: &str) -> bool {
    if name.starts_with("__") {
        return false;
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// One value of a metric produced during a single collection pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    desc: Arc<MetricDesc>,
    value: f64,
    label_values: Vec<String>,
}

impl Sample {
    /// Sample for a descriptor without labels.
    pub fn unlabeled(desc: Arc<MetricDesc>, value: f64) -> Self {
        Self {
            desc,
            value,
            label_values: Vec::new(),
        }
    }

    /// Sample carrying one value per label in the descriptor's schema.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::LabelCardinality` when the number of values
    /// does not match the descriptor's label names.
    pub fn labeled(
        desc: Arc<MetricDesc>,
        value: f64,
        label_values: Vec<String>,
    ) -> Result<Self, RegistryError> {
        if label_values.len() != desc.label_names().len() {
            return Err(RegistryError::LabelCardinality {
                metric: desc.fq_name().to_string(),
                expected: desc.label_names().len(),
                actual: label_values.len(),
            });
        }

        Ok(Self {
            desc,
            value,
            label_values,
        })
    }

    pub fn desc(&self) -> &Arc<MetricDesc> {
        &self.desc
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn label_values(&self) -> &[String] {
        &self.label_values
    }

    /// `(name, value)` pairs in schema order.
    pub fn labels(&self) -> impl Iterator<Item = (&str, &str)> {
        self.desc
            .label_names()
            .iter()
            .zip(self.label_values.iter())
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

/// Ordered set of descriptors with unique fully-qualified names.
#[derive(Debug, Clone)]
pub struct DescriptorSet {
    descs: Vec<Arc<MetricDesc>>,
}

impl DescriptorSet {
    /// # Errors
    ///
    /// Returns `RegistryError::DuplicateDescriptor` naming the first
    /// fully-qualified name that appears twice.
    pub fn new(descs: Vec<MetricDesc>) -> Result<Self, RegistryError> {
        let mut seen = HashSet::with_capacity(descs.len());
        for desc in &descs {
            if !seen.insert(desc.fq_name()) {
                return Err(RegistryError::DuplicateDescriptor(
                    desc.fq_name().to_string(),
                ));
            }
        }

        Ok(Self {
            descs: descs.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Arc<MetricDesc>> {
        self.descs.iter()
    }

    pub fn len(&self) -> usize {
        self.descs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descs.is_empty()
    }
}

/// Two-phase pull collection contract.
#[async_trait::async_trait]
pub trait Collector: Send + Sync {
    /// Every descriptor this collector will ever emit. Must not touch the
    /// database and must return the same sequence on every call.
    fn describe(&self) -> std::slice::Iter<'_, Arc<MetricDesc>>;

    /// One sample per described descriptor. Never fails; broken sources
    /// surface as fallback values.
    async fn collect(&self) -> Vec<Sample>;
}
