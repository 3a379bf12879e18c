//! Warehouse metric catalogue.
//!
//! Fixed at compile time. Each entry pairs descriptor metadata with the
//! warehouse query that produces its value. Declaration order is the order
//! samples appear in every scrape.

use super::{DescriptorSet, MetricDesc};
use crate::errors::RegistryError;
use crate::repositories::WarehouseCount;

/// Namespace shared by all warehouse metrics.
pub const NAMESPACE: &str = "pvdb";

/// One catalogue row.
#[derive(Debug, Clone, Copy)]
pub struct CatalogueEntry {
    pub subsystem: &'static str,
    pub name: &'static str,
    pub help: &'static str,
    pub query: WarehouseCount,
}

pub const CATALOGUE: [CatalogueEntry; 9] = [
    CatalogueEntry {
        subsystem: "eod",
        name: "daily",
        help: "Number of EOD quotes downloaded today",
        query: WarehouseCount::EodDaily,
    },
    CatalogueEntry {
        subsystem: "eod",
        name: "no_figi",
        help: "Number of EOD quotes with no Composite FIGI",
        query: WarehouseCount::EodNoFigi,
    },
    CatalogueEntry {
        subsystem: "assets",
        name: "new",
        help: "Number of new assets in the last 24 hours",
        query: WarehouseCount::AssetsNew,
    },
    CatalogueEntry {
        subsystem: "assets",
        name: "changed",
        help: "Number of changed assets in the last 24 hours",
        query: WarehouseCount::AssetsChanged,
    },
    CatalogueEntry {
        subsystem: "assets",
        name: "retired",
        help: "Number of retired assets in the last 24 hours",
        query: WarehouseCount::AssetsRetired,
    },
    CatalogueEntry {
        subsystem: "assets",
        name: "no_cusip",
        help: "Number of assets with no CUSIP",
        query: WarehouseCount::AssetsNoCusip,
    },
    CatalogueEntry {
        subsystem: "assets",
        name: "no_figi",
        help: "Number of assets with no Composite FIGI",
        query: WarehouseCount::AssetsNoFigi,
    },
    CatalogueEntry {
        subsystem: "seeking_alpha",
        name: "daily",
        help: "Number of Seeking Alpha ratings in last 24 hours",
        query: WarehouseCount::SeekingAlphaDaily,
    },
    CatalogueEntry {
        subsystem: "zacks_finance",
        name: "daily",
        help: "Number of Zacks Finance records in last 24 hours",
        query: WarehouseCount::ZacksFinanceDaily,
    },
];

impl CatalogueEntry {
    /// Unlabeled gauge descriptor for this entry.
    pub fn descriptor(&self) -> Result<MetricDesc, RegistryError> {
        MetricDesc::gauge(NAMESPACE, self.subsystem, self.name, self.help, &[])
    }
}

/// Build the descriptor set for `entries`, in order.
///
/// # Errors
///
/// Fails on an invalid name or a fully-qualified name collision.
pub fn descriptors(entries: &[CatalogueEntry]) -> Result<DescriptorSet, RegistryError> {
    let descs = entries
        .iter()
        .map(CatalogueEntry::descriptor)
        .collect::<Result<Vec<_>, _>>()?;

    DescriptorSet::new(descs)
}
