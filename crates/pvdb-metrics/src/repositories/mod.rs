//! Database repositories.

pub mod warehouse_stats;

pub use warehouse_stats::{mock::MockCountSource, CountSource, PgCountSource, WarehouseCount};
