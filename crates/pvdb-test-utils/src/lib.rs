//! # pvdb-metrics Test Utilities
//!
//! Shared test utilities for the pvdb-metrics exporter.
//!
//! This crate provides:
//! - Server test harness (`TestExporterServer` for HTTP-level tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pvdb_metrics::repositories::{MockCountSource, WarehouseCount};
//! use pvdb_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<(), anyhow::Error> {
//!     let source = MockCountSource::with_counts([(WarehouseCount::EodDaily, 42)]);
//!     let server = TestExporterServer::spawn(Arc::new(source)).await?;
//!
//!     let body = server.scrape().await?;
//!     assert!(body.contains("pvdb_eod_daily 42\n"));
//!     Ok(())
//! }
//! ```

pub mod server_harness;

// Re-export commonly used items
pub use server_harness::*;
