//! pvdb-metrics Library
//!
//! Prometheus exporter for the pvdb market-data warehouse. Every scrape
//! runs nine count queries against PostgreSQL and reports them as
//! unlabeled gauges:
//!
//! - EOD quote freshness and Composite FIGI coverage
//! - Asset churn (new, changed, retired) and identifier gaps
//! - Seeking Alpha and Zacks Finance ingestion volume
//!
//! A query that fails reports `0` and is logged; the scrape still succeeds.
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> registry.rs -> collector/*.rs
//!     -> queries.rs -> repositories/*.rs
//! ```
//!
//! # Modules
//!
//! - `collector` - Metric descriptors, samples and the `Collector` trait
//! - `config` - Layered configuration (flags, env, TOML file, defaults)
//! - `errors` - Error types
//! - `exposition` - Format negotiation and `prometheus_client` text encoding
//! - `handlers` - HTTP request handlers
//! - `observability` - Exporter self-metrics
//! - `queries` - Timeout-bounded count queries that fall back to zero
//! - `registry` - Collector registration and the per-scrape gather pass
//! - `repositories` - Warehouse count SQL and the `CountSource` seam
//! - `routes` - Axum router setup

pub mod cli;
pub mod collector;
pub mod config;
pub mod errors;
pub mod exposition;
pub mod handlers;
pub mod observability;
pub mod queries;
pub mod registry;
pub mod repositories;
pub mod routes;
pub mod telemetry;
