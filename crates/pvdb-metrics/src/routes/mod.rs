//! HTTP routes for the exporter.
//!
//! Defines the Axum router and application state.

use crate::config::Config;
use crate::handlers;
use crate::registry::Registry;
use crate::repositories::CountSource;
use axum::{routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Registered collectors, gathered once per scrape, and the exporter
    /// self-metrics.
    pub registry: Arc<Registry>,

    /// Warehouse connection, pinged by the health check.
    pub source: Arc<dyn CountSource>,

    /// Exporter configuration.
    pub config: Config,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/metrics` - Scrape endpoint (one gather pass per request)
/// - `/health` - Health check endpoint (database ping)
/// - TraceLayer for request logging
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>) -> Router {
    let routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .route("/health", get(handlers::health_check))
        .with_state(state);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    routes
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
}
