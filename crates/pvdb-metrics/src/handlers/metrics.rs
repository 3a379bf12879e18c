//! Prometheus scrape endpoint handler.
//!
//! Every request runs one gather pass over the registry. The scrape
//! endpoint is unauthenticated; it exposes counts only, never row data.

use crate::exposition::{self, Format};
use crate::routes::AppState;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

/// Handler for GET /metrics
///
/// Returns the warehouse gauges followed by the exporter's own metrics.
/// The format follows the `Accept` header:
///
/// ```text
/// # HELP pvdb_eod_daily Number of EOD quotes downloaded today
/// # TYPE pvdb_eod_daily gauge
/// pvdb_eod_daily 42.0
/// ```
///
/// Failed queries show up as zero-valued samples, so the response is 200
/// unless the encoder itself fails.
#[tracing::instrument(skip_all, name = "pvdb.metrics.scrape")]
pub async fn metrics_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok());
    let format = Format::negotiate(accept);

    let families = state.registry.gather().await;

    // Encoded after the gather so this scrape's query metrics are included.
    match exposition::encode(families, state.registry.self_metrics(), format) {
        Ok(body) => ([(header::CONTENT_TYPE, format.content_type())], body).into_response(),
        Err(e) => {
            tracing::error!(target: "pvdb.metrics", error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
