//! Health check handler.

use crate::routes::AppState;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

/// Health check response.
///
/// Returned by the `/health` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Exporter health status ("healthy" or "unhealthy").
    ///
    /// Unhealthy only when the database is down and the exporter is
    /// configured to require it.
    pub status: String,

    /// Database connectivity status from the ping.
    pub database: String,
}

/// Health check handler.
///
/// Pings the database and reports the result. Always returns 200 so a
/// monitor can tell a running exporter with an unreachable database from a
/// dead process. Without `require_database` the exporter stays healthy
/// while the database is down, since scrapes still answer with zeros.
///
/// ```json
/// {
///   "status": "healthy",
///   "database": "healthy"
/// }
/// ```
#[instrument(skip_all, name = "pvdb.health.check")]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let database_up = match state.source.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(target: "pvdb.health", error = %e, "Database ping failed");
            false
        }
    };

    Json(HealthResponse {
        status: health_label(database_up || !state.config.require_database).to_string(),
        database: health_label(database_up).to_string(),
    })
}

fn health_label(healthy: bool) -> &'static str {
    if healthy {
        "healthy"
    } else {
        "unhealthy"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "healthy".to_string(),
            database: "unhealthy".to_string(),
        };

        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(
            json,
            serde_json::json!({"status": "healthy", "database": "unhealthy"})
        );
    }

    #[test]
    fn test_health_label() {
        assert_eq!(health_label(true), "healthy");
        assert_eq!(health_label(false), "unhealthy");
    }
}
