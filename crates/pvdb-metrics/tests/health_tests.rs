//! Health endpoint integration tests.
//!
//! Tests the `/health` endpoint using the `TestExporterServer` harness.

use pvdb_metrics::handlers::health::HealthResponse;
use pvdb_metrics::repositories::MockCountSource;
use pvdb_test_utils::TestExporterServer;
use std::sync::Arc;

/// Test that health endpoint returns 200 and healthy status.
#[tokio::test]
async fn test_health_endpoint_returns_200() -> Result<(), anyhow::Error> {
    let server = TestExporterServer::spawn(Arc::new(MockCountSource::default())).await?;

    let response = reqwest::get(format!("{}/health", server.url())).await?;

    assert_eq!(response.status(), 200);

    let body: HealthResponse = response.json().await?;
    assert_eq!(body.status, "healthy");
    assert_eq!(body.database, "healthy");

    Ok(())
}

/// Test that an unreachable database is reported, not turned into an error.
///
/// The harness does not set `REQUIRE_DATABASE`, so the exporter itself
/// stays healthy.
#[tokio::test]
async fn test_health_endpoint_database_down() -> Result<(), anyhow::Error> {
    let server = TestExporterServer::spawn(Arc::new(MockCountSource::unavailable())).await?;

    let response = reqwest::get(format!("{}/health", server.url())).await?;

    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "unhealthy");

    Ok(())
}

/// Test that health endpoint returns JSON content type.
#[tokio::test]
async fn test_health_endpoint_returns_json() -> Result<(), anyhow::Error> {
    let server = TestExporterServer::spawn(Arc::new(MockCountSource::default())).await?;

    let response = reqwest::get(format!("{}/health", server.url())).await?;

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok());

    assert!(
        content_type.is_some_and(|ct| ct.contains("application/json")),
        "Expected application/json content type, got {:?}",
        content_type
    );

    Ok(())
}

/// Test that non-existent routes return 404.
#[tokio::test]
async fn test_unknown_route_returns_404() -> Result<(), anyhow::Error> {
    let server = TestExporterServer::spawn(Arc::new(MockCountSource::default())).await?;

    let response = reqwest::get(format!("{}/v1/nonexistent", server.url())).await?;

    assert_eq!(response.status(), 404);

    Ok(())
}
