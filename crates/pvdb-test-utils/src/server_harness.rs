//! Test server harness for HTTP-level testing
//!
//! Provides `TestExporterServer` for spawning real exporter instances in tests.

use pvdb_metrics::collector::DbStatsCollector;
use pvdb_metrics::config::Config;
use pvdb_metrics::registry::Registry;
use pvdb_metrics::repositories::{CountSource, PgCountSource};
use pvdb_metrics::routes::{self, AppState};
use sqlx::PgPool;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Test harness for spawning the exporter in integration tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health() -> Result<(), anyhow::Error> {
///     let server = TestExporterServer::spawn(Arc::new(MockCountSource::default())).await?;
///
///     let response = reqwest::get(format!("{}/health", server.url())).await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestExporterServer {
    addr: SocketAddr,
    config: Config,
    _handle: JoinHandle<()>,
}

impl TestExporterServer {
    /// Spawn a new exporter instance over `source`.
    ///
    /// The server will:
    /// - Register a `DbStatsCollector` over the full catalogue, recording
    ///   into its own self-metrics
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Start the HTTP server in the background
    pub async fn spawn(source: Arc<dyn CountSource>) -> Result<Self, anyhow::Error> {
        let vars = HashMap::from([
            ("SERVER_HOST".to_string(), "127.0.0.1".to_string()),
            ("SERVER_PORT".to_string(), "0".to_string()),
        ]);

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let mut registry = Registry::new();
        let collector = DbStatsCollector::new(
            Arc::clone(&source),
            config.query_timeout,
            registry.metrics().clone(),
        )
        .map_err(|e| anyhow::anyhow!("Failed to create collector: {}", e))?;

        registry
            .register(Arc::new(collector))
            .map_err(|e| anyhow::anyhow!("Failed to register collector: {}", e))?;

        let state = Arc::new(AppState {
            registry: Arc::new(registry),
            source,
            config: config.clone(),
        });

        // Build routes using the exporter's real route builder
        let app = routes::build_routes(state);

        let listener = tokio::net::TcpListener::bind(config.bind_address())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            _handle: handle,
        })
    }

    /// Spawn an exporter backed by a real database pool.
    pub async fn spawn_with_pool(pool: PgPool) -> Result<Self, anyhow::Error> {
        Self::spawn(Arc::new(PgCountSource::new(pool))).await
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// GET /metrics and return the body, failing on a non-200 status.
    pub async fn scrape(&self) -> Result<String, anyhow::Error> {
        let response = reqwest::get(format!("{}/metrics", self.url())).await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Scrape returned {}", status);
        }
        Ok(response.text().await?)
    }

    /// Value of an unlabeled sample in a scrape `body`, if present.
    pub fn sample_value(body: &str, name: &str) -> Option<f64> {
        body.lines()
            .filter(|line| !line.starts_with('#'))
            .find_map(|line| {
                let (metric, value) = line.split_once(' ')?;
                if metric != name {
                    return None;
                }
                value.trim().parse().ok()
            })
    }
}

impl Drop for TestExporterServer {
    fn drop(&mut self) {
        // Abort the HTTP server task so it does not outlive the test.
        self._handle.abort();
    }
}
