//! pvdb-metrics
//!
//! Entry point for the warehouse statistics exporter. Serves `/metrics`
//! for Prometheus and `/health` for liveness checks.

use clap::Parser;
use pvdb_metrics::cli::Cli;
use pvdb_metrics::collector::DbStatsCollector;
use pvdb_metrics::config::Config;
use pvdb_metrics::registry::Registry;
use pvdb_metrics::repositories::{CountSource, PgCountSource};
use pvdb_metrics::routes::{self, AppState};
use pvdb_metrics::telemetry;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        // --help and --version
        Err(e) if e.exit_code() == 0 => {
            e.print()?;
            return Ok(());
        }
        Err(e) => {
            e.print()?;
            std::process::exit(1);
        }
    };

    // Logging depends on configuration, so config errors go to stderr.
    let (config, config_file) = Config::load(&cli.overrides()).map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    telemetry::init(&config.log_level, config.log_json)?;

    info!("Starting pvdb-metrics");
    info!(
        config_file = ?config_file,
        bind_address = %config.bind_address(),
        query_timeout_seconds = config.query_timeout.as_secs(),
        db_max_connections = config.db_max_connections,
        require_database = config.require_database,
        "Configuration loaded successfully"
    );

    let connect_options = config.connect_options()?;
    let pool = connect_pool(&config, connect_options).await?;
    let source: Arc<dyn CountSource> = Arc::new(PgCountSource::new(pool.clone()));

    let mut registry = Registry::new();
    let collector = DbStatsCollector::new(
        Arc::clone(&source),
        config.query_timeout,
        registry.metrics().clone(),
    )
    .map_err(|e| {
        error!("Invalid metric catalogue: {}", e);
        e
    })?;

    registry.register(Arc::new(collector)).map_err(|e| {
        error!("Failed to register collector: {}", e);
        e
    })?;

    let bind_address = config.bind_address();
    let drain = Duration::from_secs(config.drain_seconds);

    let state = Arc::new(AppState {
        registry: Arc::new(registry),
        source,
        config,
    });

    let app = routes::build_routes(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .map_err(|e| {
            error!("Failed to bind {}: {}", bind_address, e);
            e
        })?;

    info!("pvdb-metrics listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(drain))
        .await?;

    pool.close().await;
    info!("pvdb-metrics shutdown complete");

    Ok(())
}

fn pool_options(config: &Config) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(config.query_timeout)
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
}

/// Connect the warehouse pool.
///
/// An unreachable database is fatal only with `require_database`.
/// Otherwise the exporter starts on a lazy pool and reports zeros until
/// the database comes back.
async fn connect_pool(
    config: &Config,
    options: PgConnectOptions,
) -> Result<PgPool, sqlx::Error> {
    info!("Connecting to database...");
    match pool_options(config).connect_with(options.clone()).await {
        Ok(pool) => {
            info!("Database connection established");
            Ok(pool)
        }
        Err(e) if config.require_database => {
            error!("Failed to connect to database: {}", e);
            Err(e)
        }
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            warn!("Continuing without a database connection; metrics will report 0");
            Ok(pool_options(config).connect_lazy_with(options))
        }
    }
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
/// Returns when a shutdown signal is received and drain period is complete.
async fn shutdown_signal(drain: Duration) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    if drain.is_zero() {
        return;
    }

    warn!("Draining connections for {} seconds...", drain.as_secs());
    tokio::time::sleep(drain).await;
    info!("Drain period complete");
}
