//! Command-line interface.

use crate::config::ConfigOverrides;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "pvdb-metrics")]
#[command(about = "Prometheus exporter for pvdb warehouse statistics")]
#[command(version)]
pub struct Cli {
    /// Config file (default: pvdb-metrics.toml in /etc, ~/.config or .)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// PostgreSQL connection URL
    #[arg(short = 'd', long, value_name = "DSN")]
    pub database_url: Option<String>,

    /// Address to bind the HTTP listener to
    #[arg(long)]
    pub host: Option<String>,

    /// Port for the /metrics endpoint
    #[arg(long)]
    pub port: Option<u16>,

    /// Print logs in JSON format
    #[arg(long = "log.json")]
    pub log_json: bool,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Per-query timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub query_timeout: Option<u64>,

    /// Exit if the database cannot be reached at startup
    #[arg(long)]
    pub require_database: bool,
}

impl Cli {
    /// Flags that were actually given, as the top configuration layer.
    ///
    /// Boolean switches only override when set, so `LOG_JSON=true` still
    /// applies when `--log.json` is absent.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            config_file: self.config.clone(),
            database_url: self.database_url.clone(),
            host: self.host.clone(),
            port: self.port,
            log_json: self.log_json.then_some(true),
            log_level: self.log_level.clone(),
            query_timeout_seconds: self.query_timeout,
            require_database: self.require_database.then_some(true),
        }
    }
}
