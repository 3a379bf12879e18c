//! Exporter configuration.
//!
//! Resolved once at startup from four layers, highest precedence first:
//! command-line flags, environment variables, a TOML config file, and
//! built-in defaults. The database URL is redacted in Debug output.
//!
//! The database DSN is either a `postgres://` URL or a libpq keyword string
//! such as `host=localhost port=5432 dbname=pvdb`.

use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default PostgreSQL DSN.
pub const DEFAULT_DATABASE_URL: &str = "host=localhost port=5432";

/// Default HTTP bind host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 2112;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default per-query timeout in seconds.
pub const DEFAULT_QUERY_TIMEOUT_SECONDS: u64 = 5;

/// Default database pool size.
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

/// File name searched for when no `--config` path is given.
pub const CONFIG_FILE_NAME: &str = "pvdb-metrics.toml";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Exporter configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    /// PostgreSQL DSN, URL or keyword form.
    pub database_url: String,

    /// Maximum pooled database connections (default: 10).
    pub db_max_connections: u32,

    /// Exit at startup if the database is unreachable (default: false).
    pub require_database: bool,

    /// HTTP bind host (default: "0.0.0.0").
    pub host: String,

    /// HTTP port (default: 2112).
    pub port: u16,

    /// Seconds to wait after a shutdown signal before closing (default: 0).
    pub drain_seconds: u64,

    /// Emit logs as JSON lines instead of console text.
    pub log_json: bool,

    /// Minimum log level for this crate and tower-http.
    pub log_level: String,

    /// Upper bound for one warehouse query, pool acquisition included.
    pub query_timeout: Duration,
}

/// Custom Debug implementation that redacts the database URL.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"[REDACTED]")
            .field("db_max_connections", &self.db_max_connections)
            .field("require_database", &self.require_database)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("drain_seconds", &self.drain_seconds)
            .field("log_json", &self.log_json)
            .field("log_level", &self.log_level)
            .field("query_timeout", &self.query_timeout)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            require_database: false,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            drain_seconds: 0,
            log_json: false,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECONDS),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    FileParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

fn invalid(key: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.into(),
    }
}

/// Values given on the command line. `None` leaves the lower layers in charge.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_file: Option<PathBuf>,
    pub database_url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub log_json: Option<bool>,
    pub log_level: Option<String>,
    pub query_timeout_seconds: Option<u64>,
    pub require_database: Option<bool>,
}

/// Contents of `pvdb-metrics.toml`.
///
/// ```toml
/// [database]
/// url = "postgresql://pvdb@db.internal:5432/pvdb"
/// max_connections = 10
///
/// [server]
/// port = 2112
///
/// [log]
/// json = true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub database: DatabaseSection,
    pub server: ServerSection,
    pub log: LogSection,
    pub query: QuerySection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseSection {
    pub url: Option<String>,
    pub max_connections: Option<u32>,
    pub require: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub drain_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSection {
    pub json: Option<bool>,
    pub level: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QuerySection {
    pub timeout_seconds: Option<u64>,
}

impl FileConfig {
    /// Read and parse a config file.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&contents).map_err(|source| ConfigError::FileParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the first `pvdb-metrics.toml` found in `dirs`.
    ///
    /// Returns `Ok(None)` when no directory holds one. A file that exists
    /// but does not parse is an error.
    pub fn discover(dirs: &[PathBuf]) -> Result<Option<(PathBuf, Self)>, ConfigError> {
        for dir in dirs {
            let path = dir.join(CONFIG_FILE_NAME);
            if path.is_file() {
                let file = Self::read(&path)?;
                return Ok(Some((path, file)));
            }
        }
        Ok(None)
    }
}

/// Directories searched for the config file, in order.
pub fn search_dirs(home: Option<&str>) -> Vec<PathBuf> {
    let mut dirs = vec![PathBuf::from("/etc")];
    if let Some(home) = home.filter(|h| !h.is_empty()) {
        dirs.push(Path::new(home).join(".config"));
    }
    dirs.push(PathBuf::from("."));
    dirs
}

impl Config {
    /// Resolve configuration from the process environment, the config file
    /// and `overrides`.
    ///
    /// Returns the resolved config and the path of the file used, if any.
    pub fn load(overrides: &ConfigOverrides) -> Result<(Self, Option<PathBuf>), ConfigError> {
        let vars: HashMap<String, String> = env::vars().collect();

        let (file, path) = match &overrides.config_file {
            Some(path) => (FileConfig::read(path)?, Some(path.clone())),
            None => {
                let dirs = search_dirs(vars.get("HOME").map(String::as_str));
                match FileConfig::discover(&dirs)? {
                    Some((path, file)) => (file, Some(path)),
                    None => (FileConfig::default(), None),
                }
            }
        };

        let config = Self::resolve(overrides, &vars, &file)?;
        Ok((config, path))
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::resolve(&ConfigOverrides::default(), vars, &FileConfig::default())
    }

    /// Merge the layers and validate the result.
    pub fn resolve(
        overrides: &ConfigOverrides,
        vars: &HashMap<String, String>,
        file: &FileConfig,
    ) -> Result<Self, ConfigError> {
        let database_url = overrides
            .database_url
            .clone()
            .or_else(|| vars.get("DATABASE_URL").cloned())
            .or_else(|| file.database.url.clone())
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let db_max_connections = match env_parsed::<u32>(vars, "DB_MAX_CONNECTIONS")? {
            Some(value) => Some(value),
            None => file.database.max_connections,
        }
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);

        let require_database = match overrides.require_database {
            Some(value) => Some(value),
            None => env_bool(vars, "REQUIRE_DATABASE")?.or(file.database.require),
        }
        .unwrap_or(false);

        let host = overrides
            .host
            .clone()
            .or_else(|| vars.get("SERVER_HOST").cloned())
            .or_else(|| file.server.host.clone())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = match overrides.port {
            Some(value) => Some(value),
            None => env_parsed::<u16>(vars, "SERVER_PORT")?.or(file.server.port),
        }
        .unwrap_or(DEFAULT_PORT);

        let drain_seconds = env_parsed::<u64>(vars, "SHUTDOWN_DRAIN_SECONDS")?
            .or(file.server.drain_seconds)
            .unwrap_or(0);

        let log_json = match overrides.log_json {
            Some(value) => Some(value),
            None => env_bool(vars, "LOG_JSON")?.or(file.log.json),
        }
        .unwrap_or(false);

        let log_level = overrides
            .log_level
            .clone()
            .or_else(|| vars.get("LOG_LEVEL").cloned())
            .or_else(|| file.log.level.clone())
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
            .to_ascii_lowercase();

        let query_timeout_seconds = match overrides.query_timeout_seconds {
            Some(value) => Some(value),
            None => {
                env_parsed::<u64>(vars, "QUERY_TIMEOUT_SECONDS")?.or(file.query.timeout_seconds)
            }
        }
        .unwrap_or(DEFAULT_QUERY_TIMEOUT_SECONDS);

        // Validation
        parse_dsn(&database_url)?;

        if db_max_connections == 0 {
            return Err(invalid("DB_MAX_CONNECTIONS", "must be greater than 0"));
        }

        if host.trim().is_empty() {
            return Err(invalid("server host", "must not be empty"));
        }

        if !LOG_LEVELS.contains(&log_level.as_str()) {
            return Err(invalid(
                "log level",
                format!(
                    "must be one of {}, got '{}'",
                    LOG_LEVELS.join(", "),
                    log_level
                ),
            ));
        }

        if query_timeout_seconds == 0 {
            return Err(invalid("query timeout", "must be greater than 0"));
        }

        Ok(Config {
            database_url,
            db_max_connections,
            require_database,
            host,
            port,
            drain_seconds,
            log_json,
            log_level,
            query_timeout: Duration::from_secs(query_timeout_seconds),
        })
    }

    /// `host:port` for the HTTP listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Connection options for the warehouse pool.
    ///
    /// Sets a server-side `statement_timeout` matching the per-query
    /// timeout so abandoned queries do not keep running.
    pub fn connect_options(&self) -> Result<PgConnectOptions, ConfigError> {
        let timeout = format!("{}ms", self.query_timeout.as_millis());
        Ok(parse_dsn(&self.database_url)?.options([("statement_timeout", timeout)]))
    }
}

/// Parse a DSN in URL or keyword form.
fn parse_dsn(dsn: &str) -> Result<PgConnectOptions, ConfigError> {
    let dsn = dsn.trim();
    if dsn.is_empty() {
        return Err(invalid("database url", "must not be empty"));
    }

    if dsn.starts_with("postgres://") || dsn.starts_with("postgresql://") {
        return dsn
            .parse::<PgConnectOptions>()
            .map_err(|e| invalid("database url", e.to_string()));
    }

    let mut options = PgConnectOptions::new();
    for (key, value) in keyword_pairs(dsn)? {
        options = match key.as_str() {
            "host" | "hostaddr" => options.host(&value),
            "port" => {
                let port = value.parse::<u16>().map_err(|_| {
                    invalid("database url", format!("invalid port '{}'", value))
                })?;
                options.port(port)
            }
            "user" => options.username(&value),
            "password" => options.password(&value),
            "dbname" => options.database(&value),
            "sslmode" => {
                let mode = value.parse::<PgSslMode>().map_err(|_| {
                    invalid("database url", format!("invalid sslmode '{}'", value))
                })?;
                options.ssl_mode(mode)
            }
            "sslrootcert" => options.ssl_root_cert(value.as_str()),
            "application_name" => options.application_name(&value),
            other => {
                return Err(invalid(
                    "database url",
                    format!("unsupported keyword '{}'", other),
                ))
            }
        };
    }

    Ok(options)
}

/// Split a libpq keyword DSN into `(key, value)` pairs.
///
/// Values may be single-quoted; a backslash escapes the next character.
fn keyword_pairs(dsn: &str) -> Result<Vec<(String, String)>, ConfigError> {
    let mut pairs = Vec::new();
    let mut chars = dsn.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(c) = chars.next_if(|c| *c != '=' && !c.is_whitespace()) {
            key.push(c);
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.next() != Some('=') {
            return Err(invalid(
                "database url",
                format!("missing '=' after keyword '{}'", key),
            ));
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        let mut value = String::new();
        if chars.next_if_eq(&'\'').is_some() {
            loop {
                match chars.next() {
                    Some('\'') => break,
                    Some('\\') => value.extend(chars.next()),
                    Some(c) => value.push(c),
                    None => {
                        return Err(invalid(
                            "database url",
                            format!("unterminated quoted value for '{}'", key),
                        ))
                    }
                }
            }
        } else {
            while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                if c == '\\' {
                    value.extend(chars.next());
                } else {
                    value.push(c);
                }
            }
        }

        pairs.push((key, value));
    }

    Ok(pairs)
}

fn env_parsed<T>(vars: &HashMap<String, String>, key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    vars.get(key)
        .map(|value_str| {
            value_str.trim().parse::<T>().map_err(|e| {
                invalid(
                    key,
                    format!("expected a non-negative integer, got '{}': {}", value_str, e),
                )
            })
        })
        .transpose()
}

fn env_bool(vars: &HashMap<String, String>, key: &str) -> Result<Option<bool>, ConfigError> {
    vars.get(key)
        .map(|value_str| {
            parse_bool(value_str).ok_or_else(|| {
                invalid(
                    key,
                    format!("expected true/false/1/0/yes/no, got '{}'", value_str),
                )
            })
        })
        .transpose()
}

/// Parse a boolean the way operators write them in env files.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
