//! Tracing subscriber setup.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is unset.
///
/// `pvdb` matches both the crate's module paths and its `pvdb.*` targets.
pub fn default_directives(level: &str) -> String {
    format!("pvdb={level},tower_http={level}")
}

/// Install the global subscriber: console text, or JSON lines if `json`.
///
/// `RUST_LOG` takes precedence over `level`.
pub fn init(level: &str, json: bool) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(fmt::layer))
        .try_init()
}
