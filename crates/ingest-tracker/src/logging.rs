//! Log output for the tracker and its host application.
//!
//! Installs a `tracing-subscriber` registry and bridges `log` records into
//! it, so the synchronous modules (which log through `log`) and the async
//! ones (which use `tracing`) end up in the same stream.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::{LogFormat, LoggingConfig};
use crate::error::TrackerError;

/// Third-party targets kept quiet unless `RUST_LOG` says otherwise.
const QUIET_TARGETS: &[(&str, &str)] = &[("hyper", "warn"), ("reqwest", "warn"), ("h2", "warn")];

/// Uses `RUST_LOG` when set, otherwise the configured level.
fn build_env_filter(level: &str) -> Result<EnvFilter, TrackerError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut directives = vec![level.to_string()];
    for (target, lvl) in QUIET_TARGETS {
        directives.push(format!("{}={}", target, lvl));
    }
    let filter_str = directives.join(",");
    EnvFilter::try_new(&filter_str)
        .map_err(|e| TrackerError::Logging(format!("Invalid filter '{}': {}", filter_str, e)))
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), TrackerError> {
    let filter = build_env_filter(&config.level)?;

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_filter(filter)
            .boxed(),
        LogFormat::Text => fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_filter(filter)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(layer);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| TrackerError::Logging(e.to_string()))?;
    tracing_log::LogTracer::init().map_err(|e| TrackerError::Logging(e.to_string()))?;
    Ok(())
}
