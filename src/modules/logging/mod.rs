//! # Logging System Module
//!
//! Installs the global `tracing` subscriber from [`LoggingConfig`].
//!
//! The configured level is the default; `RUST_LOG` directives still apply
//! on top of it. Noisy HTTP internals are capped at `warn`.

pub mod error;

pub use error::{LogError, LogResult};

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Build the filter for `config`.
pub fn filter(config: &LoggingConfig) -> LogResult<EnvFilter> {
    let filter = EnvFilter::builder()
        .with_default_directive(config.level.to_string().parse()?)
        .from_env_lossy()
        .add_directive("hyper=warn".parse()?)
        .add_directive("hyper_util=warn".parse()?)
        .add_directive("hickory_proto=warn".parse()?);
    Ok(filter)
}

/// Install the global subscriber.
pub fn init(config: &LoggingConfig) -> LogResult<()> {
    let builder = tracing_subscriber::fmt().with_env_filter(filter(config)?);

    let result = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };

    result.map_err(|e| LogError::AlreadyInitialized(e.to_string()))
}
