//! Logging setup.
//!
//! The engine only emits `tracing` events; installing a subscriber is up to
//! the application. [`init_logging`] is the stock choice: a formatted
//! subscriber on stderr filtered by `RUST_LOG`.
//!
//! Contained `calculate` failures are logged at `warn`, so they stay visible
//! under the default `info` filter.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

/// Logger configuration.
///
/// `filter` follows the `EnvFilter` directive syntax (e.g. "info",
/// "cascade_core=debug"). When unset, `RUST_LOG` is used, then `info`.
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    pub filter: Option<String>,
    pub ansi: bool,
}

static INIT: Once = Once::new();

/// Install the global subscriber once. Later calls are ignored, as is a
/// subscriber installed by someone else first.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = match config.filter.as_deref() {
            Some(directives) => EnvFilter::try_new(directives).ok(),
            None => EnvFilter::try_from_default_env().ok(),
        }
        .unwrap_or_else(|| EnvFilter::new("info"));

        let installed = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(config.ansi)
            .with_writer(std::io::stderr)
            .try_init()
            .is_ok();

        if installed {
            tracing::debug!("logging initialized");
        }
    });
}
