//! Tracing initialisation for ghgraph binaries.
//!
//! Call [`init_tracing`] once at program start. Later calls are ignored since
//! the global subscriber can only be set once per process.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialise the global tracing subscriber.
///
/// * `json` emits newline-delimited JSON log lines.
/// * `level` is the default verbosity when `RUST_LOG` is not set.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}
