//! Structured logging setup
//!
//! Logs go to stderr so reply text streamed to stdout stays clean.
//! `RUST_LOG` overrides the configured level.

use std::sync::OnceLock;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INSTALLED: OnceLock<bool> = OnceLock::new();

/// Filter directives used when `RUST_LOG` is unset
///
/// HTTP internals stay at `warn` so `debug` shows this crate's stream
/// handling without connection-pool chatter.
pub fn default_directives(level: &str) -> String {
    format!("chatstitch={level},reqwest=warn,hyper_util=warn")
}

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(default_level)))
}

/// Install the global tracing subscriber
///
/// Only the first call has an effect; later calls return the first result.
/// Returns `false` when the host process had already installed a global
/// subscriber, in which case that one keeps receiving events.
///
/// # Examples
///
/// ```no_run
/// chatstitch::telemetry::init("info");
/// tracing::info!("Application started");
/// ```
pub fn init(default_level: &str) -> bool {
    *INSTALLED.get_or_init(|| {
        tracing_subscriber::registry()
            .with(filter(default_level))
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .is_ok()
    })
}
