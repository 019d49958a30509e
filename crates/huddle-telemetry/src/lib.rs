//! Logging setup for Huddle binaries.
//!
//! `init_tracing` installs the global subscriber: an `EnvFilter` (`RUST_LOG`
//! wins over the configured level), a stderr formatter, and optionally a
//! [`SyncEventLayer`] feeding a diagnostics panel.

pub mod tracing_layer;

pub use tracing_layer::{SyncDiagnostic, SyncEventLayer};

use huddle_core::config::LoggingConfig;
use huddle_core::error::{HuddleError, Result};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Builds the filter used when `RUST_LOG` is unset or invalid.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global tracing subscriber.
///
/// When `diagnostics` is given, sync events are also forwarded to it.
///
/// # Errors
///
/// Returns `HuddleError::Internal` if a global subscriber is already set.
pub fn init_tracing(
    config: &LoggingConfig,
    diagnostics: Option<mpsc::UnboundedSender<SyncDiagnostic>>,
) -> Result<()> {
    let plain = (!config.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });
    let json = config.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(plain)
        .with(json)
        .with(diagnostics.map(SyncEventLayer::new))
        .try_init()
        .map_err(|e| HuddleError::internal(format!("Failed to initialize tracing: {e}")))
}
