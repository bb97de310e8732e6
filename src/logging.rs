//! Structured logging bootstrap: an `EnvFilter`-driven subscriber
//! initialized once at process start, built on a plain
//! `tracing_subscriber::fmt()` layer. A second JSON layer writes into
//! the configured logs directory alongside the stderr sink.

use std::fs::OpenOptions;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the global tracing subscriber. Safe to call at most once per
/// process; a second call is a caller bug, not something this function
/// guards against.
pub fn init(logs_directory: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(true);

    let file_layer = std::fs::create_dir_all(logs_directory)
        .and_then(|_| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(format!("{logs_directory}/catalog-reconciler.log"))
        })
        .map(|file| fmt::layer().json().with_writer(std::sync::Mutex::new(file)))
        .map_err(|err| tracing::warn!(error = %err, "could not open log file, logging to stderr only"))
        .ok();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
}
