//! Process entry point: loads configuration, bootstraps logging, and runs
//! one reconciliation scan. Reading the config file and parsing its
//! contents, the actual library-control script runner, and the catalog API
//! clients are all out of this crate's scope -- the
//! deployment wires those in. `CONFIG_PATH` (defaulting to
//! `./reconciler.json`) is read via an environment variable rather than a
//! CLI parser, since argument parsing is likewise out of scope.

use std::path::PathBuf;
use std::sync::Arc;

use catalog_reconciler::config::{load_with_fallback, ReconcilerConfig};
use catalog_reconciler::{logging, run_scan, ReconcilerMetrics, ScanInputs, ScanPaths};
use reconciler_services::CatalogApiProvider;

fn load_config() -> anyhow::Result<ReconcilerConfig> {
    let primary = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "reconciler.json".to_string());
    let primary = PathBuf::from(primary);
    let fallback = PathBuf::from("reconciler.default.json");

    load_with_fallback(&primary, &[fallback.as_path()], ReconcilerConfig::from_str)
        .or_else(|err| {
            tracing::warn!(error = %err, "no configuration file found; running with defaults");
            Ok(ReconcilerConfig::default())
        })
}

#[tokio::main]
async fn main() {
    let config = match load_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("fatal configuration error: {err}");
            std::process::exit(1);
        }
    };

    logging::init(&config.logs.directory);
    tracing::info!("catalog reconciler starting");

    let paths = ScanPaths {
        library_state_path: PathBuf::from("library_state.json"),
        album_year_cache_path: PathBuf::from(&config.caching.api_result_cache_path).with_file_name("album_years.json"),
        api_response_cache_path: PathBuf::from(&config.caching.api_result_cache_path),
        pending_verification_path: PathBuf::from("pending_verification.json"),
    };

    let metrics = ReconcilerMetrics::new();
    let providers: Vec<Arc<dyn CatalogApiProvider>> = Vec::new();
    let inputs = ScanInputs {
        tracks: Vec::new(),
        library_path: None,
        artist_periods: Default::default(),
    };

    match run_scan(&config, paths, NoopScriptRunner, providers, inputs, &metrics).await {
        Ok((report, summary)) => {
            tracing::info!(summary = %summary.to_summary_line(), "scan complete");
            println!("{report}");
        }
        Err(err) => {
            tracing::error!(error = %err, "scan failed");
            std::process::exit(1);
        }
    }
}

/// A `ScriptRunner` that performs no subprocess work; the real
/// implementation launching the library-control scripts belongs to the
/// deployment, not this crate.
struct NoopScriptRunner;

#[async_trait::async_trait]
impl reconciler_services::ScriptRunner for NoopScriptRunner {
    async fn run_script(
        &self,
        script_name: &str,
        _args: &[String],
        _timeout: std::time::Duration,
        _context: reconciler_services::ScriptContext,
    ) -> Result<Option<String>, reconciler_services::ScriptError> {
        tracing::debug!(script_name, "no-op script runner invoked");
        Ok(Some("No Change: noop runner".to_string()))
    }
}
