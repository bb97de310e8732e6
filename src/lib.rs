//! Catalog reconciler: configuration loading, logging bootstrap, ambient
//! metrics, and the top-level `run_scan` entry point composing the
//! workspace's library crates into the data flow described below --
//! library snapshot -> fingerprints -> state diff -> changeset ->
//! invalidation plan -> (per album) pre-check -> cache -> API fan-out ->
//! scoring -> year selection -> update executor -> cache notify -> change
//! report.

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use reconciler_cache::library_state::{build_state, DiffOutcome, LibraryState, TrackForFingerprint};
use reconciler_cache::{CacheOrchestrator, CacheOrchestratorConfig, ChangeSet, LibraryStateManager};
use reconciler_core::error_metrics::ErrorMetricsCollector;
use reconciler_core::fingerprint::TrackAttrs;
use reconciler_core::retry::RetryPolicy;
use reconciler_scoring::{ArtistPeriodContext, ReleaseScorer};
use reconciler_services::{
    BatchPolicy, CatalogApiProvider, ChangeReport, ChangeReportRow, ChangeType, DeterminationOutcome,
    FieldUpdate, IncrementalFilter, LibrarySnapshotPolicy, PendingVerificationStore, RunSummary,
    ScriptRunner, SecurityValidator, SkipReason, TestArtistFilter, TimeoutConfig, Track,
    TrackUpdateExecutor, YearDeterminator, YearDeterminatorConfig,
};

pub use config::ReconcilerConfig;
pub use error::{ReconcileError, Result};
pub use metrics::ReconcilerMetrics;

/// Filesystem locations for the persistent stores the scan reads and
/// writes. Kept separate from `ReconcilerConfig` because these are
/// deployment-specific paths, not tunable policy.
pub struct ScanPaths {
    pub library_state_path: PathBuf,
    pub album_year_cache_path: PathBuf,
    pub api_response_cache_path: PathBuf,
    pub pending_verification_path: PathBuf,
}

/// Everything a scan needs about the library as of this run: every track
/// paired with the raw attributes its fingerprint is computed over, and an
/// optional activity-period context per artist (used for the scorer's
/// artist-activity-period weighting).
pub struct ScanInputs {
    pub tracks: Vec<(Track, TrackAttrs)>,
    pub library_path: Option<String>,
    pub artist_periods: HashMap<String, ArtistPeriodContext>,
}

fn year_determinator_config(config: &ReconcilerConfig) -> YearDeterminatorConfig {
    YearDeterminatorConfig {
        definitive_threshold: config.year_retrieval.definitive_threshold,
        suspicious_delta: config.year_retrieval.suspicious_delta,
        min_valid_year: config.year_retrieval.min_valid_year,
        pending_verification_period: config.pending_verification_period(),
        ..YearDeterminatorConfig::default()
    }
}

fn release_scorer(config: &ReconcilerConfig) -> ReleaseScorer {
    ReleaseScorer::new(
        config.year_retrieval.scoring.clone(),
        config.year_retrieval.min_valid_year,
        config.year_retrieval.definitive_threshold,
        config.year_retrieval.remaster_keywords.clone(),
    )
}

/// Retry policy for a single catalog-provider fan-out call: the
/// configuration only exposes a per-call timeout, so that value anchors
/// both the total operation deadline and the exponential backoff base.
fn catalog_retry_policy(config: &ReconcilerConfig) -> RetryPolicy {
    RetryPolicy {
        operation_timeout_seconds: config.year_retrieval.api_timeout_seconds * 4.0,
        ..RetryPolicy::default()
    }
}

/// Runs one full reconciliation scan: builds the fingerprint-based
/// changeset since the last run, groups tracks into albums, runs the year
/// determinator per album, applies any accepted year via the update
/// executor, and renders the change report plus run summary.
///
/// The pipeline is strictly sequential within
/// one album (pre-checks -> cache -> API -> score -> write -> notify).
/// Across albums there is no ordering guarantee; this implementation
/// processes them in iteration order, which is a valid interleaving.
pub async fn run_scan<R: ScriptRunner>(
    config: &ReconcilerConfig,
    paths: ScanPaths,
    runner: R,
    providers: Vec<Arc<dyn CatalogApiProvider>>,
    inputs: ScanInputs,
    metrics: &ReconcilerMetrics,
) -> Result<(String, RunSummary)> {
    let mut state_manager = LibraryStateManager::new(&paths.library_state_path);
    let old_fingerprints = state_manager.load().await;

    let fingerprint_inputs: Vec<TrackForFingerprint> = inputs
        .tracks
        .iter()
        .map(|(track, attrs)| TrackForFingerprint {
            track_id: track.id.clone(),
            attrs: attrs.clone(),
        })
        .collect();
    let new_fingerprints =
        build_state(&fingerprint_inputs).map_err(|e| ReconcileError::DataIntegrity(e.to_string()))?;

    let changes = match LibraryStateManager::diff(&old_fingerprints, &new_fingerprints) {
        Ok(DiffOutcome::Changes(changes)) => changes,
        Ok(DiffOutcome::Rebuild) => {
            tracing::info!("library rebuild detected; treating as a full re-scan");
            ChangeSet::default()
        }
        Err(err) => return Err(ReconcileError::DataIntegrity(err.to_string())),
    };

    state_manager
        .save(LibraryState::new(new_fingerprints, inputs.library_path.clone()))
        .await
        .map_err(|e| ReconcileError::PersistentIo(e.to_string()))?;

    let mut cache = CacheOrchestrator::new(CacheOrchestratorConfig {
        generic_default_ttl: config.default_ttl(),
        album_year_cache_path: paths.album_year_cache_path,
        api_response_cache_path: paths.api_response_cache_path,
        api_failed_ttl: Duration::from_secs(86400),
        max_background_tasks: 100,
    });
    cache
        .load_persistent_stores()
        .await
        .map_err(|e| ReconcileError::PersistentIo(e.to_string()))?;

    cache
        .apply_changeset(&changes, false)
        .await
        .map_err(|e| ReconcileError::DataIntegrity(e.to_string()))?;

    let mut pending = PendingVerificationStore::new(&paths.pending_verification_path);
    pending.load().await.map_err(|e| ReconcileError::PersistentIo(e.to_string()))?;

    let filter = IncrementalFilter::new(
        TestArtistFilter::new(config.development.test_artists.clone()),
        LibrarySnapshotPolicy { enabled: config.library_snapshot.enabled },
    );

    let mut tracks: Vec<Track> = inputs.tracks.into_iter().map(|(track, _)| track).collect();
    let selected_ids: std::collections::HashSet<String> = filter
        .select(&tracks, &changes)
        .into_iter()
        .map(|t| t.id.clone())
        .collect();

    let mut albums: HashMap<(String, String), Vec<usize>> = HashMap::new();
    for (idx, track) in tracks.iter().enumerate() {
        if selected_ids.contains(&track.id) {
            albums.entry((track.artist.clone(), track.album.clone())).or_default().push(idx);
        }
    }

    let determinator = YearDeterminator::new(year_determinator_config(config));
    let mut scorer = release_scorer(config);
    let retry_policy = catalog_retry_policy(config);
    let mut error_metrics = ErrorMetricsCollector::new(60, 3);

    let executor = TrackUpdateExecutor::new(
        runner,
        SecurityValidator::default(),
        TimeoutConfig {
            batch_update_seconds: config.applescript_timeouts.batch_update,
            applescript_timeout_seconds: config.applescript_timeout_seconds,
        },
        BatchPolicy {
            enabled: config.experimental.batch_updates_enabled,
            max_batch_size: config.experimental.max_batch_size,
        },
        false,
    );

    let mut summary = RunSummary::default();
    let mut report = ChangeReport::new();

    for ((artist, album), indices) in albums {
        let pipeline_start = Instant::now();
        let album_tracks: Vec<Track> = indices.iter().map(|&i| tracks[i].clone()).collect();
        let artist_period = inputs.artist_periods.get(&artist).copied();

        let (album_year_cache, api_response_cache) = cache.album_year_and_api_response();
        let outcome = determinator
            .determine(
                &artist,
                &album,
                &album_tracks,
                artist_period,
                album_year_cache,
                api_response_cache,
                &mut pending,
                &mut scorer,
                &providers,
                &retry_policy,
                &mut error_metrics,
            )
            .await;

        metrics.observe_pipeline_duration(pipeline_start.elapsed().as_secs_f64());

        match outcome {
            DeterminationOutcome::Skipped(reason) => {
                summary.record_skip(&reason);
                metrics.record_skip(skip_reason_label(&reason));
            }
            DeterminationOutcome::Written { year, .. } => {
                let year_str = year.to_string();
                for &idx in &indices {
                    let old_year = tracks[idx].year.clone();
                    tracks[idx].apply_determined_year(&year_str);
                    let _update_result = executor
                        .update_track(
                            &tracks[idx],
                            &[FieldUpdate { field: "year".to_string(), value: year_str.clone() }],
                            &mut cache,
                        )
                        .await
                        .map_err(|e| ReconcileError::PersistentIo(e.to_string()))?;

                    report.push(ChangeReportRow {
                        change_type: ChangeType::Year,
                        artist: artist.clone(),
                        album: album.clone(),
                        track_name: tracks[idx].name.clone(),
                        old_genre: None,
                        new_genre: None,
                        old_year,
                        new_year: Some(year_str.clone()),
                        old_name: None,
                        new_name: None,
                        old_artist: None,
                        new_artist: None,
                        timestamp: Utc::now(),
                    });
                }
                summary.record_updated();
                metrics.record_updated();
            }
            DeterminationOutcome::PendingVerification(_) | DeterminationOutcome::Inconclusive => {
                summary.record_pending();
                metrics.record_pending();
            }
        }
    }

    cache.flush_all().await.map_err(|e| ReconcileError::PersistentIo(e.to_string()))?;
    pending.flush().await.map_err(|e| ReconcileError::PersistentIo(e.to_string()))?;

    metrics.sample_process_memory();

    let rendered = report.render().map_err(|e| ReconcileError::PersistentIo(e.to_string()))?;
    Ok((rendered, summary))
}

fn skip_reason_label(reason: &SkipReason) -> &'static str {
    match reason {
        SkipReason::AlreadyProcessed => "already_processed",
        SkipReason::RecentlyRejected(_) => "recently_rejected",
        SkipReason::YearConsistent => "year_consistent",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconciler_core::fingerprint::TrackAttrs;
    use reconciler_services::{ScriptContext, ScriptError, ScriptRunner, Track, TrackStatus};

    struct NoopScriptRunner;

    #[async_trait::async_trait]
    impl ScriptRunner for NoopScriptRunner {
        async fn run_script(
            &self,
            _script_name: &str,
            _args: &[String],
            _timeout: Duration,
            _context: ScriptContext,
        ) -> Result<Option<String>, ScriptError> {
            Ok(Some("No Change: noop".to_string()))
        }
    }

    fn track(id: &str, artist: &str, album: &str) -> (Track, TrackAttrs) {
        let track = Track {
            id: id.to_string(),
            fingerprint: None,
            name: "Song".to_string(),
            artist: artist.to_string(),
            album_artist: None,
            album: album.to_string(),
            genre: None,
            year: None,
            date_added: None,
            track_status: TrackStatus::Purchased,
            year_before_mgu: None,
            year_set_by_mgu: String::new(),
        };
        let attrs = TrackAttrs {
            persistent_id: Some(format!("pid-{id}")),
            location: Some(format!("/music/{id}.m4a")),
            file_size: Some("1024".to_string()),
            duration: Some("180.0".to_string()),
            date_modified: Some("2024-01-01".to_string()),
            date_added: Some("2023-01-01".to_string()),
        };
        (track, attrs)
    }

    fn scan_paths(dir: &tempfile::TempDir) -> ScanPaths {
        ScanPaths {
            library_state_path: dir.path().join("library_state.json"),
            album_year_cache_path: dir.path().join("album_years.json"),
            api_response_cache_path: dir.path().join("api_response_cache.json"),
            pending_verification_path: dir.path().join("pending_verification.json"),
        }
    }

    /// With no catalog providers configured and no pre-existing year, a
    /// fresh library state should flow all the way through the pipeline --
    /// fingerprinting, diffing, caching, determination, report rendering --
    /// without error, landing on `Inconclusive` rather than a write.
    #[tokio::test]
    async fn run_scan_with_no_providers_is_inconclusive_and_reports_nothing_written() {
        let dir = tempfile::tempdir().unwrap();
        let config = ReconcilerConfig::default();
        let metrics = ReconcilerMetrics::new();

        let inputs = ScanInputs {
            tracks: vec![track("1", "Some Artist", "Some Album")],
            library_path: None,
            artist_periods: HashMap::new(),
        };

        let (report, summary) = run_scan(
            &config,
            scan_paths(&dir),
            NoopScriptRunner,
            Vec::new(),
            inputs,
            &metrics,
        )
        .await
        .unwrap();

        assert_eq!(summary.updated, 0);
        assert_eq!(summary.pending_verification, 1);
        assert_eq!(report, "no changes");
    }

    /// A second scan against the same state paths, with no library changes,
    /// should skip the track as `year_consistent`/unchanged rather than
    /// re-running determination -- exercising the fingerprint-diff path on
    /// a warm `library_state.json`.
    #[tokio::test]
    async fn second_scan_with_unchanged_library_skips_determination() {
        let dir = tempfile::tempdir().unwrap();
        let config = ReconcilerConfig::default();
        let metrics = ReconcilerMetrics::new();

        let first_inputs = ScanInputs {
            tracks: vec![track("1", "Some Artist", "Some Album")],
            library_path: None,
            artist_periods: HashMap::new(),
        };
        run_scan(&config, scan_paths(&dir), NoopScriptRunner, Vec::new(), first_inputs, &metrics)
            .await
            .unwrap();

        let second_inputs = ScanInputs {
            tracks: vec![track("1", "Some Artist", "Some Album")],
            library_path: None,
            artist_periods: HashMap::new(),
        };
        let (_report, summary) = run_scan(
            &config,
            scan_paths(&dir),
            NoopScriptRunner,
            Vec::new(),
            second_inputs,
            &metrics,
        )
        .await
        .unwrap();

        assert_eq!(summary.updated, 0);
        assert_eq!(summary.pending_verification, 0);
        assert_eq!(summary.processed, 0);
    }
}
