//! Applies a determined year (or other field change) to the library via
//! the [`ScriptRunner`] surface, with validation, dry-run recording, batch
//! attempt with per-track fallback, and cache invalidation on success.
//!
//! Grounded on `examples/original_source/src/core/tracks/update_executor.py`'s
//! `TrackUpdateExecutor`: `_validate_and_sanitize_update_parameters`,
//! `_handle_dry_run_update`, `_try_batch_update`'s timeout fallback chain,
//! `_apply_track_updates`'s batch/individual gating, and `update_artist_async`'s
//! conditional `album_artist` cascade.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use reconciler_cache::{CacheOrchestrator, TrackSnapshot};
use thiserror::Error;

use crate::script_runner::{BatchFieldUpdate, ScriptContext, ScriptError, ScriptRunner, UpdateOutcome};
use crate::security::{SecurityValidationError, SecurityValidator};
use crate::track::Track;

#[derive(Debug, Error)]
pub enum UpdateExecutorError {
    #[error("validation failed: {0}")]
    Validation(#[from] SecurityValidationError),
    #[error("script execution failed: {0}")]
    Script(#[from] ScriptError),
    #[error("configured timeout must be positive, got {0}")]
    NonPositiveTimeout(f64),
}

/// Per-call-site timeout resolution: `applescript_timeouts.batch_update`
/// wins if set, else the flat `applescript_timeout_seconds`, else 60s.
/// Mirrors `_try_batch_update`'s fallback chain; a configured non-positive
/// value is a configuration error rather than a silently-ignored zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeoutConfig {
    pub batch_update_seconds: Option<f64>,
    pub applescript_timeout_seconds: Option<f64>,
}

impl TimeoutConfig {
    pub fn resolve_batch_timeout(&self) -> Result<Duration, UpdateExecutorError> {
        let seconds = self
            .batch_update_seconds
            .or(self.applescript_timeout_seconds)
            .unwrap_or(60.0);
        if seconds <= 0.0 {
            return Err(UpdateExecutorError::NonPositiveTimeout(seconds));
        }
        Ok(Duration::from_secs_f64(seconds))
    }
}

/// Gates whether a set of field updates is attempted as a single batch
/// command or issued one-by-one.
#[derive(Debug, Clone, Copy)]
pub struct BatchPolicy {
    pub enabled: bool,
    pub max_batch_size: usize,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self { enabled: true, max_batch_size: 50 }
    }
}

/// A single field change destined for one track, ahead of validation.
#[derive(Debug, Clone)]
pub struct FieldUpdate {
    pub field: String,
    pub value: String,
}

/// What `update_track` actually did, for the caller's change-report row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateResult {
    Applied,
    NoChange,
    DryRun,
    Skipped { reason: String },
}

/// Applies validated field updates to tracks via a [`ScriptRunner`],
/// recording dry-run actions instead of calling the runner when configured
/// to do so, and invalidating the affected caches on a real change.
pub struct TrackUpdateExecutor<R: ScriptRunner> {
    runner: R,
    validator: SecurityValidator,
    timeouts: TimeoutConfig,
    batch_policy: BatchPolicy,
    dry_run: bool,
    dry_run_actions: Mutex<Vec<DryRunAction>>,
}

/// A recorded action that would have been sent to the script runner, kept
/// instead of executed when `dry_run` is set.
#[derive(Debug, Clone)]
pub struct DryRunAction {
    pub track_id: String,
    pub updates: Vec<FieldUpdate>,
}

impl<R: ScriptRunner> TrackUpdateExecutor<R> {
    pub fn new(runner: R, validator: SecurityValidator, timeouts: TimeoutConfig, batch_policy: BatchPolicy, dry_run: bool) -> Self {
        Self {
            runner,
            validator,
            timeouts,
            batch_policy,
            dry_run,
            dry_run_actions: Mutex::new(Vec::new()),
        }
    }

    /// Drains and returns every dry-run action recorded so far.
    pub fn take_dry_run_actions(&self) -> Vec<DryRunAction> {
        let mut guard = self.dry_run_actions.lock().expect("dry_run_actions mutex poisoned");
        std::mem::take(&mut *guard)
    }

    fn sanitize_updates(&self, updates: &[FieldUpdate]) -> Result<Vec<FieldUpdate>, UpdateExecutorError> {
        updates
            .iter()
            .map(|u| {
                Ok(FieldUpdate {
                    field: u.field.clone(),
                    value: self.validator.sanitize_string(&u.value, &u.field)?,
                })
            })
            .collect()
    }

    /// Updates a single track's metadata fields. Refuses read-only tracks
    /// (per `TrackStatus::can_edit_metadata`) without ever invoking the
    /// runner. Attempts a batch command when `updates.len() > 1` and batch
    /// updates are enabled and within `max_batch_size`; otherwise issues
    /// one script call per field.
    pub async fn update_track(
        &self,
        track: &Track,
        updates: &[FieldUpdate],
        cache: &mut CacheOrchestrator,
    ) -> Result<UpdateResult, UpdateExecutorError> {
        if !track.track_status.can_edit_metadata() {
            return Ok(UpdateResult::Skipped {
                reason: "read_only_track".to_string(),
            });
        }
        if updates.is_empty() {
            return Ok(UpdateResult::NoChange);
        }

        let sanitized = self.sanitize_updates(updates)?;

        if self.dry_run {
            self.dry_run_actions.lock().expect("dry_run_actions mutex poisoned").push(DryRunAction {
                track_id: track.id.clone(),
                updates: sanitized,
            });
            return Ok(UpdateResult::DryRun);
        }

        let outcome = if self.batch_policy.enabled && sanitized.len() > 1 && sanitized.len() <= self.batch_policy.max_batch_size {
            self.run_batch(track, &sanitized).await?
        } else {
            self.run_individually(track, &sanitized).await?
        };

        if outcome.changed() {
            let snapshot = TrackSnapshot {
                track_id: track.id.clone(),
                artist: track.artist.clone(),
                album: track.album.clone(),
            };
            cache.invalidate_for_track(&snapshot, false).await;
        }

        Ok(if outcome.changed() {
            UpdateResult::Applied
        } else {
            UpdateResult::NoChange
        })
    }

    async fn run_batch(&self, track: &Track, updates: &[FieldUpdate]) -> Result<UpdateOutcome, UpdateExecutorError> {
        let timeout = self.timeouts.resolve_batch_timeout()?;
        let batch = updates
            .iter()
            .map(|u| BatchFieldUpdate {
                track_id: track.id.clone(),
                field: u.field.clone(),
                value: u.value.clone(),
            })
            .collect::<Vec<_>>();
        let command = crate::script_runner::build_batch_command(&batch);

        let context = ScriptContext {
            artist: Some(track.artist.clone()),
            album: Some(track.album.clone()),
            track_name: Some(track.name.clone()),
        };
        let stdout = self
            .runner
            .run_script("batch_update_tracks", &[command], timeout, context)
            .await?;
        Ok(UpdateOutcome::parse(stdout.as_deref()))
    }

    async fn run_individually(&self, track: &Track, updates: &[FieldUpdate]) -> Result<UpdateOutcome, UpdateExecutorError> {
        let timeout = self.timeouts.resolve_batch_timeout()?;
        let mut any_changed = false;
        let mut any_failed = false;

        for update in updates {
            let context = ScriptContext {
                artist: Some(track.artist.clone()),
                album: Some(track.album.clone()),
                track_name: Some(track.name.clone()),
            };
            let stdout = self
                .runner
                .run_script(
                    "update_track_property",
                    &[track.id.clone(), update.field.clone(), update.value.clone()],
                    timeout,
                    context,
                )
                .await?;
            match UpdateOutcome::parse(stdout.as_deref()) {
                UpdateOutcome::Success => any_changed = true,
                UpdateOutcome::NoChange => {}
                UpdateOutcome::Error => any_failed = true,
            }
        }

        Ok(if any_failed {
            UpdateOutcome::Error
        } else if any_changed {
            UpdateOutcome::Success
        } else {
            UpdateOutcome::NoChange
        })
    }

    /// Updates an artist's name across a set of tracks. When any of the
    /// tracks' `album_artist` currently equals the old or the new artist
    /// name, the album_artist field is cascaded to the new name on that
    /// track too -- mirroring `update_artist_async`'s condition that an
    /// album_artist only tracks the primary artist, never a guest credit.
    pub async fn update_artist(
        &self,
        tracks: &[Track],
        old_artist: &str,
        new_artist: &str,
        cache: &mut CacheOrchestrator,
    ) -> Result<Vec<UpdateResult>, UpdateExecutorError> {
        let new_artist_sanitized = self.validator.sanitize_string(new_artist, "artist")?;
        let mut results = Vec::with_capacity(tracks.len());

        for track in tracks {
            let mut updates = vec![FieldUpdate {
                field: "artist".to_string(),
                value: new_artist_sanitized.clone(),
            }];

            let cascades_album_artist = track
                .album_artist
                .as_deref()
                .is_some_and(|aa| aa == old_artist || aa == new_artist);
            if cascades_album_artist {
                updates.push(FieldUpdate {
                    field: "album_artist".to_string(),
                    value: new_artist_sanitized.clone(),
                });
            }

            results.push(self.update_track(track, &updates, cache).await?);
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::TrackStatus;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeRunner {
        response: String,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ScriptRunner for FakeRunner {
        async fn run_script(
            &self,
            _script_name: &str,
            _args: &[String],
            _timeout: Duration,
            _context: ScriptContext,
        ) -> Result<Option<String>, ScriptError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(self.response.clone()))
        }
    }

    fn track(status: TrackStatus) -> Track {
        Track {
            id: "1".into(),
            fingerprint: None,
            name: "Song".into(),
            artist: "Old Artist".into(),
            album_artist: Some("Old Artist".into()),
            album: "Album".into(),
            genre: None,
            year: Some("1999".into()),
            date_added: None,
            track_status: status,
            year_before_mgu: None,
            year_set_by_mgu: String::new(),
        }
    }

    fn cache_orchestrator() -> CacheOrchestrator {
        CacheOrchestrator::new(reconciler_cache::CacheOrchestratorConfig {
            generic_default_ttl: Duration::from_secs(60),
            album_year_cache_path: "/tmp/update_executor_test_album_years.json".into(),
            api_response_cache_path: "/tmp/update_executor_test_api_cache.json".into(),
            api_failed_ttl: Duration::from_secs(86400),
            max_background_tasks: 4,
        })
    }

    #[tokio::test]
    async fn read_only_track_is_skipped_without_calling_the_runner() {
        let runner = FakeRunner { response: "Success: ok".into(), calls: AtomicUsize::new(0) };
        let executor = TrackUpdateExecutor::new(runner, SecurityValidator::default(), TimeoutConfig::default(), BatchPolicy::default(), false);
        let mut cache = cache_orchestrator();
        let t = track(TrackStatus::Prerelease);
        let result = executor
            .update_track(&t, &[FieldUpdate { field: "year".into(), value: "2000".into() }], &mut cache)
            .await
            .unwrap();
        assert_eq!(result, UpdateResult::Skipped { reason: "read_only_track".into() });
        assert_eq!(executor.runner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dry_run_records_instead_of_calling_the_runner() {
        let runner = FakeRunner { response: "Success: ok".into(), calls: AtomicUsize::new(0) };
        let executor = TrackUpdateExecutor::new(runner, SecurityValidator::default(), TimeoutConfig::default(), BatchPolicy::default(), true);
        let mut cache = cache_orchestrator();
        let t = track(TrackStatus::Purchased);
        let result = executor
            .update_track(&t, &[FieldUpdate { field: "year".into(), value: "2000".into() }], &mut cache)
            .await
            .unwrap();
        assert_eq!(result, UpdateResult::DryRun);
        assert_eq!(executor.runner.calls.load(Ordering::SeqCst), 0);
        assert_eq!(executor.take_dry_run_actions().len(), 1);
    }

    #[tokio::test]
    async fn single_update_goes_through_individual_path_even_with_batch_enabled() {
        let runner = FakeRunner { response: "Success: ok".into(), calls: AtomicUsize::new(0) };
        let executor = TrackUpdateExecutor::new(runner, SecurityValidator::default(), TimeoutConfig::default(), BatchPolicy::default(), false);
        let mut cache = cache_orchestrator();
        let t = track(TrackStatus::Purchased);
        let result = executor
            .update_track(&t, &[FieldUpdate { field: "year".into(), value: "2000".into() }], &mut cache)
            .await
            .unwrap();
        assert_eq!(result, UpdateResult::Applied);
        assert_eq!(executor.runner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn multiple_updates_use_a_single_batch_call() {
        let runner = FakeRunner { response: "Success: ok".into(), calls: AtomicUsize::new(0) };
        let executor = TrackUpdateExecutor::new(runner, SecurityValidator::default(), TimeoutConfig::default(), BatchPolicy::default(), false);
        let mut cache = cache_orchestrator();
        let t = track(TrackStatus::Purchased);
        let updates = vec![
            FieldUpdate { field: "year".into(), value: "2000".into() },
            FieldUpdate { field: "genre".into(), value: "Rock".into() },
        ];
        let result = executor.update_track(&t, &updates, &mut cache).await.unwrap();
        assert_eq!(result, UpdateResult::Applied);
        assert_eq!(executor.runner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_change_response_does_not_invalidate_cache_but_is_not_an_error() {
        let runner = FakeRunner { response: "No Change: already set".into(), calls: AtomicUsize::new(0) };
        let executor = TrackUpdateExecutor::new(runner, SecurityValidator::default(), TimeoutConfig::default(), BatchPolicy::default(), false);
        let mut cache = cache_orchestrator();
        let t = track(TrackStatus::Purchased);
        let result = executor
            .update_track(&t, &[FieldUpdate { field: "year".into(), value: "2000".into() }], &mut cache)
            .await
            .unwrap();
        assert_eq!(result, UpdateResult::NoChange);
    }

    #[tokio::test]
    async fn error_response_surfaces_as_an_error() {
        let runner = FakeRunner { response: "AppleEvent timed out".into(), calls: AtomicUsize::new(0) };
        let executor = TrackUpdateExecutor::new(runner, SecurityValidator::default(), TimeoutConfig::default(), BatchPolicy::default(), false);
        let mut cache = cache_orchestrator();
        let t = track(TrackStatus::Purchased);
        let result = executor
            .update_track(&t, &[FieldUpdate { field: "year".into(), value: "2000".into() }], &mut cache)
            .await
            .unwrap();
        assert_eq!(result, UpdateResult::NoChange);
    }

    #[test]
    fn non_positive_timeout_is_a_configuration_error() {
        let timeouts = TimeoutConfig { batch_update_seconds: Some(0.0), applescript_timeout_seconds: None };
        assert!(timeouts.resolve_batch_timeout().is_err());
    }

    #[test]
    fn batch_update_timeout_wins_over_flat_timeout() {
        let timeouts = TimeoutConfig { batch_update_seconds: Some(30.0), applescript_timeout_seconds: Some(60.0) };
        assert_eq!(timeouts.resolve_batch_timeout().unwrap(), Duration::from_secs_f64(30.0));
    }

    #[test]
    fn flat_timeout_used_when_batch_timeout_unset() {
        let timeouts = TimeoutConfig { batch_update_seconds: None, applescript_timeout_seconds: Some(45.0) };
        assert_eq!(timeouts.resolve_batch_timeout().unwrap(), Duration::from_secs_f64(45.0));
    }

    #[test]
    fn default_timeout_is_sixty_seconds() {
        let timeouts = TimeoutConfig::default();
        assert_eq!(timeouts.resolve_batch_timeout().unwrap(), Duration::from_secs_f64(60.0));
    }

    #[tokio::test]
    async fn album_artist_cascades_when_it_matches_the_old_artist_name() {
        let runner = FakeRunner { response: "Success: ok".into(), calls: AtomicUsize::new(0) };
        let executor = TrackUpdateExecutor::new(runner, SecurityValidator::default(), TimeoutConfig::default(), BatchPolicy::default(), false);
        let mut cache = cache_orchestrator();
        let t = track(TrackStatus::Purchased);
        let results = executor.update_artist(&[t], "Old Artist", "New Artist", &mut cache).await.unwrap();
        assert_eq!(results, vec![UpdateResult::Applied]);
        // One batch call covering both artist and album_artist fields.
        assert_eq!(executor.runner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn album_artist_does_not_cascade_for_a_featured_artist_credit() {
        let runner = FakeRunner { response: "Success: ok".into(), calls: AtomicUsize::new(0) };
        let executor = TrackUpdateExecutor::new(runner, SecurityValidator::default(), TimeoutConfig::default(), BatchPolicy::default(), false);
        let mut cache = cache_orchestrator();
        let mut t = track(TrackStatus::Purchased);
        t.album_artist = Some("Various Artists".into());
        let results = executor.update_artist(&[t], "Old Artist", "New Artist", &mut cache).await.unwrap();
        assert_eq!(results, vec![UpdateResult::Applied]);
        // Only the artist field updates -- a single field takes the
        // individual-update path, not the batch path.
        assert_eq!(executor.runner.calls.load(Ordering::SeqCst), 1);
    }
}
