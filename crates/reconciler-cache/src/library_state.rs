//! Persists the `{track_id -> fingerprint}` library snapshot and computes
//! added/modified/deleted changesets between two snapshots.
//!
//! Grounded on `examples/original_source/src/services/cache/library_state_manager.py`'s
//! `LibraryStateManager`: atomic temp-file-then-rename saves with a single
//! backup generation, corrupt-JSON recovery via that backup, and the
//! corruption-vs-rebuild distinction in `diff`.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use reconciler_core::fingerprint::{self, FingerprintError, TrackAttrs};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("{failed} of {total} tracks failed fingerprinting, exceeding the 10% tolerance")]
    HighFailureRate { failed: usize, total: usize },

    #[error("possible library corruption: {changed} of {old_total} tracks changed ({ratio:.1}%)")]
    PossibleCorruption {
        changed: usize,
        old_total: usize,
        ratio: f64,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Signaled by `diff` instead of [`StateError::PossibleCorruption`] when the
/// change ratio crosses the corruption threshold but the library size is
/// unchanged — read as an intentional bulk replacement, not corruption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LibraryRebuild;

/// Outcome of [`LibraryStateManager::diff`]: either an ordinary changeset,
/// or a signal that the change looks like a deliberate library rebuild
/// rather than a diffable update.
pub enum DiffOutcome {
    Changes(ChangeSet),
    Rebuild,
}

/// `{track_id -> fingerprint}`, a wall-clock timestamp, and the library
/// path it was built from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryState {
    pub timestamp: DateTime<Utc>,
    pub library_path: Option<String>,
    pub track_count: usize,
    pub track_fingerprints: HashMap<String, String>,
}

impl LibraryState {
    pub fn new(track_fingerprints: HashMap<String, String>, library_path: Option<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            track_count: track_fingerprints.len(),
            library_path,
            track_fingerprints,
        }
    }
}

/// Three pairwise-disjoint id sets derived from two library states.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub added: HashSet<String>,
    pub modified: HashSet<String>,
    pub deleted: HashSet<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

/// A single track's identity plus raw attrs, as handed to [`build_state`]
/// by the caller (library-snapshot enumeration is out of this crate's
/// scope; the executor supplies this).
pub struct TrackForFingerprint {
    pub track_id: String,
    pub attrs: TrackAttrs,
}

/// Builds `{track_id -> fingerprint}`, tolerating up to a 10% per-track
/// failure rate. Above that, fails with [`StateError::HighFailureRate`].
pub fn build_state(
    tracks: &[TrackForFingerprint],
) -> Result<HashMap<String, String>, StateError> {
    let mut result = HashMap::with_capacity(tracks.len());
    let mut failed = 0usize;

    for track in tracks {
        match fingerprint::fingerprint(&track.attrs) {
            Ok(fp) => {
                result.insert(track.track_id.clone(), fp);
            }
            Err(FingerprintError::MissingRequired(field)) => {
                tracing::debug!(track_id = %track.track_id, field, "fingerprint failed for track");
                failed += 1;
            }
        }
    }

    if !tracks.is_empty() && (failed as f64 / tracks.len() as f64) > 0.10 {
        return Err(StateError::HighFailureRate {
            failed,
            total: tracks.len(),
        });
    }

    Ok(result)
}

/// Corruption guard threshold: above 90% of a library changing at once is
/// treated as suspicious rather than a legitimate bulk update, unless the
/// library's size did not change (a rebuild).
const CORRUPTION_CHANGE_RATIO: f64 = 0.9;
/// The guard only engages once the prior library is large enough that a
/// small sample doesn't trigger false positives.
const CORRUPTION_MIN_LIBRARY_SIZE: usize = 50;

/// Manages the persisted library-state file: load/save with atomic
/// temp-file-then-rename and a single retained backup generation, plus
/// `diff`/`needs_refresh` over in-memory snapshots.
pub struct LibraryStateManager {
    state_path: PathBuf,
    backup_path: PathBuf,
    cached: Option<LibraryState>,
}

impl LibraryStateManager {
    pub fn new(state_path: impl AsRef<Path>) -> Self {
        let state_path = state_path.as_ref().to_path_buf();
        let backup_path = state_path.with_extension(
            state_path
                .extension()
                .map(|e| format!("{}.backup", e.to_string_lossy()))
                .unwrap_or_else(|| "backup".to_string()),
        );
        Self {
            state_path,
            backup_path,
            cached: None,
        }
    }

    pub fn cached_state(&self) -> Option<&LibraryState> {
        self.cached.as_ref()
    }

    /// Atomically writes `state`: if a previous state file exists, it is
    /// copied to the single backup slot first, then the new state is
    /// written to a temp file and renamed into place.
    pub async fn save(&mut self, state: LibraryState) -> Result<(), StateError> {
        if tokio::fs::try_exists(&self.state_path).await.unwrap_or(false) {
            tokio::fs::copy(&self.state_path, &self.backup_path).await?;
        }

        let json = serde_json::to_vec_pretty(&state)?;
        let tmp = self.state_path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.state_path).await?;

        self.cached = Some(state);
        Ok(())
    }

    /// Loads the cached state. On corrupt JSON, attempts backup recovery;
    /// if the backup is also unreadable, returns an empty map rather than
    /// failing the run.
    pub async fn load(&mut self) -> HashMap<String, String> {
        if let Some(state) = self.try_read(&self.state_path.clone()).await {
            self.cached = Some(state.clone());
            return state.track_fingerprints;
        }

        tracing::warn!(path = %self.state_path.display(), "library state unreadable, attempting backup recovery");
        if let Some(state) = self.try_read(&self.backup_path.clone()).await {
            self.cached = Some(state.clone());
            return state.track_fingerprints;
        }

        tracing::warn!("backup library state also unreadable; continuing with empty state");
        HashMap::new()
    }

    async fn try_read(&self, path: &Path) -> Option<LibraryState> {
        let bytes = tokio::fs::read(path).await.ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// `true` when there is no cached state, or `library_mod_time` is more
    /// recent than the cached state's timestamp.
    pub fn needs_refresh(&self, library_mod_time: Option<DateTime<Utc>>) -> bool {
        match (&self.cached, library_mod_time) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(state), Some(mod_time)) => mod_time > state.timestamp,
        }
    }

    /// Set arithmetic over two fingerprint maps, with the corruption guard:
    /// if the old library had at least [`CORRUPTION_MIN_LIBRARY_SIZE`]
    /// tracks and more than [`CORRUPTION_CHANGE_RATIO`] of them changed,
    /// this fails with [`StateError::PossibleCorruption`] unless the total
    /// track count is unchanged, in which case it returns
    /// [`DiffOutcome::Rebuild`] (an intentional bulk replacement).
    pub fn diff(
        old: &HashMap<String, String>,
        new: &HashMap<String, String>,
    ) -> Result<DiffOutcome, StateError> {
        let old_keys: HashSet<&String> = old.keys().collect();
        let new_keys: HashSet<&String> = new.keys().collect();

        let deleted: HashSet<String> = old_keys
            .difference(&new_keys)
            .map(|s| (*s).clone())
            .collect();
        let added: HashSet<String> = new_keys
            .difference(&old_keys)
            .map(|s| (*s).clone())
            .collect();
        let modified: HashSet<String> = old_keys
            .intersection(&new_keys)
            .filter(|id| old[**id] != new[**id])
            .map(|s| (*s).clone())
            .collect();

        let changed = deleted.len() + added.len() + modified.len();
        if !old.is_empty() && old.len() >= CORRUPTION_MIN_LIBRARY_SIZE {
            let ratio = changed as f64 / old.len() as f64;
            if ratio > CORRUPTION_CHANGE_RATIO {
                if old.len() == new.len() {
                    return Ok(DiffOutcome::Rebuild);
                }
                return Err(StateError::PossibleCorruption {
                    changed,
                    old_total: old.len(),
                    ratio: ratio * 100.0,
                });
            }
        }

        Ok(DiffOutcome::Changes(ChangeSet {
            added,
            modified,
            deleted,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str, pid: &str) -> TrackForFingerprint {
        TrackForFingerprint {
            track_id: id.to_string(),
            attrs: TrackAttrs {
                persistent_id: Some(pid.to_string()),
                location: Some(format!("/music/{id}.m4a")),
                ..Default::default()
            },
        }
    }

    #[test]
    fn diff_of_identical_states_is_empty() {
        let mut state = HashMap::new();
        state.insert("1".to_string(), "abc".to_string());
        match LibraryStateManager::diff(&state, &state).unwrap() {
            DiffOutcome::Changes(cs) => assert!(cs.is_empty()),
            DiffOutcome::Rebuild => panic!("unexpected rebuild"),
        }
    }

    #[test]
    fn diff_sets_are_disjoint() {
        let mut old = HashMap::new();
        old.insert("1".to_string(), "a".to_string());
        old.insert("2".to_string(), "b".to_string());
        let mut new = HashMap::new();
        new.insert("2".to_string(), "b2".to_string());
        new.insert("3".to_string(), "c".to_string());

        match LibraryStateManager::diff(&old, &new).unwrap() {
            DiffOutcome::Changes(cs) => {
                assert_eq!(cs.deleted, HashSet::from(["1".to_string()]));
                assert_eq!(cs.added, HashSet::from(["3".to_string()]));
                assert_eq!(cs.modified, HashSet::from(["2".to_string()]));
            }
            DiffOutcome::Rebuild => panic!("unexpected rebuild"),
        }
    }

    #[test]
    fn corruption_guard_triggers_above_90_percent_with_size_change() {
        let old: HashMap<String, String> = (0..60)
            .map(|i| (i.to_string(), format!("fp{i}")))
            .collect();
        // Delete 56 of 60 (>90%) and shrink the library.
        let new: HashMap<String, String> = (0..4).map(|i| (i.to_string(), format!("fp{i}"))).collect();
        let err = LibraryStateManager::diff(&old, &new).unwrap_err();
        assert!(matches!(err, StateError::PossibleCorruption { .. }));
    }

    #[test]
    fn corruption_guard_signals_rebuild_when_size_is_unchanged() {
        let old: HashMap<String, String> = (0..60)
            .map(|i| (i.to_string(), format!("fp{i}")))
            .collect();
        // Same 60 ids, all fingerprints changed -> intentional rebuild.
        let new: HashMap<String, String> = (0..60)
            .map(|i| (i.to_string(), format!("newfp{i}")))
            .collect();
        match LibraryStateManager::diff(&old, &new).unwrap() {
            DiffOutcome::Rebuild => {}
            DiffOutcome::Changes(_) => panic!("expected rebuild signal"),
        }
    }

    #[test]
    fn corruption_guard_does_not_trigger_at_exactly_90_percent() {
        let old: HashMap<String, String> = (0..50)
            .map(|i| (i.to_string(), format!("fp{i}")))
            .collect();
        // 45/50 = 90% changed (not > 90%), and library shrinks by 5.
        let mut new: HashMap<String, String> = (5..50).map(|i| (i.to_string(), format!("newfp{i}"))).collect();
        new.insert("dummy".to_string(), "x".to_string());
        let result = LibraryStateManager::diff(&old, &new);
        assert!(result.is_ok());
    }

    #[test]
    fn build_state_tolerates_under_10_percent_failures() {
        let mut tracks: Vec<TrackForFingerprint> = (0..20).map(|i| track(&i.to_string(), "pid")).collect();
        tracks.push(TrackForFingerprint {
            track_id: "bad".to_string(),
            attrs: TrackAttrs::default(),
        });
        let result = build_state(&tracks);
        assert!(result.is_ok());
    }

    #[test]
    fn build_state_fails_above_10_percent_failures() {
        let mut tracks: Vec<TrackForFingerprint> = (0..5).map(|i| track(&i.to_string(), "pid")).collect();
        for i in 0..3 {
            tracks.push(TrackForFingerprint {
                track_id: format!("bad{i}"),
                attrs: TrackAttrs::default(),
            });
        }
        assert!(matches!(build_state(&tracks), Err(StateError::HighFailureRate { .. })));
    }

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut manager = LibraryStateManager::new(&path);

        let mut fps = HashMap::new();
        fps.insert("1".to_string(), "abc123".to_string());
        manager.save(LibraryState::new(fps.clone(), None)).await.unwrap();

        let mut reloaded = LibraryStateManager::new(&path);
        let loaded = reloaded.load().await;
        assert_eq!(loaded, fps);
    }

    #[tokio::test]
    async fn corrupt_state_falls_back_to_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut manager = LibraryStateManager::new(&path);

        let mut fps = HashMap::new();
        fps.insert("1".to_string(), "abc123".to_string());
        manager.save(LibraryState::new(fps.clone(), None)).await.unwrap();
        // second save creates a backup of the first
        manager.save(LibraryState::new(HashMap::new(), None)).await.unwrap();

        tokio::fs::write(&path, b"not json").await.unwrap();

        let mut reloaded = LibraryStateManager::new(&path);
        let loaded = reloaded.load().await;
        // backup holds the first save (non-empty fps)
        assert_eq!(loaded, fps);
    }
}
