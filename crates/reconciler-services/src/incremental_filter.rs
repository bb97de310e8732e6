//! Selects the subset of tracks a run actually touches: an optional
//! test-artist allowlist for development, plus fingerprint-based skipping
//! of albums whose tracks are unchanged since the last snapshot.
//!
//! Grounded on the library-snapshot/changeset shape in
//! `reconciler_cache::library_state` and the
//! `development.test_artists` / `library_snapshot.enabled` keys.

use std::collections::HashSet;

use reconciler_cache::ChangeSet;

use crate::track::Track;

/// Development-only allowlist: when non-empty, only tracks whose artist
/// matches (case-insensitively) are considered. Empty means "no filter" --
/// the common, non-development case.
#[derive(Debug, Clone, Default)]
pub struct TestArtistFilter {
    pub artists: Vec<String>,
}

impl TestArtistFilter {
    pub fn new(artists: Vec<String>) -> Self {
        Self { artists }
    }

    pub fn matches(&self, artist: &str) -> bool {
        if self.artists.is_empty() {
            return true;
        }
        self.artists.iter().any(|a| a.eq_ignore_ascii_case(artist))
    }
}

/// Gates fingerprint-based scan skipping: when enabled, a track whose id is
/// absent from the changeset's `added`/`modified` sets is assumed unchanged
/// since the last snapshot and is skipped outright.
#[derive(Debug, Clone, Copy, Default)]
pub struct LibrarySnapshotPolicy {
    pub enabled: bool,
}

/// Combines the test-artist allowlist and library-snapshot skip policy into
/// a single "should this run touch this track" predicate.
pub struct IncrementalFilter {
    pub test_artists: TestArtistFilter,
    pub snapshot_policy: LibrarySnapshotPolicy,
}

impl IncrementalFilter {
    pub fn new(test_artists: TestArtistFilter, snapshot_policy: LibrarySnapshotPolicy) -> Self {
        Self { test_artists, snapshot_policy }
    }

    /// `true` if `track` should be processed this run: it passes the
    /// test-artist allowlist, and either the snapshot policy is disabled or
    /// the changeset names it as added/modified.
    pub fn should_process(&self, track: &Track, changes: &ChangeSet) -> bool {
        if !self.test_artists.matches(&track.artist) {
            return false;
        }
        if !self.snapshot_policy.enabled {
            return true;
        }
        changes.added.contains(&track.id) || changes.modified.contains(&track.id)
    }

    /// Filters `tracks` down to the subset this run should process,
    /// preserving order.
    pub fn select<'a>(&self, tracks: &'a [Track], changes: &ChangeSet) -> Vec<&'a Track> {
        tracks.iter().filter(|t| self.should_process(t, changes)).collect()
    }

    /// Groups a track id set by album key `(artist, album)`, used to decide
    /// whether an entire album can be skipped as a unit once every one of
    /// its tracks is filtered out.
    pub fn distinct_albums<'a>(tracks: &[&'a Track]) -> HashSet<(&'a str, &'a str)> {
        tracks.iter().map(|t| (t.artist.as_str(), t.album.as_str())).collect()
    }
}
