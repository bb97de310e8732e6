//! Persistent store of albums a prior run declined to write a year for,
//! keyed the same way as the album-year cache.
//!
//! Grounded on `examples/original_source/src/services/cache/album_year_cache.py`'s
//! sibling pending-verification table (same key hash, same atomic
//! temp-file-then-rename persistence as `AlbumYearCache`), with the reason
//! taxonomy pinned to the data model's reason set.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reconciler_core::keys::album_year_key;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PendingVerificationError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Why a prior run declined to write a year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail")]
pub enum PendingReason {
    SuspiciousYearChange,
    NoYearFound,
    ApiDisagreement,
    Other(String),
}

impl std::fmt::Display for PendingReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SuspiciousYearChange => write!(f, "suspicious_year_change"),
            Self::NoYearFound => write!(f, "no_year_found"),
            Self::ApiDisagreement => write!(f, "api_disagreement"),
            Self::Other(reason) => write!(f, "{reason}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingVerificationEntry {
    pub artist: String,
    pub album: String,
    pub reason: PendingReason,
    pub timestamp: DateTime<Utc>,
    pub metadata: HashMap<String, String>,
}

#[derive(Serialize, Deserialize, Default)]
struct PersistedFile {
    entries: HashMap<String, PendingVerificationEntry>,
}

/// Short-lived record store consulted by the year determinator's
/// pre-check 2 ("recently rejected") to short-circuit albums a prior run
/// already declined.
pub struct PendingVerificationStore {
    path: PathBuf,
    entries: HashMap<String, PendingVerificationEntry>,
}

impl PendingVerificationStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            entries: HashMap::new(),
        }
    }

    pub async fn load(&mut self) -> Result<(), PendingVerificationError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let file: PersistedFile = serde_json::from_slice(&bytes)?;
        self.entries = file.entries;
        Ok(())
    }

    pub async fn flush(&self) -> Result<(), PendingVerificationError> {
        let file = PersistedFile {
            entries: self.entries.clone(),
        };
        let json = serde_json::to_vec_pretty(&file)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Records a rejection for `(artist, album)`, replacing any prior entry.
    pub fn mark(
        &mut self,
        artist: &str,
        album: &str,
        reason: PendingReason,
        metadata: HashMap<String, String>,
    ) {
        let key = album_year_key(artist, album);
        self.entries.insert(
            key,
            PendingVerificationEntry {
                artist: artist.to_string(),
                album: album.to_string(),
                reason,
                timestamp: Utc::now(),
                metadata,
            },
        );
    }

    pub fn get(&self, artist: &str, album: &str) -> Option<&PendingVerificationEntry> {
        self.entries.get(&album_year_key(artist, album))
    }

    /// Clears a prior rejection, e.g. once a later run succeeds.
    pub fn clear(&mut self, artist: &str, album: &str) -> bool {
        self.entries.remove(&album_year_key(artist, album)).is_some()
    }

    /// `Some(entry)` when `(artist, album)` was rejected within
    /// `verification_period` of now; `None` once the period has elapsed
    /// (the album is due for re-verification) or if there is no entry.
    pub fn recently_rejected(
        &self,
        artist: &str,
        album: &str,
        verification_period: Duration,
    ) -> Option<&PendingVerificationEntry> {
        let entry = self.get(artist, album)?;
        let elapsed = Utc::now().signed_duration_since(entry.timestamp);
        let period = chrono::Duration::from_std(verification_period).unwrap_or_default();
        if elapsed < period {
            Some(entry)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_then_get_roundtrips() {
        let mut store = PendingVerificationStore::new("/tmp/x.json");
        store.mark("A", "B", PendingReason::NoYearFound, HashMap::new());
        assert_eq!(store.get("A", "B").unwrap().reason, PendingReason::NoYearFound);
    }

    #[test]
    fn recently_rejected_is_none_past_the_period() {
        let mut store = PendingVerificationStore::new("/tmp/x.json");
        store.mark("A", "B", PendingReason::SuspiciousYearChange, HashMap::new());
        if let Some(entry) = store.entries.get_mut(&album_year_key("A", "B")) {
            entry.timestamp = Utc::now() - chrono::Duration::hours(100);
        }
        assert!(store.recently_rejected("A", "B", Duration::from_secs(3600 * 72)).is_none());
    }

    #[test]
    fn recently_rejected_holds_within_the_period() {
        let mut store = PendingVerificationStore::new("/tmp/x.json");
        store.mark("A", "B", PendingReason::NoYearFound, HashMap::new());
        assert!(store.recently_rejected("A", "B", Duration::from_secs(3600 * 72)).is_some());
    }

    #[test]
    fn clear_removes_entry() {
        let mut store = PendingVerificationStore::new("/tmp/x.json");
        store.mark("A", "B", PendingReason::NoYearFound, HashMap::new());
        assert!(store.clear("A", "B"));
        assert!(store.get("A", "B").is_none());
    }

    #[tokio::test]
    async fn flush_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.json");
        let mut store = PendingVerificationStore::new(&path);
        store.mark("A", "B", PendingReason::ApiDisagreement, HashMap::new());
        store.flush().await.unwrap();

        let mut reloaded = PendingVerificationStore::new(&path);
        reloaded.load().await.unwrap();
        assert_eq!(reloaded.get("A", "B").unwrap().reason, PendingReason::ApiDisagreement);
    }
}
