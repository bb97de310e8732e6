//! Persistent `(artist, album) -> year + confidence` store.
//!
//! Grounded on `examples/original_source/src/services/cache/album_year_cache.py`'s
//! `AlbumYearCache`: keyed by the canonical `artist|album` hash, unbounded
//! lifetime for stored years, and invalidation that publishes an
//! `AlbumInvalidated` event rather than calling back into the orchestrator.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Utc};
use reconciler_core::keys::album_year_key;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::ChangeEvent;

#[derive(Debug, Error)]
pub enum AlbumYearError {
    #[error("year {0} is outside the valid range [1900, current_year+1]")]
    InvalidYear(i32),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumYearEntry {
    pub artist: String,
    pub album: String,
    pub year: i32,
    pub confidence: u8,
    pub timestamp: DateTime<Utc>,
    pub source_tag: Option<String>,
}

/// On-disk format version tag, bumped if the wire format ever changes.
const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct PersistedFile {
    version: u32,
    entries: HashMap<String, AlbumYearEntry>,
}

/// Persistent album-year store. Mutations go entirely through this type;
/// persistence is explicit (`flush`), matching the "single writer per file"
/// shared-resource policy enforced by serial scheduling upstream.
pub struct AlbumYearCache {
    path: PathBuf,
    entries: HashMap<String, AlbumYearEntry>,
}

impl AlbumYearCache {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            entries: HashMap::new(),
        }
    }

    pub async fn load(&mut self) -> Result<(), AlbumYearError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let file: PersistedFile = serde_json::from_slice(&bytes)?;
        self.entries = file.entries;
        Ok(())
    }

    /// Atomic temp-file-then-rename write of the full entry map.
    pub async fn flush(&self) -> Result<(), AlbumYearError> {
        let file = PersistedFile {
            version: FORMAT_VERSION,
            entries: self.entries.clone(),
        };
        let json = serde_json::to_vec_pretty(&file)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    pub fn get(&self, artist: &str, album: &str) -> Option<i32> {
        self.entries.get(&album_year_key(artist, album)).map(|e| e.year)
    }

    pub fn get_entry(&self, artist: &str, album: &str) -> Option<&AlbumYearEntry> {
        self.entries.get(&album_year_key(artist, album))
    }

    /// Replaces any existing entry. Rejects years outside
    /// `[1900, current_year + 1]`.
    pub fn store(
        &mut self,
        artist: &str,
        album: &str,
        year: i32,
        confidence: u8,
        source_tag: Option<String>,
    ) -> Result<(), AlbumYearError> {
        let current_year = Utc::now().year();
        if year < 1900 || year > current_year + 1 {
            return Err(AlbumYearError::InvalidYear(year));
        }
        let key = album_year_key(artist, album);
        self.entries.insert(
            key,
            AlbumYearEntry {
                artist: artist.to_string(),
                album: album.to_string(),
                year,
                confidence: confidence.min(100),
                timestamp: Utc::now(),
                source_tag,
            },
        );
        Ok(())
    }

    /// Removes the entry for `(artist, album)` and returns an
    /// `AlbumInvalidated` event to publish, if the entry existed.
    pub fn invalidate(&mut self, artist: &str, album: &str) -> Option<ChangeEvent> {
        let key = album_year_key(artist, album);
        self.entries.remove(&key).map(|_| ChangeEvent::AlbumInvalidated {
            artist: artist.to_string(),
            album: album.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_then_get_roundtrips() {
        let mut cache = AlbumYearCache::new("/tmp/does-not-matter.json");
        cache.store("The Beatles", "Abbey Road", 1969, 95, None).unwrap();
        assert_eq!(cache.get("The Beatles", "Abbey Road"), Some(1969));
    }

    #[test]
    fn year_below_1900_is_rejected() {
        let mut cache = AlbumYearCache::new("/tmp/x.json");
        assert!(cache.store("A", "B", 1899, 50, None).is_err());
    }

    #[test]
    fn year_at_1900_is_accepted() {
        let mut cache = AlbumYearCache::new("/tmp/x.json");
        assert!(cache.store("A", "B", 1900, 50, None).is_ok());
    }

    #[test]
    fn current_year_plus_one_is_accepted_but_plus_two_rejected() {
        let mut cache = AlbumYearCache::new("/tmp/x.json");
        let next = Utc::now().year() + 1;
        assert!(cache.store("A", "B", next, 50, None).is_ok());
        assert!(cache.store("A", "B2", next + 1, 50, None).is_err());
    }

    #[test]
    fn invalidate_then_get_is_a_miss() {
        let mut cache = AlbumYearCache::new("/tmp/x.json");
        cache.store("A", "B", 2000, 80, None).unwrap();
        assert!(cache.invalidate("A", "B").is_some());
        assert_eq!(cache.get("A", "B"), None);
    }

    #[test]
    fn invalidate_of_missing_entry_returns_none() {
        let mut cache = AlbumYearCache::new("/tmp/x.json");
        assert!(cache.invalidate("A", "B").is_none());
    }

    #[tokio::test]
    async fn flush_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("album_years.json");

        let mut cache = AlbumYearCache::new(&path);
        cache.store("Pink Floyd", "The Wall", 1979, 99, Some("musicbrainz".into())).unwrap();
        cache.flush().await.unwrap();

        let mut reloaded = AlbumYearCache::new(&path);
        reloaded.load().await.unwrap();
        assert_eq!(reloaded.get("Pink Floyd", "The Wall"), Some(1979));
    }
}
