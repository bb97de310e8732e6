//! Persistent store of raw external-API answers keyed by
//! `(artist, album, source)`, with two TTL classes: successful lookups are
//! effectively eternal, failed lookups expire quickly.
//!
//! Grounded on `examples/original_source/src/services/cache/api_cache.py`'s
//! `APIResponseCache`: the eternal-vs-short-TTL policy split on
//! `success`/`year`, and silent eviction of a corrupted/type-mismatched
//! entry rather than surfacing a deserialization error to the caller.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reconciler_core::keys::api_response_key;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiResponseError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedApiResult {
    pub artist: String,
    pub album: String,
    pub source: String,
    pub year: Option<i32>,
    pub success: bool,
    pub api_response: Option<serde_json::Value>,
    pub metadata: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl CachedApiResult {
    pub fn new(artist: impl Into<String>, album: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            album: album.into(),
            source: source.into(),
            year: None,
            success: false,
            api_response: None,
            metadata: HashMap::new(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Clone)]
struct StoredEntry {
    /// Raw JSON so a type mismatch on deserialize can be handled as a
    /// silent eviction rather than a hard error at `get` time.
    raw: serde_json::Value,
    /// `None` for successful (eternal) entries; `Some` for failed entries,
    /// expiring `failed_ttl` after `timestamp`.
    expires_at: Option<DateTime<Utc>>,
}

/// Persistent API-response cache. A confirmed year is a fact about
/// history — repeated network traffic to re-confirm it is waste, so
/// successful entries never expire on age; a failed lookup may become a
/// success once the remote catalog improves, so those expire quickly.
pub struct ApiResponseCache {
    path: PathBuf,
    entries: HashMap<String, StoredEntry>,
    failed_ttl: Duration,
}

impl ApiResponseCache {
    pub fn new(path: impl AsRef<Path>, failed_ttl: Duration) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            entries: HashMap::new(),
            failed_ttl,
        }
    }

    pub async fn load(&mut self) -> Result<(), ApiResponseError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let raw_map: HashMap<String, serde_json::Value> = serde_json::from_slice(&bytes)?;
        for (key, value) in raw_map {
            let expires_at = value
                .get("_expires_at")
                .and_then(|v| v.as_str())
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc));
            self.entries.insert(key, StoredEntry { raw: value, expires_at });
        }
        Ok(())
    }

    pub async fn flush(&self) -> Result<(), ApiResponseError> {
        let mut raw_map = HashMap::with_capacity(self.entries.len());
        for (key, entry) in &self.entries {
            let mut value = entry.raw.clone();
            if let (Some(obj), Some(exp)) = (value.as_object_mut(), entry.expires_at) {
                obj.insert("_expires_at".to_string(), serde_json::Value::String(exp.to_rfc3339()));
            }
            raw_map.insert(key.clone(), value);
        }
        let json = serde_json::to_vec_pretty(&raw_map)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Returns the stored result for `key` if present, unexpired, and
    /// well-formed. A type mismatch (the stored JSON no longer deserializes
    /// as `CachedApiResult`) or an expired failed entry both evict the
    /// entry silently and return a miss.
    pub fn get(&mut self, key: &str) -> Option<CachedApiResult> {
        let Some(entry) = self.entries.get(key).cloned() else {
            return None;
        };

        if let Some(expires_at) = entry.expires_at {
            if Utc::now() > expires_at {
                self.entries.remove(key);
                return None;
            }
        }

        match serde_json::from_value::<CachedApiResult>(entry.raw.clone()) {
            Ok(result) => Some(result),
            Err(_) => {
                tracing::debug!(key, "evicting type-mismatched API cache entry");
                self.entries.remove(key);
                None
            }
        }
    }

    /// `is_success` entries are stored with no expiry; failures expire
    /// `failed_ttl` after now.
    pub fn set(&mut self, key: impl Into<String>, result: CachedApiResult, is_success: bool) {
        let expires_at = if is_success { None } else { Some(Utc::now() + chrono::Duration::from_std(self.failed_ttl).unwrap_or_default()) };
        let raw = serde_json::to_value(&result).expect("CachedApiResult always serializes");
        self.entries.insert(key.into(), StoredEntry { raw, expires_at });
    }

    /// Scans and removes every cached entry for `(artist, album)` across
    /// all sources.
    pub fn invalidate_for_album(&mut self, artist: &str, album: &str) -> usize {
        let to_remove: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| {
                e.raw.get("artist").and_then(|v| v.as_str()) == Some(artist)
                    && e.raw.get("album").and_then(|v| v.as_str()) == Some(album)
            })
            .map(|(k, _)| k.clone())
            .collect();
        let count = to_remove.len();
        for key in to_remove {
            self.entries.remove(&key);
        }
        count
    }

    /// Removes only expired *failed* entries; successful results persist
    /// indefinitely regardless of age.
    pub fn cleanup_expired_failed(&mut self) -> usize {
        let now = Utc::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| matches!(e.expires_at, Some(exp) if now > exp))
            .map(|(k, _)| k.clone())
            .collect();
        let count = expired.len();
        for key in expired {
            self.entries.remove(&key);
        }
        count
    }

    pub fn key_for(&self, source: &str, url: &str, params: &[(String, String)]) -> String {
        api_response_key(source, url, params)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
