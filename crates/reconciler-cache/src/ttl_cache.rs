//! Generic in-memory key/value cache with per-entry TTL, periodic cleanup,
//! and disk persistence.
//!
//! Grounded on `examples/original_source/src/services/cache/cache_manager.py`'s
//! `CacheManager` (the generic layer underneath the album-year and
//! API-response stores): `get`/`set`/`get_or_compute`, a background cleanup
//! loop, and save/load that drops already-expired entries on load.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum TtlCacheError {
    #[error("I/O error persisting cache: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

struct Entry<V> {
    value: V,
    /// `None` means no expiry (`ttl == 0` at `set` time).
    expires_at: Option<Instant>,
}

/// On-disk representation: expiry is stored as an absolute wall-clock time
/// so it survives a process restart, where `Instant` cannot be compared.
#[derive(Serialize, Deserialize)]
struct PersistedEntry<V> {
    value: V,
    expires_at: Option<DateTime<Utc>>,
}

/// A generic TTL-bounded cache. Concurrent-safe via `DashMap`; no caller
/// lock is required even though the broader system assumes a serial
/// scheduler, since this type may be shared across background cleanup and
/// orchestrator access.
pub struct TtlCache<V> {
    entries: DashMap<String, Entry<V>>,
    default_ttl: Duration,
    path: Option<PathBuf>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
            path: None,
        }
    }

    pub fn with_persistence(default_ttl: Duration, path: impl AsRef<Path>) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
            path: Some(path.as_ref().to_path_buf()),
        }
    }

    fn is_live(entry: &Entry<V>) -> bool {
        match entry.expires_at {
            Some(exp) => Instant::now() < exp,
            None => true,
        }
    }

    /// Returns the value if present and unexpired, else a miss. Expired
    /// entries are removed lazily on lookup.
    pub fn get(&self, key: &str) -> Option<V> {
        if let Some(entry) = self.entries.get(key) {
            if Self::is_live(&entry) {
                return Some(entry.value.clone());
            }
        }
        self.entries.remove(key);
        None
    }

    /// `ttl = Some(Duration::ZERO)` means no-expire; `None` uses the
    /// configured default TTL.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let expires_at = if ttl.is_zero() {
            None
        } else {
            Some(Instant::now() + ttl)
        };
        self.entries.insert(key.into(), Entry { value, expires_at });
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Removes every expired entry; returns the number removed.
    pub fn cleanup_expired(&self) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|e| !Self::is_live(e.value()))
            .map(|e| e.key().clone())
            .collect();
        for key in &expired {
            self.entries.remove(key);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Clone + Send + Sync + 'static> TtlCache<V> {
    /// On miss, invokes `compute` and stores the result with the default
    /// TTL before returning it.
    pub async fn get_async<F, Fut>(&self, key: &str, compute: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = V>,
    {
        if let Some(value) = self.get(key) {
            return value;
        }
        let value = compute().await;
        self.set(key, value.clone(), None);
        value
    }
}

impl<V: Clone + Serialize + DeserializeOwned> TtlCache<V> {
    /// Writes the live entry set to `path` (or the cache's configured
    /// persistence path) as JSON.
    pub async fn save_to(&self, path: &Path) -> Result<(), TtlCacheError> {
        let now = Instant::now();
        let wall_now = Utc::now();
        let mut persisted: HashMap<String, PersistedEntry<V>> = HashMap::new();
        for entry in self.entries.iter() {
            if !Self::is_live(entry.value()) {
                continue;
            }
            let expires_at = entry.value().expires_at.map(|exp| {
                let remaining = exp.saturating_duration_since(now);
                wall_now + chrono::Duration::from_std(remaining).unwrap_or_default()
            });
            persisted.insert(
                entry.key().clone(),
                PersistedEntry {
                    value: entry.value().value.clone(),
                    expires_at,
                },
            );
        }
        let json = serde_json::to_vec_pretty(&persisted)?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    pub async fn save(&self) -> Result<(), TtlCacheError> {
        let path = self
            .path
            .clone()
            .expect("save() requires a cache constructed with with_persistence");
        self.save_to(&path).await
    }

    /// Loads entries from `path`, dropping any already expired at load
    /// time. Missing files load as empty.
    pub async fn load_from(&self, path: &Path) -> Result<(), TtlCacheError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let persisted: HashMap<String, PersistedEntry<V>> = serde_json::from_slice(&bytes)?;
        let now_wall = Utc::now();
        let now_instant = Instant::now();
        for (key, entry) in persisted {
            let expires_at = match entry.expires_at {
                Some(exp) if exp <= now_wall => continue, // already expired, drop
                Some(exp) => {
                    let remaining = (exp - now_wall).to_std().unwrap_or_default();
                    Some(now_instant + remaining)
                }
                None => None,
            };
            self.entries.insert(key, Entry { value: entry.value, expires_at });
        }
        Ok(())
    }

    pub async fn load(&self) -> Result<(), TtlCacheError> {
        let path = self
            .path
            .clone()
            .expect("load() requires a cache constructed with with_persistence");
        self.load_from(&path).await
    }
}

/// Drives periodic cleanup on a configured interval until cancelled.
/// Skippable entirely by the caller simply never spawning this task
/// (`caching.cleanup_interval_seconds == 0` in configuration).
pub async fn run_cleanup_loop<V: Clone + Send + Sync + 'static>(
    cache: std::sync::Arc<TtlCache<V>>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let removed = cache.cleanup_expired();
        if removed > 0 {
            tracing::debug!(removed, "ttl cache cleanup removed expired entries");
        }
    }
}

/// Guards a cleanup loop so `.abort()` on drop, matching `Mutex`-free
/// ownership elsewhere in this crate: callers hold this instead of the raw
/// `JoinHandle` when they want cleanup tied to the orchestrator's lifetime.
pub struct CleanupHandle {
    handle: tokio::task::JoinHandle<()>,
}

impl CleanupHandle {
    pub fn spawn<V: Clone + Send + Sync + 'static>(
        cache: std::sync::Arc<TtlCache<V>>,
        interval: Duration,
    ) -> Self {
        let handle = tokio::spawn(run_cleanup_loop(cache, interval));
        Self { handle }
    }
}

impl Drop for CleanupHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Serializes concurrent save/load calls against the same path so at most
/// one writer touches a given file at a time, per the shared-resource
/// policy (serial scheduling rather than OS file locks).
pub type SaveLock = Mutex<()>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get_roundtrip() {
        let cache: TtlCache<String> = TtlCache::new(Duration::from_secs(60));
        cache.set("k", "v".to_string(), None);
        assert_eq!(cache.get("k"), Some("v".to_string()));
    }

    #[test]
    fn zero_ttl_never_expires() {
        let cache: TtlCache<i32> = TtlCache::new(Duration::from_secs(60));
        cache.set("k", 1, Some(Duration::ZERO));
        assert_eq!(cache.get("k"), Some(1));
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let cache: TtlCache<i32> = TtlCache::new(Duration::from_millis(1));
        cache.set("k", 1, Some(Duration::from_millis(1)));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn invalidate_then_get_is_a_miss() {
        let cache: TtlCache<i32> = TtlCache::new(Duration::from_secs(60));
        cache.set("k", 1, None);
        assert!(cache.invalidate("k"));
        assert_eq!(cache.get("k"), None);
    }

    #[tokio::test]
    async fn get_async_computes_only_on_miss() {
        use std::sync::atomic::{AtomicU32, Ordering};
        let cache: TtlCache<i32> = TtlCache::new(Duration::from_secs(60));
        let calls = AtomicU32::new(0);

        let first = cache
            .get_async("k", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                42
            })
            .await;
        let second = cache
            .get_async("k", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                99
            })
            .await;

        assert_eq!(first, 42);
        assert_eq!(second, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let cache: TtlCache<String> = TtlCache::new(Duration::from_secs(60));
        cache.set("a", "1".to_string(), None);
        cache.save_to(&path).await.unwrap();

        let loaded: TtlCache<String> = TtlCache::new(Duration::from_secs(60));
        loaded.load_from(&path).await.unwrap();
        assert_eq!(loaded.get("a"), Some("1".to_string()));
    }

    #[tokio::test]
    async fn load_drops_already_expired_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let persisted: HashMap<String, PersistedEntry<String>> = HashMap::from([(
            "stale".to_string(),
            PersistedEntry {
                value: "x".to_string(),
                expires_at: Some(Utc::now() - chrono::Duration::seconds(10)),
            },
        )]);
        tokio::fs::write(&path, serde_json::to_vec(&persisted).unwrap())
            .await
            .unwrap();

        let cache: TtlCache<String> = TtlCache::new(Duration::from_secs(60));
        cache.load_from(&path).await.unwrap();
        assert_eq!(cache.get("stale"), None);
    }
}
