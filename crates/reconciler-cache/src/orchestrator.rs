//! Single façade over the three cache layers plus the change-event bus.
//! Downstream callers hold a reference only to this orchestrator — never to
//! the individual cache stores, which are exclusively owned here.
//!
//! Grounded on `examples/original_source/src/services/cache/cache_orchestrator.py`'s
//! `CacheOrchestrator`: the track-update notification path, coordinated
//! flush of the persistent stores, and the dispatch of change events to
//! subscribers without those subscribers holding a back-reference.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::album_year_cache::AlbumYearCache;
use crate::api_response_cache::ApiResponseCache;
use crate::events::{ChangeEvent, ChangeEventBus};
use crate::invalidation::{
    direct_track_key, processed_track_key, CacheError, ExecuteError, Invalidatable,
    InvalidationEngine, InvalidationPlan, InvalidationReport,
};
use crate::ttl_cache::TtlCache;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    AlbumYear(#[from] crate::album_year_cache::AlbumYearError),
    #[error(transparent)]
    ApiResponse(#[from] crate::api_response_cache::ApiResponseError),
}

/// The subset of a track's fields the orchestrator needs to invalidate its
/// caches after an update; the full `Track` type lives in the services
/// crate, which depends on this one and not the reverse.
#[derive(Debug, Clone)]
pub struct TrackSnapshot {
    pub track_id: String,
    pub artist: String,
    pub album: String,
}

pub struct CacheOrchestratorConfig {
    pub generic_default_ttl: Duration,
    pub album_year_cache_path: PathBuf,
    pub api_response_cache_path: PathBuf,
    pub api_failed_ttl: Duration,
    pub max_background_tasks: usize,
}

/// Owns the generic TTL cache, album-year cache, API-response cache, the
/// invalidation engine, and the change-event bus. All cache mutation flows
/// through this type.
pub struct CacheOrchestrator {
    generic: TtlCache<serde_json::Value>,
    album_year: AlbumYearCache,
    api_response: ApiResponseCache,
    invalidation: InvalidationEngine,
    events: ChangeEventBus,
}

impl CacheOrchestrator {
    pub fn new(config: CacheOrchestratorConfig) -> Self {
        Self {
            generic: TtlCache::new(config.generic_default_ttl),
            album_year: AlbumYearCache::new(config.album_year_cache_path),
            api_response: ApiResponseCache::new(config.api_response_cache_path, config.api_failed_ttl),
            invalidation: InvalidationEngine::new(),
            events: ChangeEventBus::new(config.max_background_tasks),
        }
    }

    pub async fn load_persistent_stores(&mut self) -> Result<(), OrchestratorError> {
        self.album_year.load().await?;
        self.api_response.load().await?;
        Ok(())
    }

    /// Coordinated flush: both persistent stores are written, in sequence
    /// (the serial scheduler is the only synchronization the shared-resource
    /// policy requires).
    pub async fn flush_all(&self) -> Result<(), OrchestratorError> {
        self.album_year.flush().await?;
        self.api_response.flush().await?;
        Ok(())
    }

    pub fn invalidation_engine_mut(&mut self) -> &mut InvalidationEngine {
        &mut self.invalidation
    }

    pub fn generic(&self) -> &TtlCache<serde_json::Value> {
        &self.generic
    }

    pub fn album_year(&mut self) -> &mut AlbumYearCache {
        &mut self.album_year
    }

    pub fn api_response(&mut self) -> &mut ApiResponseCache {
        &mut self.api_response
    }

    /// Splits the two persistent caches into disjoint mutable borrows, for
    /// callers (the year determinator) that need both at once -- a single
    /// `&mut self` method can't hand out two overlapping borrows otherwise.
    pub fn album_year_and_api_response(&mut self) -> (&mut AlbumYearCache, &mut ApiResponseCache) {
        (&mut self.album_year, &mut self.api_response)
    }

    pub fn subscribe(&mut self, subscriber: std::sync::Arc<dyn crate::events::ChangeSubscriber>) {
        self.events.subscribe(subscriber);
    }

    /// Caches a `Serialize`-able value behind the generic layer's
    /// `get_async` pattern, but synchronously: callers that already have a
    /// value just want it stored under `key`.
    pub fn cache_value(&self, key: &str, value: &impl Serialize, ttl: Option<Duration>) {
        let json = serde_json::to_value(value).expect("value always serializes");
        self.generic.set(key.to_string(), json, ttl);
    }

    /// After a successful track update: invalidates this track's direct and
    /// processed-track keys in the generic cache, and notifies subscribers
    /// via the event bus.
    pub async fn invalidate_for_track(&self, track: &TrackSnapshot, removed: bool) {
        self.generic.invalidate(&direct_track_key(&track.track_id));
        self.generic.invalidate(&processed_track_key(&track.track_id));

        let event = if removed {
            ChangeEvent::TrackRemoved { track_id: track.track_id.clone() }
        } else {
            ChangeEvent::TrackModified { track_id: track.track_id.clone() }
        };
        self.events.publish(event).await;
    }

    /// Builds and executes an invalidation plan for a library changeset,
    /// running through this orchestrator's `Invalidatable` adapter.
    pub async fn apply_changeset(
        &self,
        changes: &crate::library_state::ChangeSet,
        execute_all: bool,
    ) -> Result<InvalidationReport, ExecuteError> {
        let plan = self.invalidation.plan(changes);
        self.execute_plan(&plan, execute_all).await
    }

    pub async fn execute_plan(
        &self,
        plan: &InvalidationPlan,
        execute_all: bool,
    ) -> Result<InvalidationReport, ExecuteError> {
        self.invalidation.execute(plan, self, execute_all).await
    }
}

#[async_trait]
impl Invalidatable for CacheOrchestrator {
    /// Dispatches by key shape: the `ALL` sentinel and direct/processed
    /// track keys live in the generic cache; any other key is treated as a
    /// dependency-pattern key and also routed to the generic cache, since
    /// aggregate query results are the only thing dependency patterns name.
    async fn invalidate(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.generic.invalidate(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChangeSubscriber;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct CountingSubscriber {
        count: Arc<AtomicU32>,
    }

    #[async_trait]
    impl ChangeSubscriber for CountingSubscriber {
        async fn on_event(&self, _event: ChangeEvent) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn orchestrator(dir: &std::path::Path) -> CacheOrchestrator {
        CacheOrchestrator::new(CacheOrchestratorConfig {
            generic_default_ttl: Duration::from_secs(60),
            album_year_cache_path: dir.join("album_years.json"),
            api_response_cache_path: dir.join("api_cache.json"),
            api_failed_ttl: Duration::from_secs(86400),
            max_background_tasks: 10,
        })
    }

    #[tokio::test]
    async fn invalidate_for_track_notifies_subscribers() {
        let dir = tempfile::tempdir().unwrap();
        let mut orch = orchestrator(dir.path());
        let count = Arc::new(AtomicU32::new(0));
        orch.subscribe(Arc::new(CountingSubscriber { count: count.clone() }));

        let track = TrackSnapshot {
            track_id: "t1".into(),
            artist: "A".into(),
            album: "B".into(),
        };
        orch.invalidate_for_track(&track, false).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn apply_changeset_executes_generic_invalidation() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(dir.path());
        orch.cache_value(&direct_track_key("t1"), &"value", None);

        let changes = crate::library_state::ChangeSet {
            deleted: std::collections::HashSet::from(["t1".to_string()]),
            ..Default::default()
        };
        let report = orch.apply_changeset(&changes, false).await.unwrap();
        assert!(report.succeeded.contains(&direct_track_key("t1")));
        assert!(orch.generic().get(&direct_track_key("t1")).is_none());
    }

    #[tokio::test]
    async fn flush_all_writes_both_persistent_stores() {
        let dir = tempfile::tempdir().unwrap();
        let mut orch = orchestrator(dir.path());
        orch.album_year().store("A", "B", 2000, 90, None).unwrap();
        orch.flush_all().await.unwrap();
        assert!(dir.path().join("album_years.json").exists());
        assert!(dir.path().join("api_cache.json").exists());
    }
}
