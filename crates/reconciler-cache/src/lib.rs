//! Library-state tracking, invalidation, and the three coordinated cache
//! layers (generic TTL, album-year, API-response), fronted by a single
//! orchestrator and change-event bus.

pub mod album_year_cache;
pub mod api_response_cache;
pub mod events;
pub mod invalidation;
pub mod library_state;
pub mod orchestrator;
pub mod ttl_cache;

pub use album_year_cache::{AlbumYearCache, AlbumYearEntry, AlbumYearError};
pub use api_response_cache::{ApiResponseCache, ApiResponseError, CachedApiResult};
pub use events::{ChangeEvent, ChangeEventBus, ChangeSubscriber};
pub use invalidation::{InvalidationEngine, InvalidationPlan, InvalidationReport, Priority};
pub use library_state::{ChangeSet, LibraryState, LibraryStateManager, StateError};
pub use orchestrator::{CacheOrchestrator, CacheOrchestratorConfig, TrackSnapshot};
pub use ttl_cache::TtlCache;
