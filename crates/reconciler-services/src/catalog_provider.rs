//! The external catalog API contract. Implementations wrap a
//! real MusicBrainz-/Discogs-/iTunes-/Last.fm-class HTTP client; this crate
//! only defines the trait they must satisfy and the candidate shape the
//! scorer consumes.

use async_trait::async_trait;
use reconciler_scoring::CandidateRelease;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogApiError {
    #[error("request to '{source}' failed: {message}")]
    RequestFailed { source: String, message: String },
    #[error("request to '{source}' timed out")]
    Timeout { source: String },
}

/// A provider's direct year answer, ahead of (or instead of) returning raw
/// candidates for scoring: some providers are confident enough to short-
/// circuit, via `get_album_year`.
#[derive(Debug, Clone)]
pub struct ProviderYearAnswer {
    pub year: Option<i32>,
    pub definitive: bool,
    pub score_hint: i32,
}

/// A single catalog API provider. Each provider both surfaces a quick
/// `get_album_year` answer and, via `candidate_releases`, raw release
/// candidates for the scorer to rank.
#[async_trait]
pub trait CatalogApiProvider: Send + Sync {
    /// A stable identifier matching the scorer's `source` field
    /// (`"musicbrainz"`, `"discogs"`, `"itunes"`, `"lastfm"`, ...).
    fn source_tag(&self) -> &str;

    /// This provider's priority in the fan-out order; lower sorts first.
    fn priority(&self) -> u8;

    async fn get_album_year(
        &self,
        artist: &str,
        album: &str,
        existing_year: Option<&str>,
    ) -> Result<ProviderYearAnswer, CatalogApiError>;

    async fn candidate_releases(
        &self,
        artist: &str,
        album: &str,
    ) -> Result<Vec<CandidateRelease>, CatalogApiError>;
}
