//! Per-album year determination pipeline: pre-checks, cache probe, API
//! fan-out, scoring, decision rules, and the dominant-year fallback.
//!
//! Grounded on `examples/original_source/tests/unit/core/tracks/test_year_determination_skip.py`
//! and `test_year_retriever_allure.py` for the pre-check ordering and skip
//! reasons, and `examples/original_source/src/services/api/year_scoring.py`
//! for how a scored candidate list becomes a single accepted year. The
//! "parity threshold" / "dominance min share" fallback constants are pinned
//! per the dominant-year fallback policy (defaults 2 and 0.6).

use std::collections::HashMap;
use std::time::Duration;

use reconciler_cache::{AlbumYearCache, ApiResponseCache, CachedApiResult};
use reconciler_core::error_metrics::{ErrorEvent, ErrorMetricsCollector};
use reconciler_core::keys::api_response_key;
use reconciler_core::retry::{execute_with_retry, is_transient_message, Attempt, RetryError, RetryPolicy};
use reconciler_scoring::{ArtistPeriodContext, CandidateRelease, ReleaseScorer};

use crate::catalog_provider::CatalogApiProvider;
use crate::pending_verification::{PendingReason, PendingVerificationStore};
use crate::track::Track;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyProcessed,
    RecentlyRejected(String),
    YearConsistent,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyProcessed => write!(f, "already_processed"),
            Self::RecentlyRejected(reason) => write!(f, "recently_rejected:{reason}"),
            Self::YearConsistent => write!(f, "year_consistent"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeterminationOutcome {
    /// A pre-check short-circuited the pipeline before any API call.
    Skipped(SkipReason),
    /// The cache or the scored API fan-out produced a confident year.
    Written {
        year: i32,
        confidence: u8,
        source_tag: Option<String>,
    },
    /// The new candidate year differs too much from the library's existing
    /// year, or no year could be determined at all; nothing was written.
    PendingVerification(PendingReason),
    /// A positive-scoring candidate existed but fell below the definitive
    /// threshold without triggering the suspicious-change guard. Left
    /// unresolved for a future run rather than consuming a pending-
    /// verification slot (see DESIGN.md's resolution of this open case).
    Inconclusive,
}

#[derive(Debug, Clone)]
pub struct YearDeterminatorConfig {
    pub definitive_threshold: i32,
    pub suspicious_delta: i32,
    pub min_valid_year: i32,
    pub pending_verification_period: Duration,
    pub dominant_year_parity_threshold: usize,
    pub dominant_year_min_share: f64,
    pub force: bool,
}

impl Default for YearDeterminatorConfig {
    fn default() -> Self {
        Self {
            definitive_threshold: 85,
            suspicious_delta: 5,
            min_valid_year: 1900,
            pending_verification_period: Duration::from_secs(3600 * 24 * 7),
            dominant_year_parity_threshold: 2,
            dominant_year_min_share: 0.6,
            force: false,
        }
    }
}

/// Dominant-year fallback: selects a year `y` when `count(y) >=
/// parity_threshold` and `count(y) / total >= dominance_min_share`. Ties
/// broken by earlier year.
pub fn dominant_year_fallback(
    tracks: &[Track],
    parity_threshold: usize,
    dominance_min_share: f64,
) -> Option<i32> {
    let mut counts: HashMap<i32, usize> = HashMap::new();
    let mut total = 0usize;
    for track in tracks {
        if let Some(year) = track.year.as_ref().and_then(|y| y.parse::<i32>().ok()) {
            *counts.entry(year).or_insert(0) += 1;
            total += 1;
        }
    }
    if total == 0 {
        return None;
    }

    counts
        .into_iter()
        .filter(|(_, count)| {
            *count >= parity_threshold && (*count as f64 / total as f64) >= dominance_min_share
        })
        .min_by_key(|(year, count)| (std::cmp::Reverse(*count), *year))
        .map(|(year, _)| year)
}

fn fan_out_key(source: &str, artist: &str, album: &str) -> String {
    api_response_key(
        source,
        "candidate_releases",
        &[("artist".to_string(), artist.to_string()), ("album".to_string(), album.to_string())],
    )
}

/// Queries one provider through [`execute_with_retry`], classifying a
/// `CatalogApiError` as transient purely from its message text (timeouts and
/// connection-shaped failures retry; anything else is permanent after the
/// first attempt).
async fn fetch_candidates_with_retry(
    provider: &(dyn CatalogApiProvider + '_),
    artist: &str,
    album: &str,
    retry_policy: &RetryPolicy,
) -> Result<Vec<CandidateRelease>, RetryError<crate::catalog_provider::CatalogApiError>> {
    execute_with_retry(provider.source_tag(), retry_policy.clone(), |_attempt| async move {
        match provider.candidate_releases(artist, album).await {
            Ok(candidates) => Attempt::Success(candidates),
            Err(err) => {
                let message = err.to_string();
                if is_transient_message(&message, None) {
                    Attempt::Transient(err)
                } else {
                    Attempt::Permanent(err)
                }
            }
        }
    })
    .await
}

/// Queries `providers` in priority order (lowest `priority()` first),
/// reusing the API-response cache's eternal/short-TTL split so a source
/// already confirmed for this album is never re-queried. Returns the
/// highest-scoring non-zero candidate, tie-broken by source priority
/// (providers are iterated in that order already) then by earliest year.
/// Transient provider failures are retried per `retry_policy`; every
/// exhausted or permanent failure is classified and recorded into
/// `error_metrics` (the error-classifier component, exercised at this
/// pipeline's one real I/O boundary).
pub async fn fan_out_and_score(
    providers: &[std::sync::Arc<dyn CatalogApiProvider>],
    api_cache: &mut ApiResponseCache,
    scorer: &ReleaseScorer,
    artist: &str,
    album: &str,
    retry_policy: &RetryPolicy,
    error_metrics: &mut ErrorMetricsCollector,
) -> Option<(CandidateRelease, i32)> {
    let mut ordered: Vec<_> = providers.to_vec();
    ordered.sort_by_key(|p| p.priority());

    let mut best: Option<(CandidateRelease, i32)> = None;

    for provider in &ordered {
        let key = fan_out_key(provider.source_tag(), artist, album);

        let candidates: Vec<CandidateRelease> = if let Some(cached) = api_cache.get(&key) {
            if cached.success {
                cached
                    .api_response
                    .and_then(|v| serde_json::from_value(v).ok())
                    .unwrap_or_default()
            } else {
                continue;
            }
        } else {
            match fetch_candidates_with_retry(provider.as_ref(), artist, album, retry_policy).await {
                Ok(candidates) => {
                    let mut result = CachedApiResult::new(artist, album, provider.source_tag());
                    result.success = true;
                    result.api_response = serde_json::to_value(&candidates).ok();
                    api_cache.set(key, result, true);
                    candidates
                }
                Err(err) => {
                    tracing::warn!(source = provider.source_tag(), error = %err, "catalog provider fan-out failed");
                    let (category, severity) = error_metrics.classify(provider.source_tag(), &err.to_string(), None);
                    error_metrics.record_error(ErrorEvent::new(category, severity, err.to_string(), provider.source_tag()));
                    let mut result = CachedApiResult::new(artist, album, provider.source_tag());
                    result.success = false;
                    api_cache.set(key, result, false);
                    continue;
                }
            }
        };

        for candidate in candidates {
            let score = scorer.score_original_release(&candidate, artist, album, None, None);
            if score == 0 {
                continue;
            }
            let candidate_year: i32 = candidate.year.parse().unwrap_or(i32::MAX);
            let replace = match &best {
                None => true,
                Some((best_candidate, best_score)) => {
                    score > *best_score
                        || (score == *best_score
                            && candidate_year < best_candidate.year.parse().unwrap_or(i32::MAX))
                }
            };
            if replace {
                best = Some((candidate, score));
            }
        }
    }

    best
}

pub struct YearDeterminator {
    pub config: YearDeterminatorConfig,
}

impl YearDeterminator {
    pub fn new(config: YearDeterminatorConfig) -> Self {
        Self { config }
    }

    /// Pre-check 1: already processed by this system.
    fn check_already_processed(&self, tracks: &[Track]) -> bool {
        if self.config.force {
            return false;
        }
        tracks.first().is_some_and(Track::year_authored_by_mgu)
    }

    /// Pre-check 3: every track shares the same valid, non-empty year.
    fn check_year_consistent(&self, tracks: &[Track]) -> bool {
        let mut years = tracks.iter().filter_map(|t| t.year.as_deref());
        let Some(first) = years.next() else {
            return false;
        };
        if first.is_empty() || first.parse::<i32>().is_err() {
            return false;
        }
        years.all(|y| y == first)
    }

    /// Runs the full per-album pipeline: pre-checks -> cache -> API fan-out
    /// -> scoring -> decision rules -> fallback.
    #[allow(clippy::too_many_arguments)]
    pub async fn determine(
        &self,
        artist: &str,
        album: &str,
        tracks: &[Track],
        artist_period: Option<ArtistPeriodContext>,
        album_cache: &mut AlbumYearCache,
        api_cache: &mut ApiResponseCache,
        pending: &mut PendingVerificationStore,
        scorer: &mut ReleaseScorer,
        providers: &[std::sync::Arc<dyn CatalogApiProvider>],
        retry_policy: &RetryPolicy,
        error_metrics: &mut ErrorMetricsCollector,
    ) -> DeterminationOutcome {
        if self.check_already_processed(tracks) {
            return DeterminationOutcome::Skipped(SkipReason::AlreadyProcessed);
        }

        if let Some(entry) =
            pending.recently_rejected(artist, album, self.config.pending_verification_period)
        {
            return DeterminationOutcome::Skipped(SkipReason::RecentlyRejected(entry.reason.to_string()));
        }

        if self.check_year_consistent(tracks) {
            return DeterminationOutcome::Skipped(SkipReason::YearConsistent);
        }

        if let Some(entry) = album_cache.get_entry(artist, album) {
            if entry.confidence >= self.config.definitive_threshold as u8 {
                return DeterminationOutcome::Written {
                    year: entry.year,
                    confidence: entry.confidence,
                    source_tag: entry.source_tag.clone(),
                };
            }
        }

        scorer.set_artist_period_context(artist_period);
        let existing_year = tracks.first().and_then(|t| t.year.clone());

        let fanned_out =
            fan_out_and_score(providers, api_cache, scorer, artist, album, retry_policy, error_metrics).await;

        let Some((candidate, score)) = fanned_out else {
            return self.apply_fallback_or_pend(tracks, album_cache, pending, artist, album, None);
        };

        let candidate_year: i32 = match candidate.year.parse() {
            Ok(y) => y,
            Err(_) => {
                return self.apply_fallback_or_pend(tracks, album_cache, pending, artist, album, None);
            }
        };

        if score >= self.config.definitive_threshold {
            let confidence = score.clamp(0, 100) as u8;
            let _ = album_cache.store(artist, album, candidate_year, confidence, Some(candidate.source.clone()));
            pending.clear(artist, album);
            return DeterminationOutcome::Written {
                year: candidate_year,
                confidence,
                source_tag: Some(candidate.source),
            };
        }

        if let Some(existing) = existing_year.as_deref().filter(|y| !y.is_empty()) {
            if let Ok(existing_year_num) = existing.parse::<i32>() {
                if (candidate_year - existing_year_num).abs() > self.config.suspicious_delta {
                    let mut metadata = HashMap::new();
                    metadata.insert("existing_year".to_string(), existing.to_string());
                    metadata.insert("candidate_year".to_string(), candidate_year.to_string());
                    pending.mark(artist, album, PendingReason::SuspiciousYearChange, metadata);
                    return DeterminationOutcome::PendingVerification(PendingReason::SuspiciousYearChange);
                }
            }
        }

        DeterminationOutcome::Inconclusive
    }

    fn apply_fallback_or_pend(
        &self,
        tracks: &[Track],
        album_cache: &mut AlbumYearCache,
        pending: &mut PendingVerificationStore,
        artist: &str,
        album: &str,
        _unused: Option<()>,
    ) -> DeterminationOutcome {
        match dominant_year_fallback(
            tracks,
            self.config.dominant_year_parity_threshold,
            self.config.dominant_year_min_share,
        ) {
            Some(year) => {
                let _ = album_cache.store(artist, album, year, 50, Some("dominant_year_fallback".to_string()));
                pending.clear(artist, album);
                DeterminationOutcome::Written {
                    year,
                    confidence: 50,
                    source_tag: Some("dominant_year_fallback".to_string()),
                }
            }
            None => {
                pending.mark(artist, album, PendingReason::NoYearFound, HashMap::new());
                DeterminationOutcome::PendingVerification(PendingReason::NoYearFound)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::TrackStatus;

    fn track(year: Option<&str>, set_by_mgu: &str) -> Track {
        Track {
            id: "1".into(),
            fingerprint: None,
            name: "Song".into(),
            artist: "Artist".into(),
            album_artist: None,
            album: "Album".into(),
            genre: None,
            year: year.map(String::from),
            date_added: None,
            track_status: TrackStatus::Purchased,
            year_before_mgu: None,
            year_set_by_mgu: set_by_mgu.to_string(),
        }
    }

    #[test]
    fn dominant_year_requires_parity_and_share() {
        let tracks = vec![
            track(Some("2000"), ""),
            track(Some("2000"), ""),
            track(Some("1999"), ""),
        ];
        assert_eq!(dominant_year_fallback(&tracks, 2, 0.6), Some(2000));
    }

    #[test]
    fn dominant_year_none_when_split_evenly() {
        let tracks = vec![track(Some("2000"), ""), track(Some("1999"), "")];
        assert_eq!(dominant_year_fallback(&tracks, 2, 0.6), None);
    }

    #[test]
    fn dominant_year_ties_broken_by_earlier_year() {
        let tracks = vec![
            track(Some("2000"), ""),
            track(Some("2000"), ""),
            track(Some("1995"), ""),
            track(Some("1995"), ""),
        ];
        assert_eq!(dominant_year_fallback(&tracks, 2, 0.5), Some(1995));
    }

    #[test]
    fn already_processed_check_requires_match_and_non_force() {
        let det = YearDeterminator::new(YearDeterminatorConfig::default());
        let processed = vec![track(Some("2020"), "2020")];
        assert!(det.check_already_processed(&processed));

        let mut forced = YearDeterminatorConfig::default();
        forced.force = true;
        let det_forced = YearDeterminator::new(forced);
        assert!(!det_forced.check_already_processed(&processed));
    }

    #[test]
    fn year_consistent_check() {
        let det = YearDeterminator::new(YearDeterminatorConfig::default());
        let consistent = vec![track(Some("2000"), ""), track(Some("2000"), "")];
        assert!(det.check_year_consistent(&consistent));

        let inconsistent = vec![track(Some("2000"), ""), track(Some("1999"), "")];
        assert!(!det.check_year_consistent(&inconsistent));
    }
}
