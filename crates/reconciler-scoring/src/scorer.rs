//! Release scoring: assigns an integer score to a candidate release given
//! the search `(artist, album)` and the artist's optional activity-period
//! context.
//!
//! Grounded on `examples/original_source/src/services/api/year_scoring.py`'s
//! `ReleaseScorer.score_original_release` and its private `_calculate_*`
//! helpers; weights and thresholds carry the same defaults.

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::normalize::{normalize_name, strip_edition_suffix};
use crate::script_detection::is_cross_script;

/// An artist's known activity window, used to penalize candidate years well
/// outside it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArtistPeriodContext {
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
}

/// A candidate release surfaced by a catalog API provider, as described by
/// the external catalog API contract.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateRelease {
    pub title: String,
    pub artist: String,
    pub year: String,
    pub release_type: String,
    pub status: String,
    pub country: Option<String>,
    pub releasegroup_first_date: Option<String>,
    pub is_reissue: bool,
    pub genre: Option<String>,
    pub source: String,
}

/// All scoring weights, independently configurable; defaults match the
/// table in the scoring specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub base_score: i32,
    pub artist_exact_match_bonus: i32,
    pub artist_substring_penalty: i32,
    pub artist_cross_script_penalty: i32,
    pub artist_mismatch_penalty: i32,
    pub soundtrack_compensation_bonus: i32,
    pub album_exact_match_bonus: i32,
    pub perfect_match_bonus: i32,
    pub album_variation_bonus: i32,
    pub album_substring_penalty: i32,
    pub album_unrelated_penalty: i32,
    pub type_album_bonus: i32,
    pub type_ep_single_penalty: i32,
    pub type_compilation_live_penalty: i32,
    pub status_official_bonus: i32,
    pub status_bootleg_penalty: i32,
    pub status_promo_penalty: i32,
    pub reissue_penalty: i32,
    pub mb_release_group_match_bonus: i32,
    pub year_before_start_penalty: i32,
    pub year_after_end_penalty: i32,
    pub year_near_start_bonus: i32,
    pub year_diff_penalty_scale: i32,
    pub year_diff_max_penalty: i32,
    pub country_artist_match_bonus: i32,
    pub country_major_market_bonus: i32,
    pub major_market_codes: Vec<String>,
    pub source_mb_bonus: i32,
    pub source_discogs_bonus: i32,
    pub source_itunes_bonus: i32,
    pub source_lastfm_penalty: i32,
    pub future_year_penalty: i32,
    pub current_year_penalty: i32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            base_score: 10,
            artist_exact_match_bonus: 20,
            artist_substring_penalty: -20,
            artist_cross_script_penalty: -10,
            artist_mismatch_penalty: -60,
            soundtrack_compensation_bonus: 75,
            album_exact_match_bonus: 25,
            perfect_match_bonus: 10,
            album_variation_bonus: 10,
            album_substring_penalty: -15,
            album_unrelated_penalty: -40,
            type_album_bonus: 15,
            type_ep_single_penalty: -10,
            type_compilation_live_penalty: -25,
            status_official_bonus: 10,
            status_bootleg_penalty: -50,
            status_promo_penalty: -20,
            reissue_penalty: -30,
            mb_release_group_match_bonus: 50,
            year_before_start_penalty: -25,
            year_after_end_penalty: -20,
            year_near_start_bonus: 20,
            year_diff_penalty_scale: -5,
            year_diff_max_penalty: -40,
            country_artist_match_bonus: 10,
            country_major_market_bonus: 5,
            major_market_codes: vec!["us", "gb", "uk", "de", "jp", "fr"]
                .into_iter()
                .map(String::from)
                .collect(),
            source_mb_bonus: 5,
            source_discogs_bonus: 2,
            source_itunes_bonus: 4,
            source_lastfm_penalty: -5,
            future_year_penalty: -10,
            current_year_penalty: 0,
        }
    }
}

const YEAR_LENGTH: usize = 4;

fn soundtrack_artist_patterns() -> &'static [&'static str] {
    &[
        "various artists",
        "various",
        "va",
        "ost",
        "original soundtrack",
        "original motion picture soundtrack",
        "original score",
        "soundtrack",
        "film soundtrack",
        "movie soundtrack",
        "game soundtrack",
        "video game soundtrack",
        "tv soundtrack",
        "television soundtrack",
        "compilation",
        "various performers",
    ]
}

fn is_soundtrack_artist(artist_norm: &str) -> bool {
    if artist_norm.is_empty() {
        return false;
    }
    let lower = artist_norm.to_lowercase();
    if soundtrack_artist_patterns().contains(&lower.as_str()) {
        return true;
    }
    let prefixes = ["various ", "original ", "ost ", "soundtrack "];
    if prefixes.iter().any(|p| lower.starts_with(p)) {
        return true;
    }
    lower.contains("soundtrack") || lower.contains("original score")
}

fn strip_non_word(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '_')
        .collect::<String>()
        .trim()
        .to_string()
}

/// `true` iff `title1` begins with `title2` followed by a bracketed or
/// parenthesized suffix, e.g. `"album (deluxe)"` relative to `"album"`.
fn is_album_variation(title1: &str, title2: &str) -> bool {
    if !title1.starts_with(title2) {
        return false;
    }
    let remainder = title1[title2.len()..].trim();
    let opens_bracket = remainder.starts_with('(') || remainder.starts_with('[');
    let closes_bracket = remainder.ends_with(')') || remainder.ends_with(']');
    opens_bracket && closes_bracket && remainder.len() > 2
}

/// Evaluates a candidate release against the search target, returning an
/// integer score clamped at zero. A candidate with an invalid year returns
/// `0` unconditionally, regardless of any other field.
pub struct ReleaseScorer {
    pub weights: ScoringWeights,
    pub min_valid_year: i32,
    pub current_year: i32,
    pub definitive_threshold: i32,
    pub artist_period_context: Option<ArtistPeriodContext>,
    pub remaster_keywords: Vec<String>,
}

impl ReleaseScorer {
    pub fn new(
        weights: ScoringWeights,
        min_valid_year: i32,
        definitive_threshold: i32,
        remaster_keywords: Vec<String>,
    ) -> Self {
        Self {
            weights,
            min_valid_year,
            current_year: chrono::Utc::now().year(),
            definitive_threshold,
            artist_period_context: None,
            remaster_keywords,
        }
    }

    pub fn set_artist_period_context(&mut self, context: Option<ArtistPeriodContext>) {
        self.artist_period_context = context;
    }

    fn is_valid_year(&self, year_str: &str) -> Option<i32> {
        if year_str.is_empty() || year_str.len() != YEAR_LENGTH || !year_str.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let year: i32 = year_str.parse().ok()?;
        if year >= self.min_valid_year {
            Some(year)
        } else {
            None
        }
    }

    fn extract_rg_first_year(&self, rg_first_date: &str) -> Option<i32> {
        let segment = rg_first_date.split('-').next()?;
        if segment.len() == YEAR_LENGTH && segment.chars().all(|c| c.is_ascii_digit()) {
            segment.parse().ok()
        } else {
            None
        }
    }

    fn calculate_artist_match(&self, release_artist_norm: &str, target_artist_norm: &str) -> (i32, i32) {
        let w = &self.weights;
        if !release_artist_norm.is_empty() && release_artist_norm == target_artist_norm {
            return (w.artist_exact_match_bonus, w.artist_exact_match_bonus);
        }
        if release_artist_norm.is_empty() || target_artist_norm.is_empty() {
            return (0, 0);
        }
        if target_artist_norm.contains(release_artist_norm) || release_artist_norm.contains(target_artist_norm) {
            return (0, w.artist_substring_penalty);
        }
        if is_cross_script(target_artist_norm, release_artist_norm) {
            return (0, w.artist_cross_script_penalty);
        }
        (0, w.artist_mismatch_penalty)
    }

    fn calculate_album_match(&self, release_title_norm: &str, target_album_norm: &str, artist_match_bonus: i32) -> i32 {
        let w = &self.weights;
        let comp_release = strip_non_word(&release_title_norm.to_lowercase());
        let comp_album = strip_non_word(&target_album_norm.to_lowercase());

        if comp_release == comp_album {
            if artist_match_bonus > 0 {
                return w.album_exact_match_bonus + w.perfect_match_bonus;
            }
            return w.album_exact_match_bonus;
        }
        if is_album_variation(&comp_release, &comp_album) || is_album_variation(&comp_album, &comp_release) {
            return w.album_variation_bonus;
        }
        if comp_album.contains(&comp_release) || comp_release.contains(&comp_album) {
            return w.album_substring_penalty;
        }
        w.album_unrelated_penalty
    }

    fn calculate_soundtrack_compensation(
        &self,
        target_artist_norm: &str,
        release_title_norm: &str,
        target_album_norm: &str,
        release_genre: Option<&str>,
    ) -> i32 {
        if !is_soundtrack_artist(target_artist_norm) {
            return 0;
        }
        let comp_release = strip_non_word(&release_title_norm.to_lowercase());
        let comp_target = strip_non_word(&target_album_norm.to_lowercase());
        if !comp_target.contains(&comp_release) && !comp_release.contains(&comp_target) {
            return 0;
        }
        let genre_lower = release_genre.unwrap_or_default().to_lowercase();
        let is_soundtrack_genre = ["soundtrack", "score", "film music", "ost"]
            .iter()
            .any(|kw| genre_lower.contains(kw));
        if !is_soundtrack_genre {
            return 0;
        }
        self.weights.soundtrack_compensation_bonus
    }

    fn score_release_type(&self, release_type: &str) -> i32 {
        let w = &self.weights;
        let lower = release_type.to_lowercase();
        if lower.contains("album") {
            w.type_album_bonus
        } else if ["ep", "single"].iter().any(|t| lower.contains(t)) {
            w.type_ep_single_penalty
        } else if ["compilation", "live", "soundtrack", "remix"].iter().any(|t| lower.contains(t)) {
            w.type_compilation_live_penalty
        } else {
            0
        }
    }

    fn score_release_status(&self, status: &str) -> i32 {
        let w = &self.weights;
        let lower = status.to_lowercase();
        if lower == "official" {
            w.status_official_bonus
        } else if ["bootleg", "unofficial", "pseudorelease"].iter().any(|s| lower.contains(s)) {
            w.status_bootleg_penalty
        } else if ["promotion", "promo", "promotional"].iter().any(|s| lower.contains(s)) {
            w.status_promo_penalty
        } else {
            0
        }
    }

    fn score_artist_period(&self, year: i32) -> i32 {
        let Some(ctx) = self.artist_period_context else {
            return 0;
        };
        let w = &self.weights;
        let mut score = 0;

        // The "up to -N" caps below are fixed by the scoring contract; the
        // corresponding weight fields exist for the uncapped per-year slope.
        if let Some(start) = ctx.start_year {
            if year < start - 1 {
                let years_before = start - year;
                let penalty_val = (5 + (years_before - 1) * 5).min(50);
                score -= penalty_val;
            }
            if (year - start) >= 0 && (year - start) <= 1 {
                score += w.year_near_start_bonus;
            }
        }

        if let Some(end) = ctx.end_year {
            if year > end + 3 {
                let years_after = year - end;
                let penalty_val = (5 + (years_after - 3) * 3).min(40);
                score -= penalty_val;
            }
        }

        score
    }

    fn score_year_difference(&self, year: i32, rg_first_year: i32) -> i32 {
        let w = &self.weights;
        let year_diff = year - rg_first_year;
        let penalty = (year_diff - 1) * w.year_diff_penalty_scale;
        penalty.max(w.year_diff_max_penalty)
    }

    fn calculate_country_score(&self, release_country: Option<&str>, artist_region: Option<&str>) -> i32 {
        let w = &self.weights;
        let alias = |code: &str| if code == "uk" { "gb".to_string() } else { code.to_string() };

        let release_country = release_country.map(|c| alias(&c.to_lowercase()));
        let artist_region = artist_region.map(|c| alias(&c.to_lowercase()));

        let (Some(release_country), Some(artist_region)) = (release_country, artist_region) else {
            return 0;
        };
        if release_country.is_empty() || artist_region.is_empty() {
            return 0;
        }

        if release_country == artist_region {
            return w.country_artist_match_bonus;
        }
        if w.major_market_codes.iter().any(|c| *c == release_country) {
            return w.country_major_market_bonus;
        }
        0
    }

    fn calculate_source_score(&self, source: &str) -> i32 {
        let w = &self.weights;
        match source {
            "musicbrainz" => w.source_mb_bonus,
            "discogs" => w.source_discogs_bonus,
            "itunes" => w.source_itunes_bonus,
            "lastfm" => w.source_lastfm_penalty,
            _ => 0,
        }
    }

    /// Scores `release` against the search `(artist_norm, album_norm)`.
    /// `album_orig`, when supplied, has edition suffixes stripped before
    /// normalization (mirroring the same treatment applied to the
    /// candidate's own title).
    pub fn score_original_release(
        &self,
        release: &CandidateRelease,
        artist_norm: &str,
        album_norm: &str,
        artist_region: Option<&str>,
        album_orig: Option<&str>,
    ) -> i32 {
        let mut score = self.weights.base_score;

        let title_stripped = strip_edition_suffix(&release.title, &self.remaster_keywords);
        let release_title_norm = normalize_name(&title_stripped);
        let release_artist_norm = normalize_name(&release.artist);

        let target_album_norm = match album_orig {
            Some(orig) => normalize_name(&strip_edition_suffix(orig, &self.remaster_keywords)),
            None => normalize_name(album_norm),
        };
        let target_artist_norm = normalize_name(artist_norm);

        let Some(year) = self.is_valid_year(&release.year) else {
            return 0;
        };

        if year > self.current_year {
            score += self.weights.future_year_penalty;
        } else if year == self.current_year {
            score += self.weights.current_year_penalty;
        }

        let (artist_match_bonus, artist_score) = self.calculate_artist_match(&release_artist_norm, &target_artist_norm);
        score += artist_score;
        score += self.calculate_album_match(&release_title_norm, &target_album_norm, artist_match_bonus);

        score += self.calculate_soundtrack_compensation(
            &target_artist_norm,
            &release_title_norm,
            &target_album_norm,
            release.genre.as_deref(),
        );

        let mut rg_first_year = None;
        if let Some(rg_date) = &release.releasegroup_first_date {
            rg_first_year = self.extract_rg_first_year(rg_date);
            if let Some(rg_year) = rg_first_year {
                if release.source == "musicbrainz" && year == rg_year {
                    score += self.weights.mb_release_group_match_bonus;
                }
            }
        }

        score += self.score_release_type(&release.release_type);
        score += self.score_release_status(&release.status);
        if release.is_reissue {
            score += self.weights.reissue_penalty;
        }

        if self.artist_period_context.is_some() {
            score += self.score_artist_period(year);
        }
        if let Some(rg_year) = rg_first_year {
            if year > rg_year + 1 {
                score += self.score_year_difference(year, rg_year);
            }
        }

        score += self.calculate_country_score(release.country.as_deref(), artist_region);
        score += self.calculate_source_score(&release.source);

        score.max(0)
    }
}
