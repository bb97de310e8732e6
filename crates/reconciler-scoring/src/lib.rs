//! Release-year scoring: normalization, cross-script detection, and the
//! release scorer.

pub mod normalize;
pub mod script_detection;
pub mod scorer;

pub use normalize::{normalize_name, strip_edition_suffix};
pub use script_detection::{detect_primary_script, is_cross_script, Script};
pub use scorer::{ArtistPeriodContext, CandidateRelease, ReleaseScorer, ScoringWeights};
