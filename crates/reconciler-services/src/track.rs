//! Track identity, status, and provenance bookkeeping.
//!
//! Grounded on the data model in the reconciliation spec and the
//! "dynamic typing -> tagged variants" migration guidance: the library
//! control surface reports track status and change kind as free-form
//! strings, replaced here by closed variants with an `can_edit_metadata`
//! predicate.

use serde::{Deserialize, Serialize};

/// Playback/availability status reported by the library control surface.
/// Only `Prerelease` is read-only; every other known or unrecognized status
/// is treated as editable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackStatus {
    Subscription,
    Purchased,
    Uploaded,
    Matched,
    Prerelease,
    Other(String),
}

impl TrackStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "subscription" => Self::Subscription,
            "purchased" => Self::Purchased,
            "uploaded" => Self::Uploaded,
            "matched" => Self::Matched,
            "prerelease" | "pre-release" => Self::Prerelease,
            other => Self::Other(other.to_string()),
        }
    }

    /// `false` only for a prerelease track: metadata on an unreleased track
    /// is not yet ours to edit.
    pub fn can_edit_metadata(&self) -> bool {
        !matches!(self, Self::Prerelease)
    }
}

/// The kind of field a change-report row describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeType {
    Genre,
    Year,
    Name,
    Artist,
    Other,
}

/// A library track as the reconciler sees it: identity, mutable metadata,
/// and the provenance fields that record whether this system authored the
/// current year.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub fingerprint: Option<String>,
    pub name: String,
    pub artist: String,
    pub album_artist: Option<String>,
    pub album: String,
    pub genre: Option<String>,
    pub year: Option<String>,
    pub date_added: Option<String>,
    pub track_status: TrackStatus,
    /// The year this track had before this system ever touched it.
    /// Write-once: set on the first mutation, never overwritten after.
    pub year_before_mgu: Option<String>,
    /// The year this system last wrote. Empty string means "not set" --
    /// never confuse that with "set to an empty year" (see the open
    /// question this field's semantics resolve).
    #[serde(default)]
    pub year_set_by_mgu: String,
}

impl Track {
    /// `true` when this system authored the track's current year.
    pub fn year_authored_by_mgu(&self) -> bool {
        !self.year_set_by_mgu.is_empty() && self.year.as_deref() == Some(self.year_set_by_mgu.as_str())
    }

    /// Records a newly-determined year: `year_before_mgu` is set only on
    /// the first mutation; `year` and `year_set_by_mgu` are always updated.
    pub fn apply_determined_year(&mut self, year: &str) {
        if self.year_before_mgu.is_none() {
            self.year_before_mgu = self.year.clone();
        }
        self.year = Some(year.to_string());
        self.year_set_by_mgu = year.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn prerelease_is_not_editable() {
        assert!(!TrackStatus::Prerelease.can_edit_metadata());
        assert!(!TrackStatus::parse("Prerelease").can_edit_metadata());
    }

    #[test]
    fn unknown_status_defaults_editable() {
        assert!(TrackStatus::parse("downloaded").can_edit_metadata());
    }

    #[test]
    fn year_authored_by_mgu_requires_match_and_non_empty() {
        assert!(track(Some("2020"), "2020").year_authored_by_mgu());
        assert!(!track(Some("2020"), "").year_authored_by_mgu());
        assert!(!track(Some("2021"), "2020").year_authored_by_mgu());
        assert!(!track(None, "").year_authored_by_mgu());
    }

    #[test]
    fn apply_determined_year_sets_year_before_mgu_once() {
        let mut t = track(Some("1999"), "");
        t.apply_determined_year("2000");
        assert_eq!(t.year_before_mgu, Some("1999".to_string()));
        assert_eq!(t.year, Some("2000".to_string()));
        assert_eq!(t.year_set_by_mgu, "2000");

        t.apply_determined_year("2001");
        // year_before_mgu does not get overwritten by the second mutation.
        assert_eq!(t.year_before_mgu, Some("1999".to_string()));
        assert_eq!(t.year_set_by_mgu, "2001");
    }
}
