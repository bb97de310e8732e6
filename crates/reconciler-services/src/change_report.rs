//! Emits the run's change report: a CSV with a fixed column order, falling
//! back to a "no changes" summary when every row is a no-op, plus the
//! per-run summary counts.
//!
//! Grounded on the CSV import/export pattern in
//! `examples/kcirtapfromspace-no_drake_in_the_house/backend/src/services/dnp_list.rs`'s
//! `parse_csv_import`/`export_to_csv` (`csv::Reader`/`csv::Writer` over an
//! in-memory buffer); the fixed column set is pinned to a stable schema.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::track::ChangeType;
use crate::year_determinator::SkipReason;

#[derive(Debug, Error)]
pub enum ChangeReportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// One row of the change report. `old_*`/`new_*` columns are populated only
/// for the field(s) `change_type` actually names; the others stay empty, as
/// a single CSV schema covers every change type rather than one schema per
/// type.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeReportRow {
    pub change_type: ChangeType,
    pub artist: String,
    pub album: String,
    pub track_name: String,
    pub old_genre: Option<String>,
    pub new_genre: Option<String>,
    pub old_year: Option<String>,
    pub new_year: Option<String>,
    pub old_name: Option<String>,
    pub new_name: Option<String>,
    pub old_artist: Option<String>,
    pub new_artist: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ChangeReportRow {
    /// A row is a no-op when every `old_*`/`new_*` pair is either absent or
    /// equal.
    pub fn is_noop(&self) -> bool {
        let pairs = [
            (&self.old_genre, &self.new_genre),
            (&self.old_year, &self.new_year),
            (&self.old_name, &self.new_name),
            (&self.old_artist, &self.new_artist),
        ];
        pairs.iter().all(|(old, new)| old == new)
    }
}

/// Per-run counters surfaced in the summary line, matching the categories
/// the run reports alongside the change report itself.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RunSummary {
    pub processed: u64,
    pub skipped_already_processed: u64,
    pub skipped_recently_rejected: u64,
    pub skipped_consistent: u64,
    pub updated: u64,
    pub pending_verification: u64,
    pub errors: u64,
}

impl RunSummary {
    pub fn record_skip(&mut self, reason: &SkipReason) {
        self.processed += 1;
        match reason {
            SkipReason::AlreadyProcessed => self.skipped_already_processed += 1,
            SkipReason::RecentlyRejected(_) => self.skipped_recently_rejected += 1,
            SkipReason::YearConsistent => self.skipped_consistent += 1,
        }
    }

    pub fn record_updated(&mut self) {
        self.processed += 1;
        self.updated += 1;
    }

    pub fn record_pending(&mut self) {
        self.processed += 1;
        self.pending_verification += 1;
    }

    pub fn record_error(&mut self) {
        self.processed += 1;
        self.errors += 1;
    }

    pub fn to_summary_line(self) -> String {
        format!(
            "processed={} skipped_already_processed={} skipped_recently_rejected={} skipped_consistent={} updated={} pending_verification={} errors={}",
            self.processed,
            self.skipped_already_processed,
            self.skipped_recently_rejected,
            self.skipped_consistent,
            self.updated,
            self.pending_verification,
            self.errors
        )
    }
}

/// Accumulates rows across a run and renders the final CSV (or "no
/// changes" summary) on demand.
#[derive(Debug, Default)]
pub struct ChangeReport {
    rows: Vec<ChangeReportRow>,
}

impl ChangeReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: ChangeReportRow) {
        self.rows.push(row);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Renders the report to CSV text with the fixed column order from
    /// the stable column schema, or a one-line "no changes" summary if every row is a
    /// no-op (or there are no rows at all).
    pub fn render(&self) -> Result<String, ChangeReportError> {
        if self.rows.is_empty() || self.rows.iter().all(ChangeReportRow::is_noop) {
            return Ok("no changes".to_string());
        }

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record([
            "change_type",
            "artist",
            "album",
            "track_name",
            "old_genre",
            "new_genre",
            "old_year",
            "new_year",
            "old_name",
            "new_name",
            "old_artist",
            "new_artist",
            "timestamp",
        ])?;

        for row in &self.rows {
            writer.write_record(&[
                change_type_label(row.change_type),
                row.artist.clone(),
                row.album.clone(),
                row.track_name.clone(),
                row.old_genre.clone().unwrap_or_default(),
                row.new_genre.clone().unwrap_or_default(),
                row.old_year.clone().unwrap_or_default(),
                row.new_year.clone().unwrap_or_default(),
                row.old_name.clone().unwrap_or_default(),
                row.new_name.clone().unwrap_or_default(),
                row.old_artist.clone().unwrap_or_default(),
                row.new_artist.clone().unwrap_or_default(),
                row.timestamp.to_rfc3339(),
            ])?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| ChangeReportError::Csv(csv::Error::from(e.into_error())))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

fn change_type_label(change_type: ChangeType) -> String {
    match change_type {
        ChangeType::Genre => "genre",
        ChangeType::Year => "year",
        ChangeType::Name => "name",
        ChangeType::Artist => "artist",
        ChangeType::Other => "other",
    }
    .to_string()
}
