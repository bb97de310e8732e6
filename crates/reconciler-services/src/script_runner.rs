//! The external library-control surface: an opaque script runner and the
//! wire-format helpers for the batch-update command string.
//!
//! Grounded on
//! `examples/original_source/src/core/tracks/update_executor.py`'s
//! `_process_update_result`/`_try_batch_update`. The actual subprocess
//! implementation is explicitly out of scope; only the trait
//! contract and the wire format are defined here.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Intra-record separator between `(id, field, value)` fields in a batch
/// command string.
pub const FIELD_SEPARATOR: char = '\u{1E}';
/// Inter-record separator between per-track commands in a batch command
/// string.
pub const RECORD_SEPARATOR: char = '\u{1D}';

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("script '{0}' timed out")]
    Timeout(String),
    #[error("script '{0}' failed: {1}")]
    Failed(String, String),
}

/// Freeform contextual fields attached to a script invocation purely for
/// logging -- they never affect execution.
#[derive(Debug, Clone, Default)]
pub struct ScriptContext {
    pub artist: Option<String>,
    pub album: Option<String>,
    pub track_name: Option<String>,
}

/// The opaque runner for the platform-specific library control surface.
/// Implementations launch, await, and clean up a subprocess; this crate
/// never does so itself.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    /// Runs `script_name` with `args`, returning its stdout text, or `None`
    /// if the script produced no output. `timeout` bounds the call;
    /// exceeding it surfaces as [`ScriptError::Timeout`].
    async fn run_script(
        &self,
        script_name: &str,
        args: &[String],
        timeout: Duration,
        context: ScriptContext,
    ) -> Result<Option<String>, ScriptError>;
}

/// The three-way outcome a raw script-runner response distinguishes:
/// a real change, a no-op (value already matched), or an error. Parsed by
/// string-prefix match, matching `_process_update_result`'s
/// `"Success:"`/`"No Change:"` checks against an otherwise-unstructured
/// reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Success,
    NoChange,
    Error,
}

impl UpdateOutcome {
    /// Parses a raw script stdout line. `None` (no response at all) and any
    /// text not prefixed with a recognized marker are both `Error`.
    pub fn parse(stdout: Option<&str>) -> Self {
        match stdout {
            Some(text) if text.contains("Success:") || text.starts_with("Success") => Self::Success,
            Some(text) if text.contains("No Change:") || text.starts_with("No Change") => {
                Self::NoChange
            }
            _ => Self::Error,
        }
    }

    /// `true` for both `Success` and `NoChange` -- the operation completed
    /// without error, whether or not it actually changed anything.
    pub fn succeeded(self) -> bool {
        !matches!(self, Self::Error)
    }

    /// `true` only when a real change was made.
    pub fn changed(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// A single `(track_id, field, value)` triple destined for a batch command.
#[derive(Debug, Clone)]
pub struct BatchFieldUpdate {
    pub track_id: String,
    pub field: String,
    pub value: String,
}

/// Builds the batch command string: `U+001E`
/// (`FIELD_SEPARATOR`) between the three fields of a record, `U+001D`
/// (`RECORD_SEPARATOR`) between records. These separators never collide
/// with user metadata, unlike a delimiter drawn from printable ASCII.
pub fn build_batch_command(updates: &[BatchFieldUpdate]) -> String {
    updates
        .iter()
        .map(|u| {
            [u.track_id.as_str(), u.field.as_str(), u.value.as_str()].join(&FIELD_SEPARATOR.to_string())
        })
        .collect::<Vec<_>>()
        .join(&RECORD_SEPARATOR.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_response_is_detected() {
        assert_eq!(UpdateOutcome::parse(Some("Success: year set to 2000")), UpdateOutcome::Success);
    }

    #[test]
    fn no_change_response_is_detected() {
        assert_eq!(UpdateOutcome::parse(Some("No Change: already 2000")), UpdateOutcome::NoChange);
    }

    #[test]
    fn missing_response_is_an_error() {
        assert_eq!(UpdateOutcome::parse(None), UpdateOutcome::Error);
    }

    #[test]
    fn arbitrary_text_is_an_error() {
        assert_eq!(UpdateOutcome::parse(Some("AppleEvent timed out")), UpdateOutcome::Error);
    }

    #[test]
    fn batch_command_uses_the_configured_separators() {
        let updates = vec![
            BatchFieldUpdate { track_id: "1".into(), field: "year".into(), value: "2000".into() },
            BatchFieldUpdate { track_id: "2".into(), field: "genre".into(), value: "Rock".into() },
        ];
        let command = build_batch_command(&updates);
        assert_eq!(command, format!("1{FIELD_SEPARATOR}year{FIELD_SEPARATOR}2000{RECORD_SEPARATOR}2{FIELD_SEPARATOR}genre{FIELD_SEPARATOR}Rock"));
    }

    #[test]
    fn batch_separators_never_collide_with_typical_metadata() {
        let updates = vec![BatchFieldUpdate {
            track_id: "1".into(),
            field: "name".into(),
            value: "Track: Part 1; Side A / B".into(),
        }];
        let command = build_batch_command(&updates);
        assert_eq!(command.matches(RECORD_SEPARATOR).count(), 0);
        assert_eq!(command.matches(FIELD_SEPARATOR).count(), 2);
    }
}
