//! The error taxonomy: Config, Validation, TransientIo, PersistentIo,
//! DataIntegrity, SecurityValidation, Cancellation.

use thiserror::Error;

/// Top-level reconciler error, aggregating the taxonomy described in the
/// error handling design.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Missing required configuration keys, out-of-range values, missing
    /// required environment variables. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Bad user or API input; recovered locally, logged, item skipped.
    #[error("validation error: {0}")]
    Validation(String),

    /// Retried per the retry handler's policy; surfaced only once retries
    /// are exhausted or the error is non-transient.
    #[error("transient I/O error: {0}")]
    TransientIo(String),

    /// Surfaced to the caller after retries are exhausted; the
    /// corresponding album/track is skipped for this run.
    #[error("persistent I/O error: {0}")]
    PersistentIo(String),

    /// Library corruption suspected, invalid fingerprint format, or a
    /// type-mismatched cache entry.
    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    /// Rejected updates do not propagate; reported via log only.
    #[error("security validation error: {0}")]
    SecurityValidation(String),

    /// Propagates unchanged; the retry handler treats it as terminal.
    #[error("operation cancelled: {0}")]
    Cancellation(String),
}

pub type Result<T> = std::result::Result<T, ReconcileError>;

impl From<crate::fingerprint::FingerprintError> for ReconcileError {
    fn from(err: crate::fingerprint::FingerprintError) -> Self {
        match err {
            crate::fingerprint::FingerprintError::MissingRequired(field) => {
                ReconcileError::DataIntegrity(format!("missing required field: {field}"))
            }
        }
    }
}

impl<E: std::fmt::Display> From<crate::retry::RetryError<E>> for ReconcileError {
    fn from(err: crate::retry::RetryError<E>) -> Self {
        match err {
            crate::retry::RetryError::DeadlineExceeded { operation_id, .. } => {
                ReconcileError::TransientIo(format!(
                    "operation '{operation_id}' exceeded its deadline"
                ))
            }
            crate::retry::RetryError::Cancelled { operation_id } => {
                ReconcileError::Cancellation(format!("operation '{operation_id}' cancelled"))
            }
            crate::retry::RetryError::Exhausted { operation_id, attempts, source } => {
                ReconcileError::PersistentIo(format!(
                    "operation '{operation_id}' failed after {attempts} attempts: {source}"
                ))
            }
            crate::retry::RetryError::NonTransient { operation_id, source } => {
                ReconcileError::PersistentIo(format!(
                    "operation '{operation_id}' failed non-transiently: {source}"
                ))
            }
        }
    }
}
