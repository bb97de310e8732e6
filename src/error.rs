//! Process-level error glue. The bulk of the error taxonomy lives in
//! `reconciler_core::error::ReconcileError`; this module only adds the
//! process-entry boundary that turns a fatal configuration error into a
//! human-readable exit, using `anyhow` narrowly alongside the primary
//! `thiserror` taxonomy.

pub use reconciler_core::error::{ReconcileError, Result};

use crate::config::ConfigError;

impl From<ConfigError> for ReconcileError {
    fn from(err: ConfigError) -> Self {
        ReconcileError::Config(err.to_string())
    }
}
