//! Configuration aggregation: a top-level struct of nested structs
//! deserialized via `serde`. Reading and
//! parsing the config file itself is explicitly out of the core's scope
//! this module only defines the recognized shape and the
//! fallback-path loading helper, leaving file I/O to the caller.

use std::path::Path;
use std::time::Duration;

use reconciler_scoring::ScoringWeights;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration key: {0}")]
    MissingRequired(String),

    #[error("invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("no configuration could be loaded from the primary path or any fallback")]
    ExhaustedFallbacks,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CachingConfig {
    pub default_ttl_seconds: u64,
    pub api_result_cache_path: String,
    pub cleanup_interval_seconds: u64,
}

impl Default for CachingConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: 3600,
            api_result_cache_path: "api_response_cache.json".to_string(),
            cleanup_interval_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub batch_size: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self { batch_size: 10 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PendingVerificationConfig {
    pub period_hours: u64,
}

impl Default for PendingVerificationConfig {
    fn default() -> Self {
        Self { period_hours: 24 * 7 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct YearRetrievalConfig {
    pub api_timeout_seconds: f64,
    pub processing: ProcessingConfig,
    pub definitive_threshold: i32,
    pub min_valid_year: i32,
    pub suspicious_delta: i32,
    pub scoring: ScoringWeights,
    pub remaster_keywords: Vec<String>,
    pub pending_verification: PendingVerificationConfig,
}

impl Default for YearRetrievalConfig {
    fn default() -> Self {
        Self {
            api_timeout_seconds: 10.0,
            processing: ProcessingConfig::default(),
            definitive_threshold: 85,
            min_valid_year: 1900,
            suspicious_delta: 5,
            scoring: ScoringWeights::default(),
            remaster_keywords: [
                "deluxe", "remaster", "remastered", "anniversary", "edition", "version", "bonus",
                "special", "collector", "expanded",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            pending_verification: PendingVerificationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExperimentalConfig {
    pub batch_updates_enabled: bool,
    pub max_batch_size: usize,
}

impl Default for ExperimentalConfig {
    fn default() -> Self {
        Self { batch_updates_enabled: true, max_batch_size: 50 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppleScriptTimeoutsConfig {
    pub batch_update: Option<f64>,
}

impl Default for AppleScriptTimeoutsConfig {
    fn default() -> Self {
        Self { batch_update: None }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LibrarySnapshotConfig {
    pub enabled: bool,
}

impl Default for LibrarySnapshotConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DevelopmentConfig {
    pub test_artists: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogsConfig {
    pub directory: String,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self { directory: "logs".to_string() }
    }
}

/// Top-level configuration. Recognized keys are exactly the
/// table; anything else in the source document is ignored rather than
/// rejected, tolerating unknown keys from an evolving config file.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ReconcilerConfig {
    pub caching: CachingConfig,
    pub year_retrieval: YearRetrievalConfig,
    pub experimental: ExperimentalConfig,
    pub applescript_timeouts: AppleScriptTimeoutsConfig,
    pub applescript_timeout_seconds: Option<f64>,
    pub library_snapshot: LibrarySnapshotConfig,
    pub development: DevelopmentConfig,
    pub logs: LogsConfig,
}

impl ReconcilerConfig {
    /// Parses an already-deserialized value (e.g. `serde_yaml`/`serde_json`
    /// output the caller produced). Reading the file itself is the caller's
    /// job; this crate never touches a YAML library directly.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_value(value).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_str(raw: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value = serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.year_retrieval.min_valid_year < 1 {
            return Err(ConfigError::InvalidValue {
                key: "year_retrieval.min_valid_year".to_string(),
                message: "must be a positive year".to_string(),
            });
        }
        if self.year_retrieval.definitive_threshold <= 0 {
            return Err(ConfigError::InvalidValue {
                key: "year_retrieval.definitive_threshold".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if let Some(batch) = self.applescript_timeouts.batch_update {
            if batch <= 0.0 {
                return Err(ConfigError::InvalidValue {
                    key: "applescript_timeouts.batch_update".to_string(),
                    message: "must be positive".to_string(),
                });
            }
        }
        if let Some(flat) = self.applescript_timeout_seconds {
            if flat <= 0.0 {
                return Err(ConfigError::InvalidValue {
                    key: "applescript_timeout_seconds".to_string(),
                    message: "must be positive".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.caching.default_ttl_seconds)
    }

    pub fn pending_verification_period(&self) -> Duration {
        Duration::from_secs(self.year_retrieval.pending_verification.period_hours * 3600)
    }
}

/// Reads and parses a primary config path, falling back in order to each of
/// `fallbacks` if the primary is missing or fails to parse. Supplements the
/// core's scope with the fallback-chain semantics of the original
/// implementation's `ConfigurationRetryHandler`: every attempt short-
/// circuits the core's own YAML-loading non-goal by going through a
/// caller-supplied `parse` function, so this crate still never touches a
/// YAML library directly.
pub fn load_with_fallback<T: DeserializeOwned>(
    primary: &Path,
    fallbacks: &[&Path],
    parse: impl Fn(&str) -> Result<T, ConfigError>,
) -> Result<T, ConfigError> {
    for path in std::iter::once(primary).chain(fallbacks.iter().copied()) {
        match std::fs::read_to_string(path) {
            Ok(raw) => match parse(&raw) {
                Ok(config) => return Ok(config),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "config candidate failed to parse, trying next fallback");
                }
            },
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "config candidate not found, trying next fallback");
            }
        }
    }
    Err(ConfigError::ExhaustedFallbacks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(ReconcilerConfig::default().validate().is_ok());
    }

    #[test]
    fn negative_min_valid_year_is_rejected() {
        let mut config = ReconcilerConfig::default();
        config.year_retrieval.min_valid_year = -1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn non_positive_batch_timeout_is_rejected() {
        let mut config = ReconcilerConfig::default();
        config.applescript_timeouts.batch_update = Some(0.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_str_parses_partial_overrides_over_defaults() {
        let config = ReconcilerConfig::from_str(r#"{"year_retrieval": {"definitive_threshold": 90}}"#).unwrap();
        assert_eq!(config.year_retrieval.definitive_threshold, 90);
        assert_eq!(config.year_retrieval.min_valid_year, 1900);
    }

    #[test]
    fn load_with_fallback_tries_each_path_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let present = dir.path().join("present.json");
        std::fs::write(&present, r#"{"year_retrieval": {"definitive_threshold": 77}}"#).unwrap();

        let config: ReconcilerConfig =
            load_with_fallback(&missing, &[present.as_path()], |raw| ReconcilerConfig::from_str(raw)).unwrap();
        assert_eq!(config.year_retrieval.definitive_threshold, 77);
    }

    #[test]
    fn load_with_fallback_exhausted_when_nothing_parses() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let result: Result<ReconcilerConfig, ConfigError> =
            load_with_fallback(&missing, &[], |raw| ReconcilerConfig::from_str(raw));
        assert!(matches!(result, Err(ConfigError::ExhaustedFallbacks)));
    }
}
