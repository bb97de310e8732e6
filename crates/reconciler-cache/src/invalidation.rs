//! Plans and executes cache invalidations from a library [`ChangeSet`].
//!
//! Grounded on `examples/original_source/src/services/cache/invalidation_engine.py`'s
//! `InvalidationEngine`/`InvalidationPlan`: the four-tier priority policy,
//! dependency-pattern resolution, and the immediate-vs-lower-tier failure
//! handling in `execute_invalidation`.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use thiserror::Error;

use crate::library_state::ChangeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Highest priority first for `Ord`: `Immediate` sorts before `Low`.
    Immediate,
    High,
    Normal,
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationTask {
    pub key: String,
    pub priority: Priority,
}

#[derive(Debug, Clone, Default)]
pub struct InvalidationPlan {
    pub tasks: Vec<InvalidationTask>,
}

impl InvalidationPlan {
    pub fn tasks_at(&self, priority: Priority) -> impl Iterator<Item = &InvalidationTask> {
        self.tasks.iter().filter(move |t| t.priority == priority)
    }

    fn push(&mut self, key: impl Into<String>, priority: Priority) {
        self.tasks.push(InvalidationTask {
            key: key.into(),
            priority,
        });
    }
}

/// Sentinel key representing aggregate queries (e.g. "all albums"), not
/// tied to any single track.
pub const ALL_SENTINEL_KEY: &str = "ALL";

pub fn direct_track_key(track_id: &str) -> String {
    format!("track:{track_id}")
}

pub fn processed_track_key(track_id: &str) -> String {
    format!("processed_track:{track_id}")
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache invalidation failed for key '{key}': {reason}")]
    Failed { key: String, reason: String },
}

/// A single cache (or façade over several) invalidation can act against.
#[async_trait]
pub trait Invalidatable {
    async fn invalidate(&self, key: &str) -> Result<bool, CacheError>;
}

#[derive(Debug, Error)]
pub enum ExecuteError {
    /// An `Immediate`-tier invalidation failed; the caller must treat this
    /// as fatal to the current operation.
    #[error("critical invalidation failure at key '{key}': {reason}")]
    CriticalFailure { key: String, reason: String },
}

#[derive(Debug, Clone, Default)]
pub struct InvalidationReport {
    pub succeeded: Vec<String>,
    /// Failures at `Normal`/`Low` priority: collected, not fatal.
    pub tolerated_failures: Vec<(String, String)>,
}

/// Builds invalidation plans from changesets and registered dependency
/// patterns, and executes them against an [`Invalidatable`] cache façade.
#[derive(Default)]
pub struct InvalidationEngine {
    /// Pattern templates containing the literal substring `{track_id}`,
    /// mapped to the dependency keys they resolve to once a track id is
    /// substituted in.
    dependency_patterns: HashMap<String, HashSet<String>>,
}

impl InvalidationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_dependency_pattern(
        &mut self,
        pattern: impl Into<String>,
        dependency_keys: HashSet<String>,
    ) {
        self.dependency_patterns.insert(pattern.into(), dependency_keys);
    }

    /// Builds a plan per the policy table: deleted tracks generate
    /// `Immediate` direct/processed-key invalidations; modified tracks
    /// generate the same two keys at `High`, plus any matching dependency
    /// patterns at `Normal`; added tracks generate the `ALL` sentinel at
    /// `Normal`.
    pub fn plan(&self, changes: &ChangeSet) -> InvalidationPlan {
        let mut plan = InvalidationPlan::default();

        for track_id in &changes.deleted {
            plan.push(direct_track_key(track_id), Priority::Immediate);
            plan.push(processed_track_key(track_id), Priority::Immediate);
        }

        for track_id in &changes.modified {
            plan.push(direct_track_key(track_id), Priority::High);
            plan.push(processed_track_key(track_id), Priority::High);

            for (pattern, deps) in &self.dependency_patterns {
                if pattern.contains("{track_id}") {
                    let resolved_pattern = pattern.replace("{track_id}", track_id);
                    if resolved_pattern.contains(track_id.as_str()) {
                        for dep in deps {
                            plan.push(dep.clone(), Priority::Normal);
                        }
                    }
                }
            }
        }

        if !changes.added.is_empty() {
            plan.push(ALL_SENTINEL_KEY, Priority::Normal);
        }

        plan
    }

    /// Runs `Immediate` and `High` tiers synchronously always; `Normal` and
    /// `Low` only when `execute_all`. An `Immediate` failure aborts with
    /// [`ExecuteError::CriticalFailure`]; failures at other tiers are
    /// collected in the returned report, not raised.
    pub async fn execute(
        &self,
        plan: &InvalidationPlan,
        cache: &dyn Invalidatable,
        execute_all: bool,
    ) -> Result<InvalidationReport, ExecuteError> {
        let mut report = InvalidationReport::default();

        let mut tiers = vec![Priority::Immediate, Priority::High];
        if execute_all {
            tiers.push(Priority::Normal);
            tiers.push(Priority::Low);
        }

        for tier in tiers {
            for task in plan.tasks_at(tier) {
                match cache.invalidate(&task.key).await {
                    Ok(_) => report.succeeded.push(task.key.clone()),
                    Err(e) => {
                        if tier == Priority::Immediate {
                            return Err(ExecuteError::CriticalFailure {
                                key: task.key.clone(),
                                reason: e.to_string(),
                            });
                        }
                        tracing::warn!(key = %task.key, error = %e, "tolerated invalidation failure");
                        report.tolerated_failures.push((task.key.clone(), e.to_string()));
                    }
                }
            }
        }

        Ok(report)
    }
}
