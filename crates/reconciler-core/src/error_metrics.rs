//! Error classification, rate tracking, pattern detection, and alert
//! dispatch.
//!
//! Grounded on `examples/original_source/src/shared/monitoring/error_metrics.py`:
//! `ErrorClassifier`'s regex rule table, `ErrorRateTracker`'s bucketed trend
//! analysis, `ErrorPatternDetector`'s impact-score formula, and
//! `ErrorMetricsCollector`'s alert gates.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    /// `severity_factor` in the impact-score formula.
    fn factor(self) -> f64 {
        match self {
            ErrorSeverity::Low => 0.25,
            ErrorSeverity::Medium => 0.5,
            ErrorSeverity::High => 0.75,
            ErrorSeverity::Critical => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    Api,
    Timeout,
    Network,
    Database,
    Deadlock,
    Auth,
    Permission,
    Validation,
    System,
    Unknown,
}

/// A recorded error occurrence. `signature` is computed once at
/// construction, mirroring the Python dataclass's `__post_init__`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub timestamp: DateTime<Utc>,
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub message: String,
    pub exception_type: String,
    pub stack_trace: Option<String>,
    pub context: HashMap<String, String>,
    pub source_module: Option<String>,
    pub error_code: Option<String>,
    pub user_id: Option<String>,
    pub signature: String,
}

/// Replaces digit runs with a placeholder so messages like `"line 17"` and
/// `"line 42"` share a signature.
fn normalize_message(message: &str) -> String {
    let digit_run = Regex::new(r"\d+").expect("static pattern");
    digit_run.replace_all(message, "#").to_string()
}

fn compute_signature(exception_type: &str, category: ErrorCategory, message: &str) -> String {
    let normalized = normalize_message(message);
    let input = format!("{exception_type}|{category:?}|{normalized}");
    let digest = md5::compute(input.as_bytes());
    format!("{digest:x}")[..16].to_string()
}

impl ErrorEvent {
    pub fn new(
        category: ErrorCategory,
        severity: ErrorSeverity,
        message: impl Into<String>,
        exception_type: impl Into<String>,
    ) -> Self {
        let message = message.into();
        let exception_type = exception_type.into();
        let signature = compute_signature(&exception_type, category, &message);
        Self {
            timestamp: Utc::now(),
            category,
            severity,
            message,
            exception_type,
            stack_trace: None,
            context: HashMap::new(),
            source_module: None,
            error_code: None,
            user_id: None,
            signature,
        }
    }
}

/// Pre-compiled regex ruleset for categorizing raw error text. Built once at
/// startup; evaluated in priority order, first match wins.
pub struct ErrorClassifier {
    rules: Vec<(Regex, ErrorCategory, ErrorSeverity)>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        let rule = |pattern: &str, category: ErrorCategory, severity: ErrorSeverity| {
            (
                Regex::new(pattern).expect("static classification pattern"),
                category,
                severity,
            )
        };
        Self {
            rules: vec![
                rule(r"(?i)deadlock", ErrorCategory::Deadlock, ErrorSeverity::High),
                rule(r"(?i)time.?out", ErrorCategory::Timeout, ErrorSeverity::Medium),
                rule(
                    r"(?i)(connection|socket|network|dns)",
                    ErrorCategory::Network,
                    ErrorSeverity::Medium,
                ),
                rule(
                    r"(?i)(sql|database|query|constraint)",
                    ErrorCategory::Database,
                    ErrorSeverity::High,
                ),
                rule(
                    r"(?i)(unauthorized|authentication|token)",
                    ErrorCategory::Auth,
                    ErrorSeverity::High,
                ),
                rule(r"(?i)(forbidden|permission)", ErrorCategory::Permission, ErrorSeverity::High),
                rule(
                    r"(?i)(invalid|validation|malformed)",
                    ErrorCategory::Validation,
                    ErrorSeverity::Low,
                ),
                rule(r"(?i)(api|http|endpoint)", ErrorCategory::Api, ErrorSeverity::Medium),
                rule(
                    r"(?i)(os error|system|disk|memory)",
                    ErrorCategory::System,
                    ErrorSeverity::Critical,
                ),
            ],
        }
    }
}

impl ErrorClassifier {
    /// Matches against `exception_type + " " + message [+ first 500 chars of
    /// stack_trace]`. Defaults to `(Unknown, Medium)`.
    pub fn classify(
        &self,
        exception_type: &str,
        message: &str,
        stack_trace: Option<&str>,
    ) -> (ErrorCategory, ErrorSeverity) {
        let mut haystack = format!("{exception_type} {message}");
        if let Some(trace) = stack_trace {
            haystack.push(' ');
            haystack.push_str(&trace.chars().take(500).collect::<String>());
        }
        for (pattern, category, severity) in &self.rules {
            if pattern.is_match(&haystack) {
                return (*category, *severity);
            }
        }
        (ErrorCategory::Unknown, ErrorSeverity::Medium)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Spike,
    Increasing,
    Decreasing,
    Stable,
}

/// Ring buffer of per-minute error counts over a configurable window.
pub struct ErrorRateTracker {
    window_minutes: usize,
    buckets: VecDeque<u64>,
}

impl ErrorRateTracker {
    pub fn new(window_minutes: usize) -> Self {
        Self {
            window_minutes,
            buckets: VecDeque::from(vec![0u64; window_minutes]),
        }
    }

    /// Advances the ring buffer by one minute, pushing a fresh empty bucket.
    pub fn tick(&mut self) {
        self.buckets.push_back(0);
        if self.buckets.len() > self.window_minutes {
            self.buckets.pop_front();
        }
    }

    pub fn record(&mut self) {
        if let Some(last) = self.buckets.back_mut() {
            *last += 1;
        }
    }

    /// Errors-per-minute over the full window.
    pub fn error_rate_per_minute(&self) -> f64 {
        if self.buckets.is_empty() {
            return 0.0;
        }
        self.buckets.iter().sum::<u64>() as f64 / self.buckets.len() as f64
    }

    /// Trend over the most recent four buckets: `recent_avg` (last two) vs
    /// `older_avg` (previous two).
    pub fn trend(&self) -> Trend {
        let n = self.buckets.len();
        if n < 4 {
            return Trend::Stable;
        }
        let recent_avg =
            (self.buckets[n - 1] + self.buckets[n - 2]) as f64 / 2.0;
        let older_avg = (self.buckets[n - 3] + self.buckets[n - 4]) as f64 / 2.0;

        if older_avg == 0.0 {
            return if recent_avg > 0.0 { Trend::Increasing } else { Trend::Stable };
        }
        let ratio = recent_avg / older_avg;
        if ratio > 2.0 {
            Trend::Spike
        } else if ratio > 1.5 {
            Trend::Increasing
        } else if ratio < 0.5 {
            Trend::Decreasing
        } else {
            Trend::Stable
        }
    }
}

/// A detected recurring error, tracked per signature.
#[derive(Debug, Clone)]
pub struct ErrorPattern {
    pub signature: String,
    pub count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub impact_score: f64,
}

/// Per-signature timestamp history, pruned to the detection window.
pub struct ErrorPatternDetector {
    window: chrono::Duration,
    min_occurrences: u64,
    occurrences: HashMap<String, VecDeque<DateTime<Utc>>>,
    patterns: HashMap<String, ErrorPattern>,
}

impl ErrorPatternDetector {
    pub fn new(window_minutes: i64, min_occurrences: u64) -> Self {
        Self {
            window: chrono::Duration::minutes(window_minutes),
            min_occurrences,
            occurrences: HashMap::new(),
            patterns: HashMap::new(),
        }
    }

    /// Records an occurrence and, once `count >= min_occurrences`,
    /// emits/updates the pattern for this signature.
    pub fn record(&mut self, event: &ErrorEvent) -> Option<&ErrorPattern> {
        let now = event.timestamp;
        let entry = self
            .occurrences
            .entry(event.signature.clone())
            .or_default();
        entry.push_back(now);
        while let Some(front) = entry.front() {
            if now.signed_duration_since(*front) > self.window {
                entry.pop_front();
            } else {
                break;
            }
        }

        let count = entry.len() as u64;
        if count < self.min_occurrences {
            return None;
        }

        let first_seen = *entry.front().unwrap_or(&now);
        let minutes_since_previous = self
            .patterns
            .get(&event.signature)
            .map(|p| now.signed_duration_since(p.last_seen).num_seconds() as f64 / 60.0)
            .unwrap_or(0.0);

        let time_factor = (1.0 - minutes_since_previous / 60.0).max(0.1);
        let impact_score = count as f64 * time_factor * event.severity.factor();

        self.patterns.insert(
            event.signature.clone(),
            ErrorPattern {
                signature: event.signature.clone(),
                count,
                first_seen,
                last_seen: now,
                impact_score,
            },
        );
        self.patterns.get(&event.signature)
    }
}

pub const HIGH_ERROR_RATE_THRESHOLD_PER_MINUTE: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertKind {
    HighErrorRate,
    ErrorRateSpike,
    CriticalError,
}

#[derive(Debug, Clone)]
pub struct Alert {
    pub kind: AlertKind,
    pub severity: ErrorSeverity,
    pub message: String,
}

/// An alert handler. Exceptions (returned `Err`) are caught and logged,
/// never propagated — recording an error must never itself fail a run.
pub trait AlertHandler {
    fn handle(&self, alert: &Alert) -> Result<(), String>;
}

/// Logs the alert via `tracing` and never fails. Mirrors
/// `default_error_alert_handler`.
pub struct TracingAlertHandler;

impl AlertHandler for TracingAlertHandler {
    fn handle(&self, alert: &Alert) -> Result<(), String> {
        tracing::warn!(kind = ?alert.kind, severity = ?alert.severity, "{}", alert.message);
        Ok(())
    }
}

/// Top-level collector composing the classifier, rate tracker, pattern
/// detector, and alert dispatch.
pub struct ErrorMetricsCollector {
    classifier: ErrorClassifier,
    rate_tracker: ErrorRateTracker,
    pattern_detector: ErrorPatternDetector,
    handlers: Vec<Box<dyn AlertHandler + Send + Sync>>,
}

impl ErrorMetricsCollector {
    pub fn new(window_minutes: usize, pattern_min_occurrences: u64) -> Self {
        Self {
            classifier: ErrorClassifier::default(),
            rate_tracker: ErrorRateTracker::new(window_minutes),
            pattern_detector: ErrorPatternDetector::new(window_minutes as i64, pattern_min_occurrences),
            handlers: vec![Box::new(TracingAlertHandler)],
        }
    }

    pub fn add_handler(&mut self, handler: Box<dyn AlertHandler + Send + Sync>) {
        self.handlers.push(handler);
    }

    pub fn classify(
        &self,
        exception_type: &str,
        message: &str,
        stack_trace: Option<&str>,
    ) -> (ErrorCategory, ErrorSeverity) {
        self.classifier.classify(exception_type, message, stack_trace)
    }

    /// Records an error event, updates the rate tracker and pattern
    /// detector, and dispatches any alerts the new state triggers.
    pub fn record_error(&mut self, event: ErrorEvent) {
        self.rate_tracker.record();
        let pattern = self.pattern_detector.record(&event).cloned();
        self.check_alerts(&event, pattern.as_ref());
    }

    fn check_alerts(&self, event: &ErrorEvent, pattern: Option<&ErrorPattern>) {
        let mut alerts = Vec::new();

        let rate = self.rate_tracker.error_rate_per_minute();
        if rate > HIGH_ERROR_RATE_THRESHOLD_PER_MINUTE {
            alerts.push(Alert {
                kind: AlertKind::HighErrorRate,
                severity: ErrorSeverity::High,
                message: format!("error rate {rate:.2}/min exceeds threshold"),
            });
        }

        if self.rate_tracker.trend() == Trend::Spike {
            alerts.push(Alert {
                kind: AlertKind::ErrorRateSpike,
                severity: ErrorSeverity::Critical,
                message: "error rate trend classified as a spike".to_string(),
            });
        }

        if event.severity == ErrorSeverity::Critical {
            alerts.push(Alert {
                kind: AlertKind::CriticalError,
                severity: ErrorSeverity::Critical,
                message: format!("critical error recorded: {}", event.message),
            });
        }

        if let Some(p) = pattern {
            tracing::debug!(signature = %p.signature, impact_score = p.impact_score, "recurring error pattern");
        }

        for alert in &alerts {
            for handler in &self.handlers {
                if let Err(err) = handler.handle(alert) {
                    tracing::error!(error = %err, "alert handler failed; continuing");
                }
            }
        }
    }
}
