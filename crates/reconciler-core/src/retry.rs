//! Async retry with exponential backoff, deterministic jitter, transient
//! error classification, and a total-deadline enforcement.
//!
//! Grounded on `examples/original_source/src/core/retry_handler.py`'s
//! `DatabaseRetryHandler`/`RetryPolicy`/`RetryOperationContext`, and styled
//! after a `recovery::retry_database_operation`-style retry loop.

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

/// Configuration for retry behavior with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_seconds: f64,
    pub max_delay_seconds: f64,
    pub exponential_base: f64,
    /// Fraction of the capped delay applied as jitter, in `[0, 1]`.
    pub jitter_range: f64,
    pub operation_timeout_seconds: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_seconds: 1.0,
            max_delay_seconds: 60.0,
            exponential_base: 2.0,
            jitter_range: 0.1,
            operation_timeout_seconds: 300.0,
        }
    }
}

/// Freeform metadata a caller can attach to a retry context for logging.
pub type RetryMetadata = HashMap<String, String>;

/// Tracks progress and attempt history for a single retried operation.
#[derive(Debug, Clone)]
pub struct RetryOperationContext {
    pub operation_id: String,
    pub policy: RetryPolicy,
    start_time: Instant,
    pub attempt_count: u32,
    pub metadata: RetryMetadata,
}

impl RetryOperationContext {
    fn new(operation_id: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            operation_id: operation_id.into(),
            policy,
            start_time: Instant::now(),
            attempt_count: 0,
            metadata: RetryMetadata::new(),
        }
    }

    pub fn total_elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn has_exceeded_timeout(&self) -> bool {
        self.total_elapsed().as_secs_f64() > self.policy.operation_timeout_seconds
    }
}

#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("operation '{operation_id}' exceeded its total timeout of {timeout_seconds}s")]
    DeadlineExceeded {
        operation_id: String,
        timeout_seconds: f64,
    },

    #[error("operation '{operation_id}' was cancelled")]
    Cancelled { operation_id: String },

    #[error("operation '{operation_id}' failed after {attempts} attempts")]
    Exhausted {
        operation_id: String,
        attempts: u32,
        source: E,
    },

    #[error("operation '{operation_id}' failed with a non-transient error")]
    NonTransient { operation_id: String, source: E },
}

/// Fixed substring set matched case-insensitively against an error message.
const TRANSIENT_MESSAGE_PATTERNS: &[&str] = &[
    "connection refused",
    "connection reset",
    "timeout",
    "temporary failure",
    "resource temporarily unavailable",
    "too many connections",
    "deadlock",
    "lock wait timeout",
    "database is locked",
    "cursor closed",
    "connection closed",
];

/// Errno codes that indicate a transient OS-level condition even when
/// wrapped inside another error type.
const TRANSIENT_ERRNOS: &[i32] = &[111, 110, 104, 32, 61];

/// Classifies an error as transient purely from its textual representation
/// and, if present, its raw OS errno. Callers that wrap `std::io::Error`
/// should pass its `raw_os_error()` through `errno`.
pub fn is_transient_message(message: &str, errno: Option<i32>) -> bool {
    if let Some(code) = errno {
        if TRANSIENT_ERRNOS.contains(&code) {
            return true;
        }
    }
    let lower = message.to_lowercase();
    TRANSIENT_MESSAGE_PATTERNS
        .iter()
        .any(|pattern| lower.contains(pattern))
}

/// Computes the delay before the next retry attempt.
///
/// `delay = min(base * base_exp^attempt, max_delay)`, then a deterministic
/// jitter is applied: `jitter_seed = (attempt*31+17) % 100 / 100.0`,
/// `jitter_offset = (jitter_seed - 0.5) * 2 * (capped_delay * jitter_range)`,
/// floored at zero. Jitter depends only on the attempt number, so replays
/// with equal `(attempt, policy)` are byte-identical.
pub fn calculate_delay_seconds(attempt_number: u32, policy: &RetryPolicy) -> f64 {
    let exponential_delay =
        policy.base_delay_seconds * policy.exponential_base.powi(attempt_number as i32);
    let capped_delay = exponential_delay.min(policy.max_delay_seconds);

    let jitter_amount = capped_delay * policy.jitter_range;
    let jitter_seed = ((attempt_number as i64 * 31 + 17) % 100) as f64 / 100.0;
    let jitter_offset = (jitter_seed - 0.5) * 2.0 * jitter_amount;

    (capped_delay + jitter_offset).max(0.0)
}

/// Outcome signal a retried closure returns: either success, or a
/// classified failure the retry loop uses to decide whether to retry.
pub enum Attempt<T, E> {
    Success(T),
    Transient(E),
    Permanent(E),
}

/// Executes `operation` up to `policy.max_retries + 1` times, sleeping
/// between attempts per [`calculate_delay_seconds`]. The operation closure
/// classifies its own failures via the returned [`Attempt`] variant; this
/// avoids retry.rs needing to know about every caller's error type.
pub async fn execute_with_retry<T, E, F, Fut>(
    operation_id: &str,
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Attempt<T, E>>,
{
    let mut ctx = RetryOperationContext::new(operation_id, policy.clone());

    debug!(
        operation_id,
        max_retries = policy.max_retries,
        base_delay = policy.base_delay_seconds,
        "starting retry operation"
    );

    for attempt in 0..=policy.max_retries {
        ctx.attempt_count = attempt + 1;

        if ctx.has_exceeded_timeout() {
            return Err(RetryError::DeadlineExceeded {
                operation_id: operation_id.to_string(),
                timeout_seconds: policy.operation_timeout_seconds,
            });
        }

        match operation(attempt).await {
            Attempt::Success(value) => {
                debug!(
                    operation_id,
                    attempt = attempt + 1,
                    elapsed_s = ctx.total_elapsed().as_secs_f64(),
                    "operation succeeded"
                );
                return Ok(value);
            }
            Attempt::Permanent(err) => {
                warn!(operation_id, "operation failed with a non-transient error");
                return Err(RetryError::NonTransient {
                    operation_id: operation_id.to_string(),
                    source: err,
                });
            }
            Attempt::Transient(err) => {
                if attempt >= policy.max_retries {
                    return Err(RetryError::Exhausted {
                        operation_id: operation_id.to_string(),
                        attempts: attempt + 1,
                        source: err,
                    });
                }
                let delay = calculate_delay_seconds(attempt, &policy);
                warn!(
                    operation_id,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries + 1,
                    delay_s = delay,
                    "operation failed, retrying"
                );
                tokio::time::sleep(Duration::from_secs_f64(delay)).await;
            }
        }
    }

    unreachable!("loop always returns via Ok/Err before exhausting its range")
}
