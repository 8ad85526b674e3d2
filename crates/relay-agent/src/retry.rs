use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::sleep;

use crate::{AgentError, AgentErrorClass};

pub const DEFAULT_MAX_RETRIES: usize = 3;
pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Bounded exponential backoff applied to agent stream establishment.
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

/// Delay before the retry that follows failed attempt `attempt` (zero-based):
/// `min(base * 2^attempt, cap)`.
pub fn backoff_delay_ms(policy: &RetryPolicy, attempt: usize) -> u64 {
    let shift = attempt.min(32) as u32;
    policy
        .base_delay_ms
        .saturating_mul(1_u64 << shift)
        .min(policy.max_delay_ms)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Why a retried call gave up.
pub enum RetryFailureKind {
    Permanent,
    Exhausted,
}

#[derive(Debug)]
/// Result of [`open_with_retry`]; `attempts` counts every call made,
/// including the first.
pub enum RetryOutcome<T> {
    Opened {
        value: T,
        attempts: usize,
    },
    Failed {
        kind: RetryFailureKind,
        error: AgentError,
        attempts: usize,
    },
}

impl<T> RetryOutcome<T> {
    pub fn attempts(&self) -> usize {
        match self {
            Self::Opened { attempts, .. } | Self::Failed { attempts, .. } => *attempts,
        }
    }
}

/// Runs `call` until it succeeds, fails permanently, or `max_retries`
/// transient failures have been retried. `call` receives the zero-based
/// attempt index.
pub async fn open_with_retry<T, F, Fut>(policy: &RetryPolicy, mut call: F) -> RetryOutcome<T>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, AgentError>>,
{
    let mut attempt = 0usize;
    loop {
        let error = match call(attempt).await {
            Ok(value) => {
                return RetryOutcome::Opened {
                    value,
                    attempts: attempt + 1,
                }
            }
            Err(error) => error,
        };

        if error.class() == AgentErrorClass::Permanent {
            tracing::warn!(
                attempt,
                reason_code = error.reason_code(),
                http_status = ?error.http_status(),
                "agent call failed permanently; not retrying"
            );
            return RetryOutcome::Failed {
                kind: RetryFailureKind::Permanent,
                error,
                attempts: attempt + 1,
            };
        }
        if attempt >= policy.max_retries {
            tracing::error!(
                attempts = attempt + 1,
                reason_code = error.reason_code(),
                http_status = ?error.http_status(),
                "agent call retries exhausted"
            );
            return RetryOutcome::Failed {
                kind: RetryFailureKind::Exhausted,
                error,
                attempts: attempt + 1,
            };
        }

        let delay_ms = backoff_delay_ms(policy, attempt);
        tracing::warn!(
            attempt,
            delay_ms,
            reason_code = error.reason_code(),
            http_status = ?error.http_status(),
            "transient agent failure; retrying"
        );
        if delay_ms > 0 {
            sleep(Duration::from_millis(delay_ms)).await;
        }
        attempt += 1;
    }
}

pub fn new_request_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let count = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("relay-{millis}-{count}")
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::{
        backoff_delay_ms, new_request_id, open_with_retry, RetryFailureKind, RetryOutcome,
        RetryPolicy,
    };
    use crate::AgentError;

    fn fast_policy(max_retries: usize) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay_ms: 1,
            max_delay_ms: 2,
        }
    }

    fn unavailable() -> AgentError {
        AgentError::HttpStatus {
            status: 503,
            body: "{}".to_string(),
        }
    }

    #[test]
    fn unit_backoff_doubles_until_cap() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        };
        assert_eq!(backoff_delay_ms(&policy, 0), 1_000);
        assert_eq!(backoff_delay_ms(&policy, 1), 2_000);
        assert_eq!(backoff_delay_ms(&policy, 2), 4_000);
        assert_eq!(backoff_delay_ms(&policy, 5), 30_000);
        assert_eq!(backoff_delay_ms(&policy, 200), 30_000);
    }

    #[tokio::test]
    async fn functional_always_transient_call_is_attempted_max_retries_plus_one_times() {
        let calls = AtomicUsize::new(0);
        let outcome: RetryOutcome<()> = open_with_retry(&fast_policy(3), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(unavailable()) }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match outcome {
            RetryOutcome::Failed {
                kind, attempts, ..
            } => {
                assert_eq!(kind, RetryFailureKind::Exhausted);
                assert_eq!(attempts, 4);
            }
            RetryOutcome::Opened { .. } => panic!("expected exhausted retries"),
        }
    }

    #[tokio::test]
    async fn functional_permanent_failure_is_not_retried() {
        let calls = AtomicUsize::new(0);
        let outcome: RetryOutcome<()> = open_with_retry(&fast_policy(3), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(AgentError::HttpStatus {
                    status: 401,
                    body: String::new(),
                })
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            outcome,
            RetryOutcome::Failed {
                kind: RetryFailureKind::Permanent,
                attempts: 1,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn integration_transient_then_success_reports_attempt_count() {
        let outcome = open_with_retry(&fast_policy(3), |attempt| async move {
            if attempt < 2 {
                Err(unavailable())
            } else {
                Ok(attempt)
            }
        })
        .await;
        match outcome {
            RetryOutcome::Opened { value, attempts } => {
                assert_eq!(value, 2);
                assert_eq!(attempts, 3);
            }
            RetryOutcome::Failed { error, .. } => panic!("unexpected failure: {error}"),
        }
    }

    #[tokio::test]
    async fn regression_zero_retries_fails_after_single_attempt() {
        let outcome: RetryOutcome<()> =
            open_with_retry(&fast_policy(0), |_| async { Err(unavailable()) }).await;
        assert_eq!(outcome.attempts(), 1);
    }

    #[test]
    fn request_ids_are_unique() {
        let a = new_request_id();
        let b = new_request_id();
        assert_ne!(a, b);
        assert!(a.starts_with("relay-"));
    }
}
