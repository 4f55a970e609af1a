//! Retry-with-backoff wrapper used by every network read of the reconciler.
//!
//! Only [`EngineError::TransientNetwork`] failures are retried; anything else
//! (validation, malformed data) returns immediately. When attempts run out the
//! last error is returned and the caller decides whether to skip the item.

use crate::error::{EngineError, Result};
use crate::settings::RetrySettings;
use std::future::Future;
use std::time::Duration;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::RetryIf;
use tracing::{debug, warn};

pub const MIN_ATTEMPTS: u32 = 3;
pub const MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` counts the first try and is clamped to `3..=5`.
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.clamp(MIN_ATTEMPTS, MAX_ATTEMPTS),
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(
            settings.max_attempts,
            Duration::from_millis(settings.base_delay_ms),
            Duration::from_millis(settings.max_delay_ms),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delays between attempts: base, 2*base, 4*base, ... capped at `max_delay`.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let factor = (self.base_delay.as_millis() as u64 / 2).max(1);
        ExponentialBackoff::from_millis(2)
            .factor(factor)
            .max_delay(self.max_delay)
            .take(self.max_attempts.saturating_sub(1) as usize)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(MIN_ATTEMPTS, Duration::from_millis(200), Duration::from_secs(5))
    }
}

/// Runs `op` until it succeeds, fails with a non-transient error, or the policy
/// runs out of attempts.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts;
    let mut attempt = 0u32;

    let action = || {
        attempt += 1;
        let current = attempt;
        let fut = op();
        async move {
            match fut.await {
                Ok(value) => {
                    if current > 1 {
                        debug!("{} succeeded on attempt {}/{}", label, current, max_attempts);
                    }
                    Ok(value)
                }
                Err(e) => {
                    warn!(
                        "⚠️ {} failed (attempt {}/{}): {}",
                        label, current, max_attempts, e
                    );
                    Err(e)
                }
            }
        }
    };

    RetryIf::spawn(policy.delays(), action, |e: &EngineError| e.is_transient()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2))
    }

    #[test]
    fn test_attempts_are_clamped() {
        assert_eq!(RetryPolicy::new(1, Duration::ZERO, Duration::ZERO).max_attempts(), 3);
        assert_eq!(RetryPolicy::new(9, Duration::ZERO, Duration::ZERO).max_attempts(), 5);
    }

    #[test]
    fn test_delays_grow_and_cap() {
        let policy = RetryPolicy::new(5, Duration::from_millis(200), Duration::from_millis(500));
        let delays: Vec<u64> = policy.delays().map(|d| d.as_millis() as u64).collect();
        assert_eq!(delays, vec![200, 400, 500, 500]);
    }

    #[tokio::test]
    async fn test_recovers_from_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_policy(), "flaky", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(EngineError::transient("flaky", "timeout"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(&fast_policy(), "down", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(EngineError::transient("down", "connection refused")) }
        })
        .await;
        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_validation_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(&fast_policy(), "invalid", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(EngineError::validation("bad input")) }
        })
        .await;
        assert!(matches!(result, Err(EngineError::Validation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
