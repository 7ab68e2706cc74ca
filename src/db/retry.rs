use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Bounded exponential backoff for transient failures.
///
/// The delay after failed attempt `n` (0-based) is
/// `base_delay_ms * 2^n + random(jitter_min_ms..=jitter_max_ms)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay_ms: 50,
            jitter_min_ms: 10,
            jitter_max_ms: 50,
        }
    }
}

impl RetryPolicy {
    /// Retry without sleeping between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            jitter_min_ms: 0,
            jitter_max_ms: 0,
        }
    }

    /// Exponential part of the delay after failed attempt `attempt`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let jitter = if self.jitter_max_ms > self.jitter_min_ms {
            rand::thread_rng().gen_range(self.jitter_min_ms..=self.jitter_max_ms)
        } else {
            self.jitter_min_ms
        };
        self.base_delay(attempt) + Duration::from_millis(jitter)
    }

    /// How long to wait before the next attempt, or `None` to stop.
    ///
    /// `attempt` is the 0-based index of the attempt that just failed.
    pub fn next_delay(&self, attempt: u32, retryable: bool) -> Option<Duration> {
        if !retryable || attempt + 1 >= self.max_attempts.max(1) {
            return None;
        }
        Some(self.delay_for(attempt))
    }

    /// Drive `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget runs out. Waits are `tokio::time::sleep` suspension points.
    pub async fn run<T, E, F, Fut>(&self, mut op: F, is_retryable: impl Fn(&E) -> bool) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => match self.next_delay(attempt, is_retryable(&err)) {
                    Some(delay) => {
                        warn!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, error = %err, "retrying");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => return Err(err),
                },
            }
        }
    }

    /// Blocking twin of [`RetryPolicy::run`] for callers outside a runtime.
    pub fn run_blocking<T, E, F>(&self, mut op: F, is_retryable: impl Fn(&E) -> bool) -> Result<T, E>
    where
        F: FnMut(u32) -> Result<T, E>,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) => match self.next_delay(attempt, is_retryable(&err)) {
                    Some(delay) => {
                        warn!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, error = %err, "retrying");
                        std::thread::sleep(delay);
                        attempt += 1;
                    }
                    None => return Err(err),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    enum Fail {
        Transient,
        Fatal,
    }

    impl std::fmt::Display for Fail {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    fn transient(e: &Fail) -> bool {
        matches!(e, Fail::Transient)
    }

    #[test]
    fn test_default_policy() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_attempts, 10);
        assert_eq!(p.base_delay(0), Duration::from_millis(50));
        assert_eq!(p.base_delay(3), Duration::from_millis(400));
    }

    #[test]
    fn test_delay_includes_jitter() {
        let p = RetryPolicy::default();
        for attempt in 0..5 {
            let d = p.delay_for(attempt);
            let base = p.base_delay(attempt);
            assert!(d >= base + Duration::from_millis(10));
            assert!(d <= base + Duration::from_millis(50));
        }
    }

    #[test]
    fn test_next_delay_stops_at_budget() {
        let p = RetryPolicy::immediate(3);
        assert!(p.next_delay(0, true).is_some());
        assert!(p.next_delay(1, true).is_some());
        assert!(p.next_delay(2, true).is_none());
        assert!(p.next_delay(0, false).is_none());
    }

    #[test]
    fn test_base_delay_saturates() {
        let p = RetryPolicy::default();
        assert_eq!(p.base_delay(200), Duration::from_millis(u64::MAX));
    }

    #[tokio::test]
    async fn test_succeeds_after_n_minus_one_transient_failures() {
        let policy = RetryPolicy::immediate(10);
        let calls = AtomicU32::new(0);
        let result = policy
            .run(
                |_| {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    async move {
                        if n < 10 {
                            Err(Fail::Transient)
                        } else {
                            Ok("done")
                        }
                    }
                },
                transient,
            )
            .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let policy = RetryPolicy::immediate(10);
        let calls = AtomicU32::new(0);
        let result: Result<(), Fail> = policy
            .run(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(Fail::Transient) }
                },
                transient,
            )
            .await;
        assert!(matches!(result, Err(Fail::Transient)));
        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let policy = RetryPolicy::immediate(10);
        let calls = AtomicU32::new(0);
        let result: Result<(), Fail> = policy
            .run(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(Fail::Fatal) }
                },
                transient,
            )
            .await;
        assert!(matches!(result, Err(Fail::Fatal)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_run_blocking_counts_attempts() {
        let policy = RetryPolicy::immediate(4);
        let mut calls = 0;
        let result: Result<u32, Fail> = policy.run_blocking(
            |attempt| {
                calls += 1;
                if attempt < 3 {
                    Err(Fail::Transient)
                } else {
                    Ok(attempt)
                }
            },
            transient,
        );
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls, 4);
    }
}
