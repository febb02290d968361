//! Per-provider call budget with bounded retry

use super::ProviderError;
use codecite_common::config::ProviderConfig;
use codecite_common::{Error, Result};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::future::Future;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, warn};

/// Budget of `calls` per `window`, plus retry policy.
///
/// `Transient` errors are retried after a fixed backoff, `RateLimited` after one full
/// window. Both share the same retry bound; other errors return immediately.
pub struct Throttle {
    limiter: DefaultDirectRateLimiter,
    window: Duration,
    max_retries: u32,
    backoff: Duration,
}

impl Throttle {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        Self::with_limits(
            config.calls_per_window,
            Duration::from_secs(config.window_secs),
            config.max_retries,
            Duration::from_millis(config.retry_backoff_ms),
        )
    }

    pub fn with_limits(
        calls: u32,
        window: Duration,
        max_retries: u32,
        backoff: Duration,
    ) -> Result<Self> {
        let burst = NonZeroU32::new(calls)
            .ok_or_else(|| Error::Config("provider call budget must be non-zero".to_string()))?;
        let quota = Quota::with_period(window / calls)
            .ok_or_else(|| Error::Config("provider window too short".to_string()))?
            .allow_burst(burst);

        Ok(Self {
            limiter: RateLimiter::direct(quota),
            window,
            max_retries,
            backoff,
        })
    }

    /// Run `op` within the budget, retrying per the policy
    pub async fn call<T, F, Fut>(&self, mut op: F) -> std::result::Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, ProviderError>>,
    {
        let mut attempt = 0;
        loop {
            self.limiter.until_ready().await;

            let error = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            let delay = match &error {
                ProviderError::Transient(_) => self.backoff,
                ProviderError::RateLimited => self.window,
                _ => return Err(error),
            };

            if attempt >= self.max_retries {
                warn!(attempts = attempt + 1, "Provider retries exhausted: {}", error);
                return Err(error);
            }
            attempt += 1;

            debug!(attempt, delay_ms = delay.as_millis() as u64, "Retrying provider call: {}", error);
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    fn fast(max_retries: u32) -> Throttle {
        Throttle::with_limits(100, Duration::from_millis(20), max_retries, Duration::from_millis(1))
            .unwrap()
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let throttle = fast(3);
        let calls = Arc::new(AtomicU32::new(0));

        let result = throttle
            .call(|| {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(ProviderError::Transient("timeout".to_string()))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let throttle = fast(2);
        let calls = Arc::new(AtomicU32::new(0));

        let result: std::result::Result<(), _> = throttle
            .call(|| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ProviderError::RateLimited)
                }
            })
            .await;

        assert!(matches!(result, Err(ProviderError::RateLimited)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let throttle = fast(5);
        let calls = Arc::new(AtomicU32::new(0));

        let result: std::result::Result<(), _> = throttle
            .call(|| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ProviderError::NotFound("o/r".to_string()))
                }
            })
            .await;

        assert!(matches!(result, Err(ProviderError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_budget_spaces_calls() {
        // 2 calls per 200ms: the third call must wait for a replenished cell
        let throttle =
            Throttle::with_limits(2, Duration::from_millis(200), 0, Duration::from_millis(1))
                .unwrap();

        let start = Instant::now();
        for _ in 0..3 {
            throttle.call(|| async { Ok::<_, ProviderError>(()) }).await.unwrap();
        }
        assert!(start.elapsed() >= Duration::from_millis(80));
    }

    #[test]
    fn test_zero_budget_rejected() {
        let result = Throttle::with_limits(0, Duration::from_secs(1), 1, Duration::from_millis(1));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
