use super::errors::{DispatchError, ThrottleSignal};
use governor::{
    Quota, RateLimiter as GovernorRateLimiter,
    clock::{Clock, DefaultClock},
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Client-side token bucket used to pace outgoing calls before the remote
/// API has to throttle them.
///
/// Clones share the same bucket, so one limiter handed to several invokers
/// paces all of them together.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").finish_non_exhaustive()
    }
}

impl RateLimiter {
    fn with_quota(quota: Quota) -> Self {
        Self {
            inner: Arc::new(GovernorRateLimiter::direct(quota)),
        }
    }

    /// Take one token now, or report how long until one is available.
    pub fn check(&self) -> Result<(), ThrottleSignal> {
        match self.inner.check() {
            Ok(()) => Ok(()),
            Err(not_until) => {
                let wait = not_until.wait_time_from(DefaultClock::default().now());
                Err(ThrottleSignal::new(wait))
            }
        }
    }

    /// Wait until a token is available and take it
    pub async fn wait_until_ready(&self) {
        self.inner.until_ready().await;
    }

    /// Take a token, waiting only when the bucket is empty.
    pub async fn acquire(&self) {
        if let Err(signal) = self.check() {
            log::debug!(
                "Pacing outgoing calls, next slot in {:.3} seconds",
                signal.retry_after().as_secs_f64()
            );
            self.wait_until_ready().await;
        }
    }
}

/// Pacing configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimiterConfig {
    /// Maximum requests per second
    pub requests_per_second: u32,
    /// Maximum burst size (defaults to requests_per_second)
    pub burst_size: Option<u32>,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 50,
            burst_size: None,
        }
    }
}

impl RateLimiterConfig {
    pub fn build(&self) -> Result<RateLimiter, DispatchError> {
        let rate = NonZeroU32::new(self.requests_per_second).ok_or_else(|| {
            DispatchError::invalid_argument("requests_per_second", "must be greater than zero")
        })?;
        let burst = NonZeroU32::new(self.burst_size.unwrap_or(self.requests_per_second))
            .ok_or_else(|| {
                DispatchError::invalid_argument("burst_size", "must be greater than zero")
            })?;

        Ok(RateLimiter::with_quota(
            Quota::per_second(rate).allow_burst(burst),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_check_exhausts_burst() {
        let limiter = RateLimiterConfig {
            requests_per_second: 2,
            burst_size: None,
        }
        .build()
        .unwrap();

        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());

        let signal = limiter.check().unwrap_err();
        assert!(signal.retry_after() > Duration::ZERO);
        assert!(signal.retry_after() <= Duration::from_secs(1));
    }

    #[test]
    fn test_zero_rate_is_rejected() {
        let error = RateLimiterConfig {
            requests_per_second: 0,
            burst_size: None,
        }
        .build()
        .unwrap_err();
        assert!(matches!(
            error,
            DispatchError::InvalidArgument {
                name: "requests_per_second",
                ..
            }
        ));

        let error = RateLimiterConfig {
            requests_per_second: 5,
            burst_size: Some(0),
        }
        .build()
        .unwrap_err();
        assert!(matches!(
            error,
            DispatchError::InvalidArgument {
                name: "burst_size",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_wait_until_ready_paces_calls() {
        let limiter = RateLimiterConfig {
            requests_per_second: 10,
            burst_size: None,
        }
        .build()
        .unwrap();
        for _ in 0..10 {
            assert!(limiter.check().is_ok());
        }

        let start = std::time::Instant::now();
        limiter.wait_until_ready().await;
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed <= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_acquire_takes_one_token_per_call() {
        let limiter = RateLimiterConfig {
            requests_per_second: 20,
            burst_size: Some(2),
        }
        .build()
        .unwrap();

        let start = std::time::Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(40));

        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(40));
        assert!(limiter.check().is_err());
    }
}
