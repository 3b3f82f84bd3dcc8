//! Retry wrapper for remote calls that may be throttled.
//!
//! [`RateLimitedInvoker`] retries only [`RemoteError::Throttled`] failures,
//! waiting exactly as long as each signal asks. Every other error is handed
//! back unchanged on its first occurrence.

use crate::common::{InvokeError, RateLimiter, RemoteError, Sleeper, TokioSleeper};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Number of throttle retries one invocation may spend.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Per-invocation retry counter. Starts full and only ever counts down to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    max: u32,
    remaining: u32,
}

impl RetryBudget {
    pub fn new(max: u32) -> Self {
        Self {
            max,
            remaining: max,
        }
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn used(&self) -> u32 {
        self.max - self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Spend one unit. Returns `false` when nothing was left to spend.
    pub fn consume(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}

/// Wraps a single asynchronous remote operation with bounded
/// retry-on-throttle logic.
///
/// # Examples
///
/// ```no_run
/// use relay::common::RemoteError;
/// use relay::invoker::RateLimitedInvoker;
///
/// # async fn rename(name: &str) -> Result<(), RemoteError<std::io::Error>> { Ok(()) }
/// # async fn run() {
/// let invoker = RateLimitedInvoker::default();
/// let renamed = invoker.invoke(|| rename("new name")).await;
/// # }
/// ```
#[derive(Clone)]
pub struct RateLimitedInvoker {
    max_retries: u32,
    sleeper: Arc<dyn Sleeper>,
    pacer: Option<RateLimiter>,
}

impl fmt::Debug for RateLimitedInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitedInvoker")
            .field("max_retries", &self.max_retries)
            .field("pacer", &self.pacer)
            .finish_non_exhaustive()
    }
}

impl Default for RateLimitedInvoker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}

impl RateLimitedInvoker {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            sleeper: Arc::new(TokioSleeper),
            pacer: None,
        }
    }

    /// Replace the sleeper used for throttle waits.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Wait on `pacer` before every attempt, including retries.
    pub fn with_pacer(mut self, pacer: RateLimiter) -> Self {
        self.pacer = Some(pacer);
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Call `operation` until it succeeds, fails with a non-throttle error,
    /// or the retry budget runs out.
    ///
    /// `operation` is called again for every retry, so it must rebuild the
    /// request from the same arguments each time.
    ///
    /// # Errors
    ///
    /// - [`InvokeError::Remote`] with the operation's error, unchanged, on the
    ///   first non-throttle failure
    /// - [`InvokeError::MaxRetriesExceeded`] after `max_retries` throttle
    ///   waits without a success
    pub async fn invoke<F, Fut, T, E>(&self, mut operation: F) -> Result<T, InvokeError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError<E>>>,
    {
        let mut budget = RetryBudget::new(self.max_retries);

        while !budget.is_exhausted() {
            if let Some(pacer) = &self.pacer {
                pacer.acquire().await;
            }

            match operation().await {
                Ok(value) => {
                    if budget.used() > 0 {
                        log::debug!(
                            "Operation succeeded after {} rate-limited attempts",
                            budget.used()
                        );
                    }
                    return Ok(value);
                }
                Err(RemoteError::Other(error)) => return Err(InvokeError::Remote(error)),
                Err(RemoteError::Throttled(signal)) => {
                    budget.consume();
                    let wait = signal.retry_after();
                    log::warn!(
                        "Rate limited{}. Retrying in {:.2} seconds... ({}/{})",
                        if signal.is_global() { " globally" } else { "" },
                        wait.as_secs_f64(),
                        budget.used(),
                        budget.max()
                    );
                    self.sleeper.sleep(wait).await;
                }
            }
        }

        log::error!(
            "Max retries ({}) reached for rate-limited operation",
            self.max_retries
        );
        Err(InvokeError::MaxRetriesExceeded {
            max_retries: self.max_retries,
        })
    }

    /// Invoke `operation` once per item, strictly one after another.
    ///
    /// Each item gets its own retry budget. A terminal error for one item is
    /// logged and recorded in its slot; the remaining items still run.
    pub async fn invoke_each<'a, I, F, Fut, T, E>(
        &self,
        items: &'a [I],
        operation: F,
    ) -> Vec<Result<T, InvokeError<E>>>
    where
        F: Fn(&'a I) -> Fut,
        Fut: Future<Output = Result<T, RemoteError<E>>>,
        E: fmt::Display,
    {
        let mut results = Vec::with_capacity(items.len());

        for (index, item) in items.iter().enumerate() {
            let result = self.invoke(|| operation(item)).await;
            if let Err(e) = &result {
                log::error!("Operation {} of {} failed: {}", index + 1, items.len(), e);
            }
            results.push(result);
        }

        results
    }
}
