use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Wait used when a throttled response carries no usable retry timing.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Signal that the remote endpoint rejected a call because of rate limiting.
///
/// Always carries a non-negative wait. Negative, NaN and infinite values are
/// clamped to zero; finite values too large for a [`Duration`] saturate to
/// [`Duration::MAX`] so a long requested wait is never shortened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleSignal {
    retry_after: Duration,
    global: bool,
}

impl ThrottleSignal {
    pub fn new(retry_after: Duration) -> Self {
        Self {
            retry_after,
            global: false,
        }
    }

    /// Builds a signal from a fractional number of seconds as reported by the
    /// remote API.
    pub fn from_secs_f64(seconds: f64) -> Self {
        let retry_after = if seconds.is_finite() && seconds > 0.0 {
            Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        };
        Self::new(retry_after)
    }

    /// Marks the signal as coming from a global (account-wide) limit rather
    /// than a per-route bucket.
    pub fn with_global(mut self, global: bool) -> Self {
        self.global = global;
        self
    }

    pub fn retry_after(&self) -> Duration {
        self.retry_after
    }

    pub fn is_global(&self) -> bool {
        self.global
    }
}

impl fmt::Display for ThrottleSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "retry after {:.2}s", self.retry_after.as_secs_f64())?;
        if self.global {
            write!(f, " (global)")?;
        }
        Ok(())
    }
}

/// Failure of a single remote call, classified at the call site.
///
/// Throttling is an explicit variant so retry logic never has to inspect
/// status codes buried inside an opaque error.
///
/// # Examples
///
/// ```no_run
/// use relay::common::{RemoteError, ThrottleSignal};
///
/// fn classify(status: u16, retry_after: f64) -> RemoteError<String> {
///     if status == 429 {
///         RemoteError::Throttled(ThrottleSignal::from_secs_f64(retry_after))
///     } else {
///         RemoteError::Other(format!("status {status}"))
///     }
/// }
/// ```
#[derive(Debug, Error)]
pub enum RemoteError<E> {
    /// The call was rejected by rate limiting and may be retried later.
    #[error("Rate limited: {0}")]
    Throttled(ThrottleSignal),

    /// Any other failure. Never retried.
    #[error(transparent)]
    Other(E),
}

impl<E> RemoteError<E> {
    pub fn throttled_secs(seconds: f64) -> Self {
        Self::Throttled(ThrottleSignal::from_secs_f64(seconds))
    }

    pub fn is_throttled(&self) -> bool {
        matches!(self, Self::Throttled(_))
    }

    pub fn throttle_signal(&self) -> Option<ThrottleSignal> {
        match self {
            Self::Throttled(signal) => Some(*signal),
            Self::Other(_) => None,
        }
    }
}

impl<E> From<ThrottleSignal> for RemoteError<E> {
    fn from(signal: ThrottleSignal) -> Self {
        Self::Throttled(signal)
    }
}

/// Terminal outcome of a rate-limited invocation.
///
/// [`Remote`](InvokeError::Remote) holds the operation's own error exactly as
/// it was returned, so callers can match on it without unwrapping layers.
#[derive(Debug, Error)]
pub enum InvokeError<E> {
    /// Every unit of the retry budget was spent on throttle waits.
    #[error("Max retries ({max_retries}) reached for rate-limited operation")]
    MaxRetriesExceeded { max_retries: u32 },

    /// A non-throttle failure, propagated on first occurrence.
    #[error(transparent)]
    Remote(E),
}

impl<E> InvokeError<E> {
    pub fn is_max_retries_exceeded(&self) -> bool {
        matches!(self, Self::MaxRetriesExceeded { .. })
    }

    pub fn remote(&self) -> Option<&E> {
        match self {
            Self::Remote(error) => Some(error),
            Self::MaxRetriesExceeded { .. } => None,
        }
    }

    pub fn into_remote(self) -> Option<E> {
        match self {
            Self::Remote(error) => Some(error),
            Self::MaxRetriesExceeded { .. } => None,
        }
    }
}

/// Errors raised synchronously by the dispatch layer before any remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("Invalid argument '{name}': {reason}")]
    InvalidArgument { name: &'static str, reason: String },
}

impl DispatchError {
    pub fn invalid_argument(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }
}

/// HTTP-related errors for calls made through [`crate::http`].
///
/// Throttled responses are not represented here; they are classified as
/// [`RemoteError::Throttled`] before an `HttpError` is ever built.
///
/// # Error Categories
///
/// ## Request Execution Errors
/// - [`RequestFailed`] - The request could not be sent or the body could not be read
/// - [`Timeout`] - The transport gave up waiting for a response
///
/// ## Response Errors
/// - [`Status`] - The server answered with a non-success status other than 429
/// - [`InvalidResponse`] - Unexpected response format or content
///
/// [`RequestFailed`]: HttpError::RequestFailed
/// [`Timeout`]: HttpError::Timeout
/// [`Status`]: HttpError::Status
/// [`InvalidResponse`]: HttpError::InvalidResponse
#[derive(Debug, Error)]
pub enum HttpError {
    /// HTTP request execution failed.
    ///
    /// # Fields
    /// - `url`: The URL that was being requested
    /// - `reason`: Detailed description of the failure
    #[error("Request failed: {url} - {reason}")]
    RequestFailed { url: String, reason: String },

    /// HTTP request timed out at the transport level.
    #[error("Request timeout: {url}")]
    Timeout { url: String },

    /// The server returned a non-success status.
    ///
    /// # Fields
    /// - `url`: The URL that was requested
    /// - `status`: Numeric HTTP status code
    /// - `body`: Response body, as text, for diagnostics
    #[error("Request to {url} failed with status {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    /// Received response doesn't match expected format.
    #[error("Invalid response: expected {expected}, got {actual}")]
    InvalidResponse { expected: String, actual: String },
}

impl HttpError {
    /// Status code for [`HttpError::Status`], `None` otherwise.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
