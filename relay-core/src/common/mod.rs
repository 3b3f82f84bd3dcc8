pub mod errors;
pub mod rate_limiter;
pub mod sleeper;

pub use errors::{
    DEFAULT_RETRY_AFTER, DispatchError, HttpError, InvokeError, RemoteError, ThrottleSignal,
};
pub use rate_limiter::{RateLimiter, RateLimiterConfig};
pub use sleeper::{Sleeper, TokioSleeper};
