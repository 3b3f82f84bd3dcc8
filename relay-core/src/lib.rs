//! # Relay Core Library
//!
//! Rate-limit-aware execution core for chat platform API clients.
//! Remote calls that may be throttled (HTTP 429) are wrapped in a bounded
//! retry loop, and sends to many targets are fanned out in fixed-size
//! batches with independent per-target outcomes.
//!
//! ## Modules
//!
//! - [`common`] - Error taxonomy, throttle signals, sleeper and pacing limiter
//! - [`invoker`] - Retry-on-throttle wrapper for single operations
//! - [`dispatch`] - Bounded batch dispatcher and its report types
//! - [`http`] - Classification of `reqwest` responses into throttle/other errors
//! - [`config`] - Configuration loading from file and environment
//! - [`context`] - Explicit context object bundling config, invoker and dispatcher
//! - [`logger`] - `fern` logger setup

pub mod common;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod http;
pub mod invoker;
pub mod logger;

pub use common::{DispatchError, InvokeError, RemoteError, ThrottleSignal};
pub use context::RelayContext;
pub use dispatch::{BoundedBatchDispatcher, DispatchReport, TargetOutcome};
pub use invoker::RateLimitedInvoker;
