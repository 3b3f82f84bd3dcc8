//! Types and traits for batch dispatch.
//!
//! Targets describe whether they can receive a payload through
//! [`TargetResource::as_messageable`]; only those that can get a send task.
//! Results are collected into a [`DispatchReport`] in original target order.

use crate::common::{InvokeError, RemoteError};
use async_trait::async_trait;
use std::fmt;

/// Capability to accept a payload, e.g. a text channel that can receive a
/// message.
///
/// # Examples
///
/// ```no_run
/// use async_trait::async_trait;
/// use relay::common::{HttpError, RemoteError};
/// use relay::dispatch::Messageable;
///
/// struct TextChannel {
///     id: u64,
/// }
///
/// #[async_trait]
/// impl Messageable for TextChannel {
///     type Payload = str;
///     type Receipt = u64;
///     type Error = HttpError;
///
///     async fn send(&self, payload: &str) -> Result<u64, RemoteError<HttpError>> {
///         // POST /channels/{id}/messages
///         Ok(self.id)
///     }
/// }
/// ```
#[async_trait]
pub trait Messageable: Send + Sync {
    type Payload: Send + Sync + ?Sized;
    /// Value returned by a successful send, e.g. the created message.
    type Receipt: Send;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Performs a single send attempt.
    ///
    /// Implementations must classify rate limiting as
    /// [`RemoteError::Throttled`]; the dispatcher retries those.
    async fn send(
        &self,
        payload: &Self::Payload,
    ) -> Result<Self::Receipt, RemoteError<Self::Error>>;
}

/// Any addressable remote entity a dispatch may be aimed at.
///
/// Resources that cannot accept a send (voice channels, categories, ...)
/// return `None` from [`as_messageable`](TargetResource::as_messageable) and
/// are skipped.
pub trait TargetResource {
    type Sender: Messageable;

    /// Stable label used in logs and reports.
    fn target_id(&self) -> String;

    fn as_messageable(&self) -> Option<&Self::Sender>;
}

pub type PayloadOf<T> = <<T as TargetResource>::Sender as Messageable>::Payload;
pub type ReceiptOf<T> = <<T as TargetResource>::Sender as Messageable>::Receipt;
pub type SendErrorOf<T> = <<T as TargetResource>::Sender as Messageable>::Error;

/// Terminal state of one target in a dispatch.
#[derive(Debug)]
pub enum TargetOutcome<R, E> {
    Sent(R),
    Failed(InvokeError<E>),
    /// The target cannot accept the payload; no task was created.
    Skipped,
    /// The dispatch was cancelled before this target finished.
    Cancelled,
    /// The dispatch deadline passed before this target finished.
    TimedOut,
}

impl<R, E> TargetOutcome<R, E> {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }

    /// Cancelled or timed out.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Cancelled | Self::TimedOut)
    }
}

#[derive(Debug)]
pub struct TargetReport<R, E> {
    pub target_id: String,
    /// Zero-based index of the batch the target was partitioned into
    pub batch: usize,
    pub outcome: TargetOutcome<R, E>,
}

/// Result of a dispatch with per-target outcomes.
///
/// # Examples
///
/// ```no_run
/// # fn show(report: relay::dispatch::DispatchReport<u64, relay::common::HttpError>) {
/// if report.is_complete_success() {
///     println!("All {} targets handled", report.total_requested);
/// } else {
///     println!(
///         "{} sent, {} failed: {:?}",
///         report.successful, report.failed, report.error_details
///     );
/// }
/// # }
/// ```
#[derive(Debug)]
pub struct DispatchReport<R, E> {
    /// Number of targets passed to the dispatch, capable or not
    pub total_requested: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Targets cancelled or stopped by the deadline
    pub interrupted: usize,
    /// Partition sizes, in execution order
    pub batch_sizes: Vec<usize>,
    /// Human-readable error messages for failed targets
    pub error_details: Vec<String>,
    /// One entry per target, in original order
    pub targets: Vec<TargetReport<R, E>>,
}

impl<R, E: fmt::Display> DispatchReport<R, E> {
    pub fn new(total_requested: usize, batch_sizes: Vec<usize>) -> Self {
        Self {
            total_requested,
            successful: 0,
            failed: 0,
            skipped: 0,
            interrupted: 0,
            batch_sizes,
            error_details: Vec::new(),
            targets: Vec::with_capacity(total_requested),
        }
    }

    pub fn record(&mut self, report: TargetReport<R, E>) {
        match &report.outcome {
            TargetOutcome::Sent(_) => self.successful += 1,
            TargetOutcome::Failed(error) => {
                self.failed += 1;
                self.error_details
                    .push(format!("{}: {}", report.target_id, error));
            }
            TargetOutcome::Skipped => self.skipped += 1,
            TargetOutcome::Cancelled | TargetOutcome::TimedOut => self.interrupted += 1,
        }
        self.targets.push(report);
    }

    /// Every capable target was sent to; skipped targets do not count against success.
    pub fn is_complete_success(&self) -> bool {
        self.failed == 0
            && self.interrupted == 0
            && self.successful + self.skipped == self.total_requested
    }

    pub fn batch_count(&self) -> usize {
        self.batch_sizes.len()
    }

    /// Outcome of the first target reported under `target_id`.
    ///
    /// Target ids need not be unique; use [`outcome_at`](Self::outcome_at)
    /// to address a target by its position in the input slice.
    pub fn outcome_of(&self, target_id: &str) -> Option<&TargetOutcome<R, E>> {
        self.targets
            .iter()
            .find(|t| t.target_id == target_id)
            .map(|t| &t.outcome)
    }

    /// Outcome of the target at `index` in the slice passed to the dispatch.
    pub fn outcome_at(&self, index: usize) -> Option<&TargetOutcome<R, E>> {
        self.targets.get(index).map(|t| &t.outcome)
    }
}
