use super::plan::BatchPlan;
use super::types::{
    DispatchReport, Messageable, PayloadOf, ReceiptOf, SendErrorOf, TargetOutcome, TargetReport,
    TargetResource,
};
use crate::common::DispatchError;
use crate::invoker::RateLimitedInvoker;
use futures::future::join_all;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Fans a send out across many targets in fixed-size batches.
///
/// Batches run strictly one after another. Inside a batch every capable
/// target gets its own [`RateLimitedInvoker`]-wrapped send, all polled
/// concurrently on the calling task, and the batch is finished only when
/// each of them has reached a terminal state. Outcomes are captured per
/// target, so one failure never cancels its siblings or later batches.
#[derive(Debug, Clone)]
pub struct BoundedBatchDispatcher {
    invoker: RateLimitedInvoker,
    deadline: Option<Duration>,
    cancel_token: CancellationToken,
}

impl BoundedBatchDispatcher {
    pub fn new(invoker: RateLimitedInvoker) -> Self {
        Self {
            invoker,
            deadline: None,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Stop every dispatch that runs longer than `deadline` overall.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_cancel_token(mut self, cancel_token: CancellationToken) -> Self {
        self.cancel_token = cancel_token;
        self
    }

    pub fn invoker(&self) -> &RateLimitedInvoker {
        &self.invoker
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    /// Send `payload` to every capable target, at most `max_concurrent` at a time.
    ///
    /// # Errors
    ///
    /// [`DispatchError::InvalidArgument`] if `max_concurrent` is zero. Nothing is
    /// sent in that case. Per-target failures are reported in the returned
    /// [`DispatchReport`], never as an error.
    pub async fn dispatch_all<T>(
        &self,
        targets: &[T],
        payload: &PayloadOf<T>,
        max_concurrent: usize,
    ) -> Result<DispatchReport<ReceiptOf<T>, SendErrorOf<T>>, DispatchError>
    where
        T: TargetResource,
    {
        let plan = BatchPlan::new(targets.len(), max_concurrent)?;
        let mut report = DispatchReport::new(targets.len(), plan.batch_sizes());
        let deadline = self.deadline.map(|d| Instant::now() + d);

        log::info!(
            "Dispatching to {} targets in {} batches of up to {}",
            plan.total(),
            plan.batch_count(),
            plan.batch_size()
        );

        for (batch_index, range) in plan.batches().enumerate() {
            let batch = &targets[range];

            if let Some(interrupted) = self.interruption(deadline) {
                log::warn!(
                    "Dispatch stopped before batch {} of {}",
                    batch_index + 1,
                    plan.batch_count()
                );
                for target in batch {
                    let outcome = if target.as_messageable().is_some() {
                        interrupted.outcome()
                    } else {
                        TargetOutcome::Skipped
                    };
                    report.record(TargetReport {
                        target_id: target.target_id(),
                        batch: batch_index,
                        outcome,
                    });
                }
                continue;
            }

            let sends = batch
                .iter()
                .enumerate()
                .filter_map(|(slot, target)| target.as_messageable().map(|s| (slot, s)))
                .map(|(slot, sender)| async move {
                    (slot, self.send_one(sender, payload, deadline).await)
                })
                .collect::<Vec<_>>();
            let task_count = sends.len();

            let mut outcomes: Vec<Option<TargetOutcome<_, _>>> =
                batch.iter().map(|_| None).collect();
            for (slot, outcome) in join_all(sends).await {
                outcomes[slot] = Some(outcome);
            }

            for (target, outcome) in batch.iter().zip(outcomes) {
                let target_id = target.target_id();
                let outcome = outcome.unwrap_or(TargetOutcome::Skipped);
                match &outcome {
                    TargetOutcome::Sent(_) => log::debug!("Sent to target {}", target_id),
                    TargetOutcome::Failed(e) => {
                        log::error!("Failed to send to target {}: {}", target_id, e)
                    }
                    TargetOutcome::Skipped => {
                        log::debug!("Target {} cannot receive the payload, skipped", target_id)
                    }
                    TargetOutcome::Cancelled | TargetOutcome::TimedOut => {
                        log::warn!("Send to target {} was interrupted", target_id)
                    }
                }
                report.record(TargetReport {
                    target_id,
                    batch: batch_index,
                    outcome,
                });
            }

            log::debug!(
                "Batch {} of {} finished ({} send tasks)",
                batch_index + 1,
                plan.batch_count(),
                task_count
            );
        }

        log::info!(
            "Dispatch completed: {} sent, {} failed, {} skipped, {} interrupted",
            report.successful,
            report.failed,
            report.skipped,
            report.interrupted
        );

        Ok(report)
    }

    async fn send_one<M>(
        &self,
        sender: &M,
        payload: &M::Payload,
        deadline: Option<Instant>,
    ) -> TargetOutcome<M::Receipt, M::Error>
    where
        M: Messageable,
    {
        let send = self.invoker.invoke(|| sender.send(payload));
        let deadline_reached = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            result = send => match result {
                Ok(receipt) => TargetOutcome::Sent(receipt),
                Err(e) => TargetOutcome::Failed(e),
            },
            () = self.cancel_token.cancelled() => TargetOutcome::Cancelled,
            () = deadline_reached => TargetOutcome::TimedOut,
        }
    }

    fn interruption(&self, deadline: Option<Instant>) -> Option<Interruption> {
        if self.cancel_token.is_cancelled() {
            return Some(Interruption::Cancelled);
        }
        match deadline {
            Some(at) if Instant::now() >= at => Some(Interruption::TimedOut),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Interruption {
    Cancelled,
    TimedOut,
}

impl Interruption {
    fn outcome<R, E>(self) -> TargetOutcome<R, E> {
        match self {
            Self::Cancelled => TargetOutcome::Cancelled,
            Self::TimedOut => TargetOutcome::TimedOut,
        }
    }
}
