use claims::*;
use relay::common::{DispatchError, InvokeError, RemoteError, Sleeper};
use relay::dispatch::{BoundedBatchDispatcher, TargetOutcome};
use relay::invoker::RateLimitedInvoker;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// Helper module with fake channels for dispatch testing
mod helpers {
    use super::*;
    use async_trait::async_trait;
    use relay::dispatch::{Messageable, TargetResource};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, thiserror::Error)]
    #[error("{0}")]
    pub struct FakeApiError(pub String);

    /// Scripted response for one send attempt
    #[derive(Debug, Clone)]
    pub enum Step {
        Ok,
        Throttle(f64),
        Fail(&'static str),
        Hang(Duration),
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Event {
        Start(u64),
        End(u64),
    }

    /// Shared probe recording send order and concurrency
    #[derive(Default)]
    pub struct Probe {
        pub events: Mutex<Vec<Event>>,
        in_flight: AtomicUsize,
        pub max_in_flight: AtomicUsize,
        pub attempts: AtomicUsize,
    }

    impl Probe {
        pub fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }

        pub fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }

        pub fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    pub struct TextChannel {
        pub id: u64,
        script: Mutex<VecDeque<Step>>,
        probe: Arc<Probe>,
    }

    #[async_trait]
    impl Messageable for TextChannel {
        type Payload = str;
        type Receipt = String;
        type Error = FakeApiError;

        async fn send(&self, payload: &str) -> Result<String, RemoteError<FakeApiError>> {
            let step = self.script.lock().unwrap().pop_front().unwrap_or(Step::Ok);
            self.probe.attempts.fetch_add(1, Ordering::SeqCst);
            self.probe.events.lock().unwrap().push(Event::Start(self.id));
            let now = self.probe.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.probe.max_in_flight.fetch_max(now, Ordering::SeqCst);

            match &step {
                Step::Hang(duration) => tokio::time::sleep(*duration).await,
                _ => tokio::task::yield_now().await,
            }

            self.probe.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.probe.events.lock().unwrap().push(Event::End(self.id));

            match step {
                Step::Ok | Step::Hang(_) => Ok(format!("{}:{}", self.id, payload)),
                Step::Throttle(seconds) => Err(RemoteError::throttled_secs(seconds)),
                Step::Fail(reason) => Err(RemoteError::Other(FakeApiError(reason.to_string()))),
            }
        }
    }

    pub enum Resource {
        Text(TextChannel),
        Voice(u64),
    }

    impl TargetResource for Resource {
        type Sender = TextChannel;

        fn target_id(&self) -> String {
            match self {
                Resource::Text(channel) => format!("text-{}", channel.id),
                Resource::Voice(id) => format!("voice-{id}"),
            }
        }

        fn as_messageable(&self) -> Option<&TextChannel> {
            match self {
                Resource::Text(channel) => Some(channel),
                Resource::Voice(_) => None,
            }
        }
    }

    pub fn text(id: u64, probe: &Arc<Probe>, script: Vec<Step>) -> Resource {
        Resource::Text(TextChannel {
            id,
            script: Mutex::new(script.into()),
            probe: probe.clone(),
        })
    }

    pub fn text_channels(count: u64, probe: &Arc<Probe>) -> Vec<Resource> {
        (0..count).map(|id| text(id, probe, Vec::new())).collect()
    }

    #[derive(Default)]
    pub struct RecordingSleeper {
        pub waits: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.waits.lock().unwrap().push(duration);
            tokio::task::yield_now().await;
        }
    }

    pub fn dispatcher(sleeper: &Arc<RecordingSleeper>) -> BoundedBatchDispatcher {
        BoundedBatchDispatcher::new(RateLimitedInvoker::default().with_sleeper(sleeper.clone()))
    }
}

use helpers::*;

mod partitioning {
    use super::*;

    #[tokio::test]
    async fn test_250_targets_in_batches_of_100() {
        let probe = Arc::new(Probe::default());
        let sleeper = Arc::new(RecordingSleeper::default());
        let targets = text_channels(250, &probe);

        let report = assert_ok!(
            dispatcher(&sleeper)
                .dispatch_all(&targets, "hello", 100)
                .await
        );

        assert_eq!(report.batch_sizes, vec![100, 100, 50]);
        assert_eq!(report.successful, 250);
        assert!(report.is_complete_success());
        assert_eq!(probe.max_in_flight(), 100);
        assert!(sleeper.waits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_concurrency_fails_before_any_send() {
        let probe = Arc::new(Probe::default());
        let sleeper = Arc::new(RecordingSleeper::default());
        let targets = text_channels(3, &probe);

        let error = assert_err!(dispatcher(&sleeper).dispatch_all(&targets, "hello", 0).await);

        assert!(matches!(
            error,
            DispatchError::InvalidArgument {
                name: "max_concurrent",
                ..
            }
        ));
        assert_eq!(probe.attempts(), 0);
    }

    #[tokio::test]
    async fn test_empty_target_list() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let targets: Vec<Resource> = Vec::new();

        let report = assert_ok!(dispatcher(&sleeper).dispatch_all(&targets, "hello", 10).await);

        assert_eq!(report.batch_count(), 0);
        assert!(report.targets.is_empty());
        assert!(report.is_complete_success());
    }
}

mod ordering {
    use super::*;

    #[tokio::test]
    async fn test_batches_run_strictly_in_sequence() {
        let probe = Arc::new(Probe::default());
        let sleeper = Arc::new(RecordingSleeper::default());
        let targets = text_channels(5, &probe);

        assert_ok!(dispatcher(&sleeper).dispatch_all(&targets, "hi", 2).await);

        let events = probe.events();
        let position = |event: Event| events.iter().position(|e| *e == event).unwrap();

        // Every send of batch [0, 1] ends before batch [2, 3] starts, and so on
        assert!(position(Event::End(0)) < position(Event::Start(2)));
        assert!(position(Event::End(1)) < position(Event::Start(2)));
        assert!(position(Event::End(2)) < position(Event::Start(4)));
        assert!(position(Event::End(3)) < position(Event::Start(4)));
        assert_eq!(probe.max_in_flight(), 2);
    }

    #[tokio::test]
    async fn test_members_of_a_batch_run_concurrently() {
        let probe = Arc::new(Probe::default());
        let sleeper = Arc::new(RecordingSleeper::default());
        let targets = text_channels(4, &probe);

        assert_ok!(dispatcher(&sleeper).dispatch_all(&targets, "hi", 4).await);

        let events = probe.events();
        let starts_before_first_end = events
            .iter()
            .take_while(|e| matches!(e, Event::Start(_)))
            .count();
        assert_eq!(starts_before_first_end, 4);
    }

    #[tokio::test]
    async fn test_report_preserves_target_order() {
        let probe = Arc::new(Probe::default());
        let sleeper = Arc::new(RecordingSleeper::default());
        let targets = vec![
            text(1, &probe, Vec::new()),
            Resource::Voice(2),
            text(3, &probe, Vec::new()),
        ];

        let report = assert_ok!(dispatcher(&sleeper).dispatch_all(&targets, "hi", 2).await);

        let ids: Vec<_> = report.targets.iter().map(|t| t.target_id.as_str()).collect();
        assert_eq!(ids, vec!["text-1", "voice-2", "text-3"]);
        let batches: Vec<_> = report.targets.iter().map(|t| t.batch).collect();
        assert_eq!(batches, vec![0, 0, 1]);
    }
}

mod capability {
    use super::*;

    #[tokio::test]
    async fn test_non_messageable_targets_keep_their_slot() {
        let probe = Arc::new(Probe::default());
        let sleeper = Arc::new(RecordingSleeper::default());
        let targets = vec![
            text(1, &probe, Vec::new()),
            Resource::Voice(2),
            Resource::Voice(3),
            text(4, &probe, Vec::new()),
        ];

        let report = assert_ok!(dispatcher(&sleeper).dispatch_all(&targets, "hi", 2).await);

        assert_eq!(report.batch_sizes, vec![2, 2]);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.successful, 2);
        assert_eq!(probe.attempts(), 2);
        assert_eq!(probe.max_in_flight(), 1);
        assert!(report.outcome_of("voice-2").unwrap().is_skipped());
        match report.outcome_of("text-4") {
            Some(TargetOutcome::Sent(receipt)) => assert_eq!(receipt, "4:hi"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(report.is_complete_success());
    }
}

mod isolation {
    use super::*;

    #[tokio::test]
    async fn test_failed_target_does_not_stop_siblings_or_next_batch() {
        let probe = Arc::new(Probe::default());
        let sleeper = Arc::new(RecordingSleeper::default());
        let targets = vec![
            text(1, &probe, Vec::new()),
            text(2, &probe, vec![Step::Fail("Missing Access")]),
            text(3, &probe, Vec::new()),
            text(4, &probe, Vec::new()),
        ];

        let report = assert_ok!(dispatcher(&sleeper).dispatch_all(&targets, "hi", 3).await);

        assert_eq!(report.successful, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(report.error_details, vec!["text-2: Missing Access"]);
        match report.outcome_of("text-2") {
            Some(TargetOutcome::Failed(InvokeError::Remote(e))) => {
                assert_eq!(e.0, "Missing Access")
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(report.outcome_of("text-4").unwrap().is_sent());
        assert!(sleeper.waits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_throttled_target_retries_with_its_own_budget() {
        let probe = Arc::new(Probe::default());
        let sleeper = Arc::new(RecordingSleeper::default());
        let targets = vec![
            text(1, &probe, vec![Step::Throttle(0.5), Step::Throttle(0.25)]),
            text(
                2,
                &probe,
                vec![
                    Step::Throttle(0.1),
                    Step::Throttle(0.1),
                    Step::Throttle(0.1),
                    Step::Throttle(0.1),
                    Step::Throttle(0.1),
                ],
            ),
            text(3, &probe, Vec::new()),
        ];

        let report = assert_ok!(dispatcher(&sleeper).dispatch_all(&targets, "hi", 3).await);

        assert!(report.outcome_of("text-1").unwrap().is_sent());
        assert!(matches!(
            report.outcome_of("text-2"),
            Some(TargetOutcome::Failed(InvokeError::MaxRetriesExceeded {
                max_retries: 5
            }))
        ));
        assert!(report.outcome_of("text-3").unwrap().is_sent());
        // 3 attempts for text-1, 5 for text-2, 1 for text-3
        assert_eq!(probe.attempts(), 9);
        assert_eq!(sleeper.waits.lock().unwrap().len(), 7);
    }
}

mod interruption {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_interrupts_hung_sends_and_later_batches() {
        let probe = Arc::new(Probe::default());
        let sleeper = Arc::new(RecordingSleeper::default());
        let targets = vec![
            text(1, &probe, Vec::new()),
            text(2, &probe, vec![Step::Hang(Duration::from_secs(60))]),
            text(3, &probe, Vec::new()),
            Resource::Voice(4),
        ];

        let report = assert_ok!(
            dispatcher(&sleeper)
                .with_deadline(Duration::from_secs(5))
                .dispatch_all(&targets, "hi", 2)
                .await
        );

        assert!(report.outcome_of("text-1").unwrap().is_sent());
        assert!(matches!(
            report.outcome_of("text-2"),
            Some(TargetOutcome::TimedOut)
        ));
        assert!(matches!(
            report.outcome_of("text-3"),
            Some(TargetOutcome::TimedOut)
        ));
        assert!(report.outcome_of("voice-4").unwrap().is_skipped());
        assert_eq!(report.interrupted, 2);
        assert_eq!(probe.attempts(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_dispatch_sends_nothing() {
        let probe = Arc::new(Probe::default());
        let sleeper = Arc::new(RecordingSleeper::default());
        let targets = text_channels(3, &probe);
        let token = CancellationToken::new();
        token.cancel();

        let report = assert_ok!(
            dispatcher(&sleeper)
                .with_cancel_token(token)
                .dispatch_all(&targets, "hi", 2)
                .await
        );

        assert_eq!(report.interrupted, 3);
        assert_eq!(probe.attempts(), 0);
        assert!(
            report
                .targets
                .iter()
                .all(|t| matches!(t.outcome, TargetOutcome::Cancelled))
        );
    }
}
