use async_trait::async_trait;
use std::time::Duration;

/// Suspends the current task without blocking other tasks.
///
/// The invoker sleeps through this trait so tests can observe every throttle
/// wait without real time passing.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Default sleeper backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        // A zero wait still has to give the scheduler a turn.
        if duration.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(duration).await;
        }
    }
}
