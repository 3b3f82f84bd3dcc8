use crate::common::{DispatchError, Sleeper};
use crate::config::{ConfigError, RelayConfig};
use crate::dispatch::{
    BoundedBatchDispatcher, DispatchReport, PayloadOf, ReceiptOf, SendErrorOf, TargetResource,
};
use crate::invoker::RateLimitedInvoker;
use std::sync::Arc;

/// Explicit bundle of configuration, invoker and dispatcher.
///
/// Callers hold one context per session and pass it where needed instead of
/// reaching for globals; tests build their own with a fake sleeper.
#[derive(Debug, Clone)]
pub struct RelayContext {
    config: RelayConfig,
    invoker: RateLimitedInvoker,
    dispatcher: BoundedBatchDispatcher,
}

impl RelayContext {
    pub fn from_config(config: RelayConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut invoker = RateLimitedInvoker::new(config.max_retries());
        if let Some(pacing) = config.pacing() {
            let limiter = pacing.build().map_err(|e| ConfigError::Invalid {
                field: "requests_per_second",
                reason: e.to_string(),
            })?;
            invoker = invoker.with_pacer(limiter);
        }

        let dispatcher = Self::build_dispatcher(&config, invoker.clone());
        Ok(Self {
            config,
            invoker,
            dispatcher,
        })
    }

    /// Use `sleeper` for all throttle waits made through this context.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.invoker = self.invoker.with_sleeper(sleeper);
        let cancel_token = self.dispatcher.cancel_token().clone();
        self.dispatcher = Self::build_dispatcher(&self.config, self.invoker.clone())
            .with_cancel_token(cancel_token);
        self
    }

    fn build_dispatcher(
        config: &RelayConfig,
        invoker: RateLimitedInvoker,
    ) -> BoundedBatchDispatcher {
        let dispatcher = BoundedBatchDispatcher::new(invoker);
        match config.deadline() {
            Some(deadline) => dispatcher.with_deadline(deadline),
            None => dispatcher,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn invoker(&self) -> &RateLimitedInvoker {
        &self.invoker
    }

    pub fn dispatcher(&self) -> &BoundedBatchDispatcher {
        &self.dispatcher
    }

    /// Dispatch `payload` to `targets` with the configured concurrency limit.
    pub async fn broadcast<T>(
        &self,
        targets: &[T],
        payload: &PayloadOf<T>,
    ) -> Result<DispatchReport<ReceiptOf<T>, SendErrorOf<T>>, DispatchError>
    where
        T: TargetResource,
    {
        self.dispatcher
            .dispatch_all(targets, payload, self.config.max_concurrent())
            .await
    }

    /// Cancel in-flight and future dispatches made through this context.
    pub fn shutdown(&self) {
        log::info!("Shutting down relay context");
        self.dispatcher.cancel_token().cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.dispatcher.cancel_token().is_cancelled()
    }
}
