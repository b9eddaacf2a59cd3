use crate::backoff::Backoff;
use crate::error::MutationError;
use crate::idempotency::IdempotencyKey;
use crate::queue::OfflineQueue;
use crate::retry::{RetryExecutor, RetryFailure, RetryPolicy, ShouldRetry, StopReason};
use crate::state::MutationState;
use crate::transport::Transport;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

pub type OnSuccess = Arc<dyn Fn(&JsonValue, &JsonValue) + Send + Sync>;
pub type OnError = Arc<dyn Fn(&MutationError, &JsonValue) + Send + Sync>;
pub type OnRetry = Arc<dyn Fn(u32, &MutationError) + Send + Sync>;

/// Per-dispatcher configuration. Hooks are optional.
#[derive(Clone)]
pub struct MutationOptions {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub timeout: Duration,
    pub offline_queue_enabled: bool,
    pub on_success: Option<OnSuccess>,
    pub on_error: Option<OnError>,
    pub on_retry: Option<OnRetry>,
    pub should_retry: Option<ShouldRetry>,
}

impl Default for MutationOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(30_000),
            timeout: Duration::from_millis(30_000),
            offline_queue_enabled: true,
            on_success: None,
            on_error: None,
            on_retry: None,
            should_retry: None,
        }
    }
}

impl MutationOptions {
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff: Backoff::new(millis(self.initial_delay), millis(self.max_delay)),
            timeout: self.timeout,
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

pub struct DispatcherBuilder {
    endpoint: String,
    transport: Arc<dyn Transport>,
    options: MutationOptions,
    queue: Option<Arc<OfflineQueue>>,
}

impl DispatcherBuilder {
    pub fn options(mut self, options: MutationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn queue(mut self, queue: Arc<OfflineQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn on_success(mut self, f: impl Fn(&JsonValue, &JsonValue) + Send + Sync + 'static) -> Self {
        self.options.on_success = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&MutationError, &JsonValue) + Send + Sync + 'static) -> Self {
        self.options.on_error = Some(Arc::new(f));
        self
    }

    pub fn on_retry(mut self, f: impl Fn(u32, &MutationError) + Send + Sync + 'static) -> Self {
        self.options.on_retry = Some(Arc::new(f));
        self
    }

    pub fn should_retry(mut self, f: impl Fn(&MutationError, u32) -> bool + Send + Sync + 'static) -> Self {
        self.options.should_retry = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> Dispatcher {
        let key = IdempotencyKey::generate();
        let executor = RetryExecutor::new(self.transport, self.endpoint.clone(), key.clone(), self.options.retry_policy())
            .with_should_retry(self.options.should_retry.clone());
        if self.options.offline_queue_enabled && self.queue.is_none() {
            warn!(endpoint = %self.endpoint, "offline queue enabled but no queue attached; exhausted calls will be dropped");
        }
        let (state, _) = watch::channel(MutationState::new(self.options.max_retries));
        Dispatcher {
            endpoint: self.endpoint,
            key,
            executor,
            queue: self.queue,
            options: self.options,
            state,
        }
    }
}

/// Entry point for one kind of mutation against one endpoint.
///
/// The idempotency key is fixed for the dispatcher's lifetime. Overlapping
/// `mutate()` calls are not prevented here; see [`crate::action::SyncAction`].
pub struct Dispatcher {
    endpoint: String,
    key: IdempotencyKey,
    executor: RetryExecutor,
    queue: Option<Arc<OfflineQueue>>,
    options: MutationOptions,
    state: watch::Sender<MutationState>,
}

impl Dispatcher {
    pub fn builder(endpoint: impl Into<String>, transport: Arc<dyn Transport>) -> DispatcherBuilder {
        DispatcherBuilder {
            endpoint: endpoint.into(),
            transport,
            options: MutationOptions::default(),
            queue: None,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn idempotency_key(&self) -> &IdempotencyKey {
        &self.key
    }

    /// Whether a call that runs out of retries ends up in an offline queue.
    pub fn queues_failures(&self) -> bool {
        self.options.offline_queue_enabled && self.queue.is_some()
    }

    pub fn state(&self) -> MutationState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<MutationState> {
        self.state.subscribe()
    }

    /// Returns a terminal state to idle.
    pub fn reset(&self) {
        self.state.send_if_modified(|s| s.reset());
    }

    pub async fn mutate(&self, variables: JsonValue) -> Result<JsonValue, MutationError> {
        let mut generation = 0;
        self.state.send_modify(|s| generation = s.start());

        let on_retry = |attempt: u32, err: &MutationError| {
            self.state.send_if_modified(|s| s.record_retry(generation, attempt));
            if let Some(f) = &self.options.on_retry {
                f(attempt, err);
            }
        };

        let result = self.executor.execute(&variables, on_retry).await;
        match result {
            Ok(data) => {
                self.state.send_if_modified(|s| s.succeed(generation, data.clone()));
                if let Some(f) = &self.options.on_success {
                    f(&data, &variables);
                }
                debug!(endpoint = %self.endpoint, "mutation succeeded");
                Ok(data)
            }
            Err(RetryFailure { error: err, reason }) => {
                self.state.send_if_modified(|s| s.fail(generation, err.clone()));
                if let Some(f) = &self.options.on_error {
                    f(&err, &variables);
                }
                warn!(endpoint = %self.endpoint, error = %err, ?reason, "mutation failed");
                if reason == StopReason::Exhausted && self.options.offline_queue_enabled {
                    match &self.queue {
                        Some(queue) => queue.enqueue(&self.endpoint, variables, self.key.clone()),
                        None => warn!(endpoint = %self.endpoint, "no offline queue attached; dropping exhausted call"),
                    }
                }
                Err(err)
            }
        }
    }
}
