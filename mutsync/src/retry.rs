//! Sequential retry of one logical mutation under a single idempotency key.

use crate::backoff::Backoff;
use crate::error::MutationError;
use crate::idempotency::IdempotencyKey;
use crate::transport::{MutationRequest, Transport};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Caller override for retry classification: `(error, attempt) -> retry?`.
pub type ShouldRetry = Arc<dyn Fn(&MutationError, u32) -> bool + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Backoff,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Backoff::default(),
            timeout: Duration::from_millis(30_000),
        }
    }
}

/// Why the executor gave up on a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The classifier refused a retry while budget remained, or the error
    /// is not worth replaying.
    Terminal,
    /// Every retry was spent on a transient error.
    Exhausted,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RetryFailure {
    pub error: MutationError,
    pub reason: StopReason,
}

impl RetryFailure {
    pub fn is_exhausted(&self) -> bool {
        self.reason == StopReason::Exhausted
    }
}

pub struct RetryExecutor {
    transport: Arc<dyn Transport>,
    endpoint: String,
    key: IdempotencyKey,
    policy: RetryPolicy,
    should_retry: Option<ShouldRetry>,
}

impl RetryExecutor {
    pub fn new(
        transport: Arc<dyn Transport>,
        endpoint: impl Into<String>,
        key: IdempotencyKey,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
            key,
            policy,
            should_retry: None,
        }
    }

    pub fn with_should_retry(mut self, f: Option<ShouldRetry>) -> Self {
        self.should_retry = f;
        self
    }

    pub fn is_retryable(&self, err: &MutationError, attempt: u32) -> bool {
        match &self.should_retry {
            Some(f) => f(err, attempt),
            None => err.is_retryable(),
        }
    }

    /// Runs attempts until success, a terminal error or an exhausted budget.
    ///
    /// `on_retry(next_attempt, error)` fires before each backoff sleep. The
    /// classifier is only asked while budget remains; once it is spent the
    /// error's own kind decides between `Exhausted` and `Terminal`.
    pub async fn execute<F>(&self, variables: &JsonValue, mut on_retry: F) -> Result<JsonValue, RetryFailure>
    where
        F: FnMut(u32, &MutationError),
    {
        let mut attempt = 0u32;
        loop {
            let req = MutationRequest {
                endpoint: &self.endpoint,
                body: variables,
                idempotency_key: &self.key,
                timeout: self.policy.timeout,
            };
            debug!(endpoint = %self.endpoint, attempt, "mutation attempt");
            match self.transport.post(req).await {
                Ok(data) => return Ok(data),
                Err(err) => {
                    if attempt >= self.policy.max_retries {
                        let reason = if err.is_retryable() { StopReason::Exhausted } else { StopReason::Terminal };
                        debug!(attempt, error = %err, ?reason, "retry budget spent");
                        return Err(RetryFailure { error: err, reason });
                    }
                    if !self.is_retryable(&err, attempt) {
                        debug!(attempt, error = %err, "mutation failed terminally");
                        return Err(RetryFailure { error: err, reason: StopReason::Terminal });
                    }
                    let delay = self.policy.backoff.delay(attempt);
                    attempt += 1;
                    on_retry(attempt, &err);
                    warn!(
                        endpoint = %self.endpoint,
                        attempt,
                        max_retries = self.policy.max_retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "retrying mutation"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
