#![allow(dead_code)]

use async_trait::async_trait;
use mutsync::{MutationError, MutationRequest, Transport};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedCall {
    pub endpoint: String,
    pub body: Value,
    pub key: String,
}

type Handler = Box<dyn Fn(&RecordedCall) -> Result<Value, MutationError> + Send + Sync>;

/// In-process transport that records every attempt.
pub struct MockTransport {
    script: Mutex<VecDeque<Result<Value, MutationError>>>,
    handler: Option<Handler>,
    delay: Duration,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockTransport {
    /// Replies in order; the last reply repeats once the script runs out.
    pub fn scripted(replies: Vec<Result<Value, MutationError>>) -> Self {
        Self {
            script: Mutex::new(replies.into()),
            handler: None,
            delay: Duration::ZERO,
            calls: Mutex::new(vec![]),
        }
    }

    pub fn always(reply: Result<Value, MutationError>) -> Self {
        Self::scripted(vec![reply])
    }

    pub fn routed(f: impl Fn(&RecordedCall) -> Result<Value, MutationError> + Send + Sync + 'static) -> Self {
        Self {
            handler: Some(Box::new(f)),
            ..Self::scripted(vec![])
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn post(&self, req: MutationRequest<'_>) -> Result<Value, MutationError> {
        let call = RecordedCall {
            endpoint: req.endpoint.to_string(),
            body: req.body.clone(),
            key: req.idempotency_key.to_string(),
        };
        self.calls.lock().unwrap().push(call.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(h) = &self.handler {
            return h(&call);
        }
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().cloned().unwrap_or(Ok(Value::Null))
        }
    }
}

pub fn http(status: u16) -> MutationError {
    MutationError::Http {
        status,
        message: format!("status {status}"),
        body: None,
    }
}

pub fn timeout() -> MutationError {
    MutationError::Timeout(Duration::from_millis(30_000))
}

pub fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir()
        .join(format!("mutsync-test-{}", uuid::Uuid::new_v4()))
        .join(name)
}
