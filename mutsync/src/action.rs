//! Button-level wrapper: single-flight gate plus a timed return to idle.

use crate::dispatcher::Dispatcher;
use crate::error::MutationError;
use crate::state::MutationStatus;
use serde_json::Value as JsonValue;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// A spawned delay whose callback is abandoned when the handle is dropped.
#[derive(Debug)]
pub struct ScopedTimer(JoinHandle<()>);

impl ScopedTimer {
    pub fn spawn(delay: Duration, f: impl FnOnce() + Send + 'static) -> Self {
        ScopedTimer(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            f();
        }))
    }

    /// Aborts the pending callback.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[derive(Debug)]
pub enum TriggerOutcome {
    /// The action was busy or still showing a success.
    Ignored,
    Completed(Result<JsonValue, MutationError>),
}

pub struct SyncAction {
    dispatcher: Arc<Dispatcher>,
    display: Duration,
    status: Arc<watch::Sender<MutationStatus>>,
    reset_timer: Mutex<Option<ScopedTimer>>,
}

impl SyncAction {
    pub fn new(dispatcher: Arc<Dispatcher>, display: Duration) -> Self {
        let (status, _) = watch::channel(MutationStatus::Idle);
        Self {
            dispatcher,
            display,
            status: Arc::new(status),
            reset_timer: Mutex::new(None),
        }
    }

    pub fn status(&self) -> MutationStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<MutationStatus> {
        self.status.subscribe()
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Runs the mutation if the action is idle, or in error (manual retry).
    pub async fn trigger(&self, variables: JsonValue) -> TriggerOutcome {
        let fired = self.status.send_if_modified(|s| match s {
            MutationStatus::Idle | MutationStatus::Error => {
                *s = MutationStatus::Pending;
                true
            }
            _ => false,
        });
        if !fired {
            debug!(endpoint = self.dispatcher.endpoint(), "action busy; trigger ignored");
            return TriggerOutcome::Ignored;
        }
        self.set_timer(None);

        let result = self.dispatcher.mutate(variables).await;
        self.status.send_replace(if result.is_ok() {
            MutationStatus::Success
        } else {
            MutationStatus::Error
        });

        let status = Arc::clone(&self.status);
        self.set_timer(Some(ScopedTimer::spawn(self.display, move || {
            status.send_if_modified(|s| {
                if s.is_terminal() {
                    *s = MutationStatus::Idle;
                    true
                } else {
                    false
                }
            });
        })));
        TriggerOutcome::Completed(result)
    }

    // Replacing the slot drops, and so aborts, any previous timer.
    fn set_timer(&self, timer: Option<ScopedTimer>) {
        *self.reset_timer.lock().unwrap_or_else(|p| p.into_inner()) = timer;
    }
}
