//! Idempotent mutation dispatch with retry/backoff and an offline replay queue.
//!
//! A [`Dispatcher`] sends one kind of mutation to one endpoint. Every attempt
//! of every call it makes carries the same idempotency key; calls that run
//! out of retries are written to an [`OfflineQueue`] and replayed, key
//! unchanged, when a [`ReplayTrigger`] sees connectivity come back.

pub mod action;
pub mod backoff;
pub mod cli;
pub mod config;
pub mod connectivity;
pub mod dispatcher;
pub mod error;
pub mod idempotency;
pub mod output;
pub mod queue;
pub mod retry;
pub mod state;
pub mod transport;

pub use action::{ScopedTimer, SyncAction, TriggerOutcome};
pub use backoff::Backoff;
pub use connectivity::{ProbeMonitor, ReplayTrigger};
pub use dispatcher::{Dispatcher, MutationOptions};
pub use error::{MutationError, StorageError};
pub use idempotency::{IdempotencyKey, IDEMPOTENCY_HEADER};
pub use queue::{FileStore, MemoryStore, OfflineQueue, OfflineQueueItem, QueueStore, SyncReport};
pub use retry::{RetryExecutor, RetryFailure, RetryPolicy, StopReason};
pub use state::{MutationState, MutationStatus, Progress};
pub use transport::{HttpTransport, MutationRequest, Transport};
