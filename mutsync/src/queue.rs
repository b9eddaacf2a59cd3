//! Durable queue of mutations that exhausted their retry budget.
//!
//! The whole list is rewritten on every change. Replays send the stored
//! idempotency key unchanged so the server can still deduplicate.

use crate::error::StorageError;
use crate::idempotency::IdempotencyKey;
use crate::transport::{MutationRequest, Transport};
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Well-known storage key; the file store names its file after it.
pub const QUEUE_STORAGE_KEY: &str = "offline-mutation-queue";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineQueueItem {
    pub endpoint: String,
    pub variables: JsonValue,
    pub idempotency_key: IdempotencyKey,
    pub timestamp: DateTime<Utc>,
}

/// Persistence backend for the queue. Reads are defensive: absent data is
/// `Ok(None)` and the queue decides what to do with unparsable content.
pub trait QueueStore: Send + Sync {
    fn read(&self) -> Result<Option<String>, StorageError>;
    fn write(&self, contents: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_path() -> Option<PathBuf> {
        let proj = ProjectDirs::from("", "", "mutsync")?;
        Some(proj.data_dir().join(format!("{QUEUE_STORAGE_KEY}.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> StorageError {
        StorageError::Io { path: self.path.clone(), source }
    }
}

impl QueueStore for FileStore {
    fn read(&self) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(&self.path) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_err(e)),
        }
    }

    fn write(&self, contents: &str) -> Result<(), StorageError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| self.io_err(e))?;
        }
        // write a sibling then rename so readers never see a partial file
        let tmp = self.path.with_extension("json.tmp");
        let mut f = fs::File::create(&tmp).map_err(|e| self.io_err(e))?;
        f.write_all(contents.as_bytes()).map_err(|e| self.io_err(e))?;
        f.sync_all().map_err(|e| self.io_err(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    contents: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(contents: impl Into<String>) -> Self {
        Self { contents: Mutex::new(Some(contents.into())) }
    }

    pub fn contents(&self) -> Option<String> {
        self.contents.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl QueueStore for MemoryStore {
    fn read(&self) -> Result<Option<String>, StorageError> {
        Ok(self.contents())
    }

    fn write(&self, contents: &str) -> Result<(), StorageError> {
        *self.contents.lock().unwrap_or_else(|p| p.into_inner()) = Some(contents.to_string());
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncReport {
    /// Another replay pass was already running.
    Skipped,
    Completed { replayed: usize, remaining: usize },
}

pub struct OfflineQueue {
    store: Box<dyn QueueStore>,
    items: Mutex<Vec<OfflineQueueItem>>,
    syncing: AtomicBool,
}

impl OfflineQueue {
    /// Opens the queue, loading whatever the store currently holds.
    pub fn new(store: impl QueueStore + 'static) -> Self {
        let store: Box<dyn QueueStore> = Box::new(store);
        let items = load(store.as_ref());
        Self { store, items: Mutex::new(items), syncing: AtomicBool::new(false) }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }

    pub fn enqueue(&self, endpoint: &str, variables: JsonValue, idempotency_key: IdempotencyKey) {
        let item = OfflineQueueItem {
            endpoint: endpoint.to_string(),
            variables,
            idempotency_key,
            timestamp: Utc::now(),
        };
        info!(endpoint, key = %item.idempotency_key, "queued mutation for replay");
        self.update(|items| items.push(item));
    }

    pub fn items(&self) -> Vec<OfflineQueueItem> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) -> usize {
        let mut n = 0;
        self.update(|items| {
            n = items.len();
            items.clear();
        });
        n
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    /// Replays every queued item once. Succeeded items are removed; failed
    /// ones stay queued for the next restoration. Failures are not surfaced.
    pub async fn sync_queue(&self, transport: &dyn Transport, timeout: Duration) -> SyncReport {
        let Some(_guard) = SyncGuard::acquire(&self.syncing) else {
            debug!("queue replay already in progress");
            return SyncReport::Skipped;
        };

        // union of the store and the live list; either may hold items the other lacks
        let pending = {
            let mut items = self.lock();
            for item in load(self.store.as_ref()) {
                if !items.contains(&item) {
                    items.push(item);
                }
            }
            items.clone()
        };

        let mut succeeded = Vec::new();
        for item in pending {
            let req = MutationRequest {
                endpoint: &item.endpoint,
                body: &item.variables,
                idempotency_key: &item.idempotency_key,
                timeout,
            };
            match transport.post(req).await {
                Ok(_) => {
                    debug!(endpoint = %item.endpoint, key = %item.idempotency_key, "replayed queued mutation");
                    succeeded.push(item);
                }
                Err(e) => {
                    debug!(endpoint = %item.endpoint, error = %e, "replay failed; keeping item");
                }
            }
        }

        let replayed = succeeded.len();
        let mut remaining = 0;
        // remove from the live list so items enqueued mid-pass survive
        self.update(|items| {
            for done in &succeeded {
                if let Some(pos) = items.iter().position(|i| i == done) {
                    items.remove(pos);
                }
            }
            remaining = items.len();
        });
        info!(replayed, remaining, "offline queue sync finished");
        SyncReport::Completed { replayed, remaining }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<OfflineQueueItem>> {
        self.items.lock().unwrap_or_else(|p| p.into_inner())
    }

    // Read-modify-write the whole list, then persist it.
    fn update(&self, f: impl FnOnce(&mut Vec<OfflineQueueItem>)) {
        let mut items = self.lock();
        let mut next = items.clone();
        f(&mut next);
        if let Err(e) = persist(self.store.as_ref(), &next) {
            warn!(error = %e, "failed to persist offline queue");
        }
        *items = next;
    }
}

fn load(store: &dyn QueueStore) -> Vec<OfflineQueueItem> {
    match store.read() {
        Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(error = %e, "discarding unreadable offline queue data");
            Vec::new()
        }),
        Ok(None) => Vec::new(),
        Err(e) => {
            warn!(error = %e, "failed to read offline queue");
            Vec::new()
        }
    }
}

fn persist(store: &dyn QueueStore, items: &[OfflineQueueItem]) -> Result<(), StorageError> {
    let data = serde_json::to_string(items)?;
    store.write(&data)
}

struct SyncGuard<'a>(&'a AtomicBool);

impl<'a> SyncGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SyncGuard(flag))
    }
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
