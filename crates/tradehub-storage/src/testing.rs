//! Instrumented document store for tests.
//!
//! [`RecordingStore`] wraps another store, records every call in order and can
//! inject failures or latency.

use crate::traits::{DocumentStore, StorageError, StorageResult, WriteBatch};
use crate::{MemoryDocumentStore, StorageBackend};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedOp {
    Get(String),
    Set(String),
    Delete(String),
    List(String),
    /// Paths of the batch, in order
    Commit(Vec<String>),
}

#[derive(Default)]
struct Faults {
    set_prefix: Option<String>,
    commit: bool,
    get_delay: Option<Duration>,
}

pub struct RecordingStore {
    inner: Arc<dyn DocumentStore>,
    ops: Mutex<Vec<RecordedOp>>,
    failing_gets: AtomicU32,
    faults: Mutex<Faults>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RecordingStore {
    pub fn new(inner: Arc<dyn DocumentStore>) -> Self {
        Self {
            inner,
            ops: Mutex::new(Vec::new()),
            failing_gets: AtomicU32::new(0),
            faults: Mutex::new(Faults::default()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryDocumentStore::new()))
    }

    pub fn inner(&self) -> &Arc<dyn DocumentStore> {
        &self.inner
    }

    pub fn ops(&self) -> Vec<RecordedOp> {
        lock(&self.ops).clone()
    }

    pub fn clear_ops(&self) {
        lock(&self.ops).clear();
    }

    /// Number of `get` calls whose path starts with `prefix`
    pub fn gets_under(&self, prefix: &str) -> usize {
        lock(&self.ops)
            .iter()
            .filter(|op| matches!(op, RecordedOp::Get(path) if path.starts_with(prefix)))
            .count()
    }

    /// Make the next `n` `get` calls fail with a backend error.
    pub fn fail_next_gets(&self, n: u32) {
        self.failing_gets.store(n, Ordering::SeqCst);
    }

    /// Make every `set` on a path starting with `prefix` fail.
    pub fn fail_sets_under(&self, prefix: impl Into<String>) {
        lock(&self.faults).set_prefix = Some(prefix.into());
    }

    pub fn fail_commits(&self, fail: bool) {
        lock(&self.faults).commit = fail;
    }

    /// Delay every `get` by `delay` (honours `tokio::time::pause`).
    pub fn delay_gets(&self, delay: Duration) {
        lock(&self.faults).get_delay = Some(delay);
    }

    fn record(&self, op: RecordedOp) {
        lock(&self.ops).push(op);
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn get(&self, path: &str) -> StorageResult<Option<Value>> {
        self.record(RecordedOp::Get(path.to_string()));

        let delay = lock(&self.faults).get_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let injected = self
            .failing_gets
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StorageError::BackendError(format!(
                "injected read failure for {}",
                path
            )));
        }

        self.inner.get(path).await
    }

    async fn set(&self, path: &str, value: Value) -> StorageResult<()> {
        self.record(RecordedOp::Set(path.to_string()));

        let fail = lock(&self.faults)
            .set_prefix
            .as_deref()
            .is_some_and(|prefix| path.starts_with(prefix));
        if fail {
            return Err(StorageError::WriteFailed(format!(
                "injected write failure for {}",
                path
            )));
        }

        self.inner.set(path, value).await
    }

    async fn delete(&self, path: &str) -> StorageResult<()> {
        self.record(RecordedOp::Delete(path.to_string()));
        self.inner.delete(path).await
    }

    async fn list(&self, collection: &str) -> StorageResult<Vec<String>> {
        self.record(RecordedOp::List(collection.to_string()));
        self.inner.list(collection).await
    }

    async fn commit(&self, batch: WriteBatch) -> StorageResult<()> {
        self.record(RecordedOp::Commit(
            batch.ops().iter().map(|op| op.path().to_string()).collect(),
        ));

        let fail = lock(&self.faults).commit;
        if fail {
            return Err(StorageError::WriteFailed(
                "injected batch failure".to_string(),
            ));
        }

        self.inner.commit(batch).await
    }

    fn backend_type(&self) -> StorageBackend {
        self.inner.backend_type()
    }
}
