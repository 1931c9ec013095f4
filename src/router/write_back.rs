//! Background cache write-back.
//!
//! Network-first responses are persisted after they have been handed to the
//! caller. Each write runs as a detached task; the caller never waits on it
//! and never sees its errors. Failures are logged, counted, and published
//! on a broadcast channel for anyone who wants to observe them.

use std::sync::Arc;

use tokio::sync::{Mutex, broadcast};
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::cache::CacheGeneration;
use crate::telemetry;
use crate::types::{CachedResponse, RequestKey, Response};

/// Capacity of the failure channel; slow subscribers miss older failures.
const FAILURE_CHANNEL_CAPACITY: usize = 64;

/// A background write that did not make it into the cache.
#[derive(Debug, Clone)]
pub struct WriteBackFailure {
    pub generation: String,
    pub url: String,
    pub error: String,
}

/// Spawner and tracker for background cache writes.
pub struct WriteBack {
    tracker: TaskTracker,
    failures: broadcast::Sender<WriteBackFailure>,
    flush_lock: Mutex<()>,
}

impl WriteBack {
    pub fn new() -> Self {
        let (failures, _) = broadcast::channel(FAILURE_CHANNEL_CAPACITY);
        Self {
            tracker: TaskTracker::new(),
            failures,
            flush_lock: Mutex::new(()),
        }
    }

    /// Store `response` under `key` in `generation` without blocking.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        &self,
        generation: Arc<dyn CacheGeneration>,
        key: RequestKey,
        response: Response,
    ) {
        let failures = self.failures.clone();
        self.tracker.spawn(async move {
            let url = key.url().to_string();
            match generation.put(key, CachedResponse::new(response)).await {
                Ok(()) => {
                    debug!(generation = generation.name(), url = %url, "write-back stored");
                }
                Err(e) => {
                    warn!(
                        generation = generation.name(),
                        url = %url,
                        error = %e,
                        "write-back failed"
                    );
                    metrics::counter!(telemetry::WRITE_BACK_FAILURES_TOTAL).increment(1);
                    // No subscribers is fine.
                    let _ = failures.send(WriteBackFailure {
                        generation: generation.name().to_string(),
                        url,
                        error: e.to_string(),
                    });
                }
            }
        });
    }

    /// Observe write-back failures from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<WriteBackFailure> {
        self.failures.subscribe()
    }

    /// Number of writes still in flight.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every write spawned so far has finished.
    pub async fn flush(&self) {
        let _guard = self.flush_lock.lock().await;
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

impl Default for WriteBack {
    fn default() -> Self {
        Self::new()
    }
}
