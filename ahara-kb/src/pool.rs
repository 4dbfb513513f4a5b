//! Bounded pool for CPU-bound work
//!
//! Embedding, index search and snapshot builds run on tokio's blocking
//! threads, at most `size` at a time, so they never stall the async runtime.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::debug;

use crate::error::{KbError, Result};

#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// Pool allowing `size` jobs at once (minimum one)
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Configured concurrency
    pub fn size(&self) -> usize {
        self.size
    }

    /// Jobs that could start right now
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `job` on a blocking thread once a slot frees up
    pub async fn run<T, F>(&self, operation: &'static str, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| KbError::Pool(format!("{}: {}", operation, e)))?;
        debug!(operation, available = self.permits.available_permits(), "Worker started");

        let handle = tokio::task::spawn_blocking(move || {
            let result = job();
            drop(permit);
            result
        });
        handle
            .await
            .map_err(|e| KbError::Pool(format!("{} worker failed: {}", operation, e)))?
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        let size = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self::new(size)
    }
}
