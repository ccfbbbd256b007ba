use std::future::Future;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Default number of concurrent calls admitted into a collaborator.
pub const DEFAULT_ADMISSION_LIMIT: usize = 5;

/// Fixed-size admission limiter for fan-out work.
///
/// Bounds how many futures run at once, e.g. task dispatch within one layer
/// or relevance grading of many retrieved chunks. Cloning shares the limit.
#[derive(Debug, Clone)]
pub struct AdmissionLimiter {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

impl AdmissionLimiter {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of free slots right now.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for a slot. The slot is released when the permit drops.
    ///
    /// Returns `None` only if the semaphore was closed, which never happens
    /// for a limiter built by [`AdmissionLimiter::new`].
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        self.semaphore.clone().acquire_owned().await.ok()
    }

    /// Run `fut` once a slot is free.
    pub async fn run<F: Future>(&self, fut: F) -> F::Output {
        let _permit = self.acquire().await;
        fut.await
    }
}

impl Default for AdmissionLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_ADMISSION_LIMIT)
    }
}
