//! Bounded admission for resolution tasks.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Default number of resolution tasks allowed to run at once.
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 60;

/// Admits at most `capacity` spawned tasks at a time.
///
/// Submissions past the limit wait for a running task to finish. Waiters are
/// admitted in whatever order the semaphore hands out permits.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl ConcurrencyGate {
    /// A zero capacity is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tasks currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.permits.available_permits()
    }

    /// Wait for a free slot, then spawn `task` into `tasks`.
    ///
    /// The slot is released when the task finishes or is aborted.
    pub async fn submit<F>(&self, tasks: &mut JoinSet<F::Output>, task: F)
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => permit,
            // The semaphore is private to the gate and never closed.
            Err(_) => unreachable!("concurrency gate semaphore closed"),
        };
        tasks.spawn(async move {
            let _permit = permit;
            task.await
        });
    }
}

impl Default for ConcurrencyGate {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY_LIMIT)
    }
}
