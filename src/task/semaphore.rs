//! Counting permit pool.
//!
//! A thin layer over [`tokio::sync::Semaphore`] with explicit `wait` /
//! `signal` operations: a permit taken by `wait` is not tied to a guard and
//! must be handed back with `signal`, possibly from another task.

use tokio::sync::Semaphore as Permits;

#[derive(Debug)]
pub struct Semaphore {
    permits: Permits,
    capacity: usize,
}

impl Semaphore {
    /// Create a pool holding `capacity` permits.
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Permits::new(capacity),
            capacity,
        }
    }

    /// Suspend until a permit is available and take it.
    ///
    /// Cancel-safe: dropping the future before it completes takes nothing.
    pub async fn wait(&self) {
        // The pool is never closed, so acquisition only returns once a permit is ours.
        if let Ok(permit) = self.permits.acquire().await {
            permit.forget();
        }
    }

    /// Return one permit to the pool.
    pub fn signal(&self) {
        debug_assert!(
            self.permits.available_permits() < self.capacity,
            "semaphore signalled more often than waited"
        );
        self.permits.add_permits(1);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}
