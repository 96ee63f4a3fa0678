//
// limiter.rs
//
// Bounded concurrency for bulk gateway calls
//

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

/// Bounds how many queued futures run at the same time.
///
/// Used by workspace discovery to avoid saturating the host transport with
/// simultaneous `readFile` requests on large workspaces.
#[derive(Debug, Clone)]
pub struct Limiter {
    semaphore: Arc<Semaphore>,
}

impl Limiter {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// Run `task` once a slot is free, holding the slot for its duration.
    pub async fn queue<T>(&self, task: impl Future<Output = T>) -> T {
        // The semaphore is never closed, so acquisition only fails after an
        // explicit close(); fall back to running unbounded in that case
        // rather than panicking.
        let _permit = self.semaphore.acquire().await.ok();
        task.await
    }
}
