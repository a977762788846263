//! Concurrency-bounded request queue.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;

/// Default number of requests allowed in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Bounds the number of concurrently running tasks.
///
/// Tasks beyond the limit wait in a FIFO backlog and are not started until
/// a running task finishes. Queueing changes when a task runs, never what
/// it returns.
#[derive(Debug)]
pub struct RequestQueue {
    concurrency: usize,
    semaphore: Arc<Semaphore>,
    waiting: AtomicUsize,
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

impl RequestQueue {
    /// Creates a queue running at most `concurrency` tasks at once.
    ///
    /// A concurrency of zero is treated as one.
    pub fn new(concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            concurrency,
            semaphore: Arc::new(Semaphore::new(concurrency)),
            waiting: AtomicUsize::new(0),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Tasks currently holding a slot.
    pub fn running(&self) -> usize {
        self.concurrency - self.semaphore.available_permits()
    }

    /// Tasks waiting for a slot.
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Runs `task` once a slot is free and returns its output.
    ///
    /// The closure is not invoked until the task is admitted. Dropping the
    /// returned future while it waits gives up its place in line; dropping
    /// it while it runs frees the slot.
    pub async fn add<F, Fut, T>(&self, task: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _permit = {
            let _waiting = Waiting::enter(&self.waiting);
            // Only a closed semaphore fails to acquire; this one never closes.
            self.semaphore.acquire().await.ok()
        };
        task().await
    }
}

/// Counts a task in the backlog until it is admitted or dropped.
struct Waiting<'a>(&'a AtomicUsize);

impl<'a> Waiting<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
