//! Trailing-edge debouncing for search-as-you-type call sites.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

/// Default wait before a debounced search fires.
pub const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(500);

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type Action<A> = Arc<dyn Fn(A) -> BoxFuture + Send + Sync>;

/// Delays invoking an async function until calls stop arriving.
///
/// Each [`call`](Self::call) cancels the pending invocation and schedules a
/// new one `wait` later with the latest arguments. An invocation whose wait
/// has elapsed runs to completion. Must be used from within a tokio
/// runtime.
pub struct Debouncer<A> {
    wait: Duration,
    action: Action<A>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl<A> fmt::Debug for Debouncer<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debouncer")
            .field("wait", &self.wait)
            .field("pending", &self.is_pending())
            .finish_non_exhaustive()
    }
}

impl<A: Send + 'static> Debouncer<A> {
    pub fn new<F, Fut>(wait: Duration, f: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            wait,
            action: Arc::new(move |args: A| -> BoxFuture { Box::pin(f(args)) }),
            pending: Mutex::new(None),
        }
    }

    fn pending(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Schedules `args` to be delivered once `wait` passes without another
    /// call.
    pub fn call(&self, args: A) {
        let action = Arc::clone(&self.action);
        let wait = self.wait;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            tokio::spawn(action(args));
        });

        if let Some(previous) = self.pending().replace(handle) {
            previous.abort();
        }
    }

    /// Drops the pending invocation, if any.
    pub fn cancel(&self) {
        if let Some(previous) = self.pending().take() {
            previous.abort();
        }
    }
}

impl<A> Debouncer<A> {
    /// Returns `true` while an invocation is scheduled.
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl<A> Drop for Debouncer<A> {
    fn drop(&mut self) {
        let pending = self
            .pending
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = pending.take() {
            handle.abort();
        }
    }
}

/// Wraps an async search function so it only runs after typing pauses.
pub fn create_debounced_search<F, Fut>(search: F, wait: Option<Duration>) -> Debouncer<String>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Debouncer::new(wait.unwrap_or(DEFAULT_SEARCH_DEBOUNCE), search)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(String) -> BoxFuture + Send + Sync) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let f = move |query: String| -> BoxFuture {
            let sink = Arc::clone(&sink);
            Box::pin(async move {
                sink.lock().unwrap().push(query);
            })
        };
        (seen, f)
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_last_call_fires() {
        let (seen, f) = recorder();
        let debouncer = Debouncer::new(Duration::from_millis(300), f);

        debouncer.call("m".to_string());
        tokio::time::sleep(Duration::from_millis(100)).await;
        debouncer.call("mu".to_string());
        tokio::time::sleep(Duration::from_millis(100)).await;
        debouncer.call("muse".to_string());

        tokio::time::sleep(Duration::from_millis(299)).await;
        assert!(seen.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(*seen.lock().unwrap(), vec!["muse".to_string()]);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spaced_calls_each_fire() {
        let (seen, f) = recorder();
        let debouncer = Debouncer::new(Duration::from_millis(50), f);

        debouncer.call("first".to_string());
        tokio::time::sleep(Duration::from_millis(60)).await;
        debouncer.call("second".to_string());
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["first".to_string(), "second".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_pending_call() {
        let (seen, f) = recorder();
        let debouncer = Debouncer::new(Duration::from_millis(50), f);

        debouncer.call("never".to_string());
        assert!(debouncer.is_pending());
        debouncer.cancel();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(seen.lock().unwrap().is_empty());
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_call_does_not_abort_running_invocation() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let debouncer = Debouncer::new(Duration::from_millis(50), move |query: String| {
            let sink = Arc::clone(&sink);
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                sink.lock().unwrap().push(query);
            }
        });

        debouncer.call("slow".to_string());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!debouncer.is_pending());
        debouncer.call("next".to_string());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["slow".to_string(), "next".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounced_search_defaults_to_half_second() {
        let (seen, f) = recorder();
        let search = create_debounced_search(f, None);

        search.call("daft punk".to_string());
        tokio::time::sleep(Duration::from_millis(499)).await;
        assert!(seen.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(*seen.lock().unwrap(), vec!["daft punk".to_string()]);
    }
}
