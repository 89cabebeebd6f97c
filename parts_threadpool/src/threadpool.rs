use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::runtime::{Builder as TokioRuntimeBuilder, Handle as TokioRuntimeHandle, Runtime as TokioRuntime};

use crate::errors::{MultithreadedRuntimeError, Result};

const THREADPOOL_THREAD_ID_PREFIX: &str = "file-parts"; // thread names will be file-parts-0, file-parts-1, etc.
const THREADPOOL_STACK_SIZE: usize = 8_000_000; // 8MB stack size
const THREADPOOL_MAX_BLOCKING_THREADS: usize = 100; // max 100 threads can block IO

/// A thin wrapper around a multi-threaded tokio runtime with the settings used for all
/// file I/O work in this workspace.
///
/// Synchronous callers hand their top level future to [`ThreadPool::external_run_async_task`],
/// which blocks until it completes; inside, work is spawned on [`ThreadPool::handle`].  Tests that
/// already run inside a tokio runtime wrap it with [`ThreadPool::from_external`].
///
/// # Example
///
/// ```rust
/// use parts_threadpool::ThreadPool;
///
/// let pool = ThreadPool::new().expect("Error initializing runtime.");
///
/// let result = pool.external_run_async_task(async { 42 }).expect("Task Error.");
///
/// assert_eq!(result, 42);
/// ```
///
/// # Settings
///
/// - One worker thread per available core
/// - Thread names prefixed with "file-parts-"
/// - 8MB stack size per thread (default is 2MB)
/// - Maximum of 100 blocking threads
/// - All tokio drivers enabled (IO, Timer)
#[derive(Debug)]
pub struct ThreadPool {
    // Owned runtime; None when wrapping an external runtime handle.
    runtime: Option<TokioRuntime>,

    handle: TokioRuntimeHandle,
}

impl ThreadPool {
    pub fn new() -> Result<Arc<Self>> {
        // First, make sure that this is not being run from a currently active tokio runtime.
        if TokioRuntimeHandle::try_current().is_ok() {
            return Err(MultithreadedRuntimeError::Other(
                "Tokio runtime already started; use from_external instead.".to_owned(),
            ));
        }

        let thread_id = AtomicUsize::new(0);
        let get_thread_name = move || {
            let id = thread_id.fetch_add(1, Ordering::Relaxed);
            format!("{THREADPOOL_THREAD_ID_PREFIX}-{id}")
        };

        let runtime = TokioRuntimeBuilder::new_multi_thread()
            .thread_name_fn(get_thread_name)
            .thread_stack_size(THREADPOOL_STACK_SIZE)
            .max_blocking_threads(THREADPOOL_MAX_BLOCKING_THREADS)
            .enable_all()
            .build()
            .map_err(MultithreadedRuntimeError::RuntimeInitializationError)?;
        let handle = runtime.handle().clone();

        Ok(Arc::new(Self {
            runtime: Some(runtime),
            handle,
        }))
    }

    pub fn from_external(rt_handle: TokioRuntimeHandle) -> Arc<Self> {
        Arc::new(Self {
            runtime: None,
            handle: rt_handle,
        })
    }

    #[inline]
    pub fn handle(&self) -> TokioRuntimeHandle {
        self.handle.clone()
    }

    /// This function should ONLY be used by threads outside of tokio; it should not be called
    /// from within a task running on the runtime worker pool.  Doing so can lead to deadlocking.
    pub fn external_run_async_task<F>(&self, future: F) -> Result<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.block_on(async move {
            // Run the actual task on a task worker thread so we can get back information
            // on issues, including reporting panics as runtime errors.
            self.handle.spawn(future).await.map_err(MultithreadedRuntimeError::from)
        })
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        // Dropping a runtime from within an async context panics; background shutdown does not.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_run_returns_output() {
        let pool = ThreadPool::new().unwrap();

        let handle = pool.handle();
        let result = pool
            .external_run_async_task(async move {
                let a = handle.spawn(async { 20 });
                let b = handle.spawn(async { 22 });
                a.await.unwrap() + b.await.unwrap()
            })
            .unwrap();

        assert_eq!(result, 42);
    }

    #[test]
    fn test_tasks_run_on_named_threads() {
        let pool = ThreadPool::new().unwrap();
        let name = pool
            .external_run_async_task(async { std::thread::current().name().map(str::to_owned) })
            .unwrap()
            .unwrap();
        assert!(name.starts_with("file-parts-"), "{name}");
    }

    #[test]
    fn test_panic_is_reported() {
        let pool = ThreadPool::new().unwrap();
        let result = pool.external_run_async_task(async {
            if pool_should_panic() {
                panic!("boom");
            }
            0
        });
        assert!(matches!(result, Err(MultithreadedRuntimeError::TaskPanic(_))));
    }

    fn pool_should_panic() -> bool {
        true
    }

    #[tokio::test]
    async fn test_new_inside_runtime_fails() {
        assert!(matches!(ThreadPool::new(), Err(MultithreadedRuntimeError::Other(_))));

        let pool = ThreadPool::from_external(TokioRuntimeHandle::current());
        assert_eq!(pool.handle().spawn(async { 7 }).await.unwrap(), 7);
    }
}
