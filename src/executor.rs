//! Asynchronous dispatch of parameter operations.
//!
//! Getter and setter bodies never run on the caller's thread: the
//! [`Executor`] hands them to the Tokio worker pool and returns a
//! [`TaskHandle`] the caller may wait on — or drop. A dropped handle never
//! cancels the operation; device I/O, once started, runs to completion.
//!
//! Mutual exclusion is per parameter: [`Executor::submit`] acquires the
//! parameter's async mutex before running the operation, so at most one
//! getter/setter body per parameter executes at any instant. Tokio's mutex
//! queues waiters in arrival order, which linearizes operations on a single
//! parameter FIFO while operations on distinct parameters proceed
//! concurrently.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{oneshot, Mutex};

use crate::error::{DeviceError, DeviceResult};

/// Dispatches parameter operations onto a Tokio runtime's worker pool.
#[derive(Clone, Debug)]
pub struct Executor {
    handle: Handle,
}

impl Executor {
    /// Executor backed by an explicit runtime handle.
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Executor backed by the runtime of the calling context.
    ///
    /// Fails with [`DeviceError::NoRuntime`] when called outside a Tokio
    /// runtime instead of panicking.
    pub fn try_current() -> DeviceResult<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| DeviceError::NoRuntime)
    }

    /// Run `op` on the worker pool under a parameter's mutation lock.
    ///
    /// A second submission for the same lock queues behind the first; it
    /// never runs concurrently with it and never fails because of the wait.
    pub fn submit<T, F>(&self, lock: Arc<Mutex<()>>, op: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = DeviceResult<T>> + Send + 'static,
    {
        self.spawn(async move {
            let _serial = lock.lock().await;
            op.await
        })
    }

    /// Run `op` on the worker pool without a parameter lock.
    ///
    /// Used for device operations that must not queue behind an in-flight
    /// parameter mutation, such as stopping an axis mid-move.
    pub fn spawn<T, F>(&self, op: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = DeviceResult<T>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let done = Arc::new(AtomicBool::new(false));
        let flag = done.clone();

        self.handle.spawn(async move {
            let outcome = op.await;
            flag.store(true, Ordering::Release);
            // The receiver may be gone: fire-and-forget callers drop their
            // handle without observing the outcome.
            let _ = tx.send(outcome);
        });

        TaskHandle {
            rx: Some(rx),
            done,
            cached: None,
        }
    }
}

/// Completion token for a dispatched operation.
///
/// Supports a non-blocking completion check, waiting for completion and
/// result retrieval. The outcome is cached on first receipt, so `wait()`
/// followed by `result()` observes the same value or failure.
#[derive(Debug)]
pub struct TaskHandle<T> {
    rx: Option<oneshot::Receiver<DeviceResult<T>>>,
    done: Arc<AtomicBool>,
    cached: Option<DeviceResult<T>>,
}

impl<T: Clone> TaskHandle<T> {
    /// Whether the operation has finished, without waiting.
    pub fn is_done(&self) -> bool {
        self.cached.is_some() || self.done.load(Ordering::Acquire)
    }

    /// Wait until the operation completes; surfaces its failure.
    pub async fn wait(&mut self) -> DeviceResult<()> {
        self.receive().await.map(|_| ())
    }

    /// Wait for and return the operation's result, re-raising its failure.
    pub async fn result(&mut self) -> DeviceResult<T> {
        self.receive().await
    }

    async fn receive(&mut self) -> DeviceResult<T> {
        if let Some(outcome) = &self.cached {
            return outcome.clone();
        }
        let outcome = match self.rx.take() {
            Some(rx) => rx.await.unwrap_or_else(|_| {
                Err(DeviceError::TaskFailed(
                    "worker dropped the result channel".to_string(),
                ))
            }),
            None => Err(DeviceError::TaskFailed(
                "result channel already consumed".to_string(),
            )),
        };
        self.cached = Some(outcome.clone());
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_submit_resolves() {
        let executor = Executor::try_current().unwrap();
        let lock = Arc::new(Mutex::new(()));

        let mut handle = executor.submit(lock, async { Ok(42u32) });
        assert_eq!(handle.result().await.unwrap(), 42);
        assert!(handle.is_done());
        // Cached: retrieval works more than once.
        assert_eq!(handle.result().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_failure_reraised_on_result() {
        let executor = Executor::try_current().unwrap();
        let lock = Arc::new(Mutex::new(()));

        let mut handle = executor.submit::<u32, _>(lock, async {
            Err(DeviceError::Hardware("axis fault".to_string()))
        });
        assert!(handle.wait().await.is_err());
        assert_eq!(
            handle.result().await,
            Err(DeviceError::Hardware("axis fault".to_string()))
        );
    }

    #[tokio::test]
    async fn test_same_lock_serializes() {
        let executor = Executor::try_current().unwrap();
        let lock = Arc::new(Mutex::new(()));
        let counter = Arc::new(std::sync::Mutex::new(0u32));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let counter = counter.clone();
            handles.push(executor.submit(lock.clone(), async move {
                let value = *counter.lock().unwrap();
                tokio::time::sleep(Duration::from_millis(5)).await;
                *counter.lock().unwrap() = value + 1;
                Ok(())
            }));
        }
        for mut handle in handles {
            handle.wait().await.unwrap();
        }
        // Lost updates would show up here if the bodies overlapped.
        assert_eq!(*counter.lock().unwrap(), 4);
    }

    #[tokio::test]
    async fn test_dropped_handle_runs_to_completion() {
        let executor = Executor::try_current().unwrap();
        let lock = Arc::new(Mutex::new(()));
        let (tx, rx) = oneshot::channel();

        let handle = executor.submit(lock, async move {
            let _ = tx.send(());
            Ok(())
        });
        drop(handle);

        rx.await.unwrap();
    }

    #[test]
    fn test_no_runtime() {
        assert_eq!(Executor::try_current().unwrap_err(), DeviceError::NoRuntime);
    }
}
