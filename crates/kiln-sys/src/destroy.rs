//! Destroy registry
//!
//! Every component that holds an external resource (watchers, worker pools,
//! the temp directory) registers a cleanup callback here. A single
//! [`DestroyRegistry::destroy_all`] runs them all concurrently and isolates
//! failures per callback.

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Pending cleanup work returned by a callback.
pub type DestroyFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// A zero-argument cleanup callback. Identity is the `Arc` pointer.
pub type DestroyCallback = Arc<dyn Fn() -> DestroyFuture + Send + Sync>;

/// Wrap a synchronous cleanup function.
pub fn callback<F>(f: F) -> DestroyCallback
where
    F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(move || {
        let result = f();
        Box::pin(async move { result })
    })
}

/// Wrap a cleanup function that returns pending work.
pub fn async_callback<F, Fut>(f: F) -> DestroyCallback
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move || Box::pin(f()))
}

/// Outcome of one [`DestroyRegistry::destroy_all`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DestroyReport {
    /// Callbacks invoked
    pub ran: usize,
    /// Callbacks that panicked or returned an error
    pub failed: usize,
}

/// Owned, internally synchronized set of cleanup callbacks.
#[derive(Default)]
pub struct DestroyRegistry {
    callbacks: Mutex<Vec<DestroyCallback>>,
}

impl DestroyRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback. Returns false if it was already registered.
    pub fn add(&self, callback: DestroyCallback) -> bool {
        let mut callbacks = self.callbacks.lock();
        if callbacks.iter().any(|c| Arc::ptr_eq(c, &callback)) {
            return false;
        }
        callbacks.push(callback);
        true
    }

    /// Unregister a callback. Returns false if it was not registered.
    pub fn remove(&self, callback: &DestroyCallback) -> bool {
        let mut callbacks = self.callbacks.lock();
        let before = callbacks.len();
        callbacks.retain(|c| !Arc::ptr_eq(c, callback));
        callbacks.len() != before
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.callbacks.lock().len()
    }

    /// Whether no callbacks are registered.
    pub fn is_empty(&self) -> bool {
        self.callbacks.lock().is_empty()
    }

    /// Run every registered callback and wait for all returned work.
    ///
    /// The registry is emptied before any callback runs, so callbacks may
    /// freely call [`DestroyRegistry::remove`]. Must be called from within a
    /// tokio runtime.
    pub async fn destroy_all(&self) -> DestroyReport {
        let callbacks = std::mem::take(&mut *self.callbacks.lock());
        let mut report = DestroyReport::default();
        let mut pending = JoinSet::new();

        for callback in callbacks {
            report.ran += 1;
            match catch_unwind(AssertUnwindSafe(|| callback())) {
                Ok(work) => {
                    pending.spawn(work);
                }
                Err(_) => {
                    report.failed += 1;
                    warn!("destroy callback panicked");
                }
            }
        }

        while let Some(joined) = pending.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    report.failed += 1;
                    warn!(error = %err, "destroy callback failed");
                }
                Err(err) => {
                    report.failed += 1;
                    warn!(error = %err, "destroy callback task did not complete");
                }
            }
        }

        debug!(ran = report.ran, failed = report.failed, "destroy registry drained");
        report
    }
}

impl std::fmt::Debug for DestroyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DestroyRegistry")
            .field("callbacks", &self.len())
            .finish()
    }
}
