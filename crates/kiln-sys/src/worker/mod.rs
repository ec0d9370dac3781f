//! Worker pool
//!
//! CPU-heavy compiler functions run on a bounded set of isolated workers.
//! The main context only exchanges [`TaskMessage`]s and responses with them.
//!
//! - [`WorkerPoolController`] schedules tasks and replaces crashed workers
//! - [`ThreadSpawner`] runs workers as threads
//! - [`ProcessSpawner`] runs workers as `kiln-worker` child processes

mod pool;
mod process;
mod protocol;
mod registry;
mod thread;

use thiserror::Error;

pub use pool::{
    ExitGuard, PendingTask, PoolStats, WorkerEvents, WorkerHandle, WorkerPoolController,
    WorkerSpawner,
};
pub use process::{serve_stdio, ProcessSpawner};
pub use protocol::{ErrorDescriptor, TaskMessage, TaskResponse, WorkerReply, WorkerRequest};
pub use registry::{handle_task, CompilerWorkerContext, UnconfiguredContext, WorkerFunction};
pub use thread::ThreadSpawner;

/// Errors produced by the worker pool
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Pool ceiling below one
    #[error("max concurrent workers must be at least 1, got {0}")]
    InvalidConcurrency(usize),

    /// Function name not in the registry
    #[error("unknown worker function: {0}")]
    UnknownFunction(String),

    /// The function ran and reported a failure
    #[error("task failed: {0}")]
    Task(ErrorDescriptor),

    /// The worker died while holding the task
    #[error("worker {worker_id} crashed")]
    WorkerCrashed {
        /// Id of the dead worker
        worker_id: u64,
    },

    /// The pool was destroyed before the task settled
    #[error("task cancelled")]
    Cancelled,

    /// A worker could not be started
    #[error("failed to spawn worker: {0}")]
    Spawn(String),
}
