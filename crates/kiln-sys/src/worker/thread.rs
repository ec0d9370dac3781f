//! Thread-backed workers
//!
//! Each worker is an OS thread with its own task channel. The context is
//! shared read-only; tasks and results cross only as messages.

use std::io;
use std::sync::Arc;
use std::thread;

use crossbeam::channel::{unbounded, Sender};
use tracing::debug;

use super::pool::{WorkerEvents, WorkerHandle, WorkerSpawner};
use super::protocol::TaskMessage;
use super::registry::{handle_task, CompilerWorkerContext};
use super::WorkerError;

/// Spawns one thread per worker.
#[derive(Clone)]
pub struct ThreadSpawner {
    context: Arc<dyn CompilerWorkerContext>,
}

impl ThreadSpawner {
    /// Workers run tasks against `context`.
    pub fn new(context: Arc<dyn CompilerWorkerContext>) -> Self {
        Self { context }
    }
}

impl std::fmt::Debug for ThreadSpawner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadSpawner").finish_non_exhaustive()
    }
}

impl WorkerSpawner for ThreadSpawner {
    fn spawn(&self, events: WorkerEvents) -> Result<Box<dyn WorkerHandle>, WorkerError> {
        let (tx, rx) = unbounded::<(u64, TaskMessage)>();
        let context = self.context.clone();
        let worker_id = events.worker_id();

        thread::Builder::new()
            .name(format!("kiln-worker-{}", worker_id))
            .spawn(move || {
                // reports the exit on return and on panic
                let _guard = events.exit_guard();
                for (task_id, task) in rx {
                    let response = handle_task(context.as_ref(), &task);
                    events.completed(task_id, response);
                }
                debug!(worker_id, "worker thread finished");
            })
            .map_err(|e| WorkerError::Spawn(e.to_string()))?;

        Ok(Box::new(ThreadWorker { tx: Some(tx) }))
    }
}

struct ThreadWorker {
    tx: Option<Sender<(u64, TaskMessage)>>,
}

impl WorkerHandle for ThreadWorker {
    fn send(&mut self, task_id: u64, task: TaskMessage) -> io::Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "worker terminated"))?;
        tx.send((task_id, task))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "worker thread exited"))
    }

    fn terminate(&mut self) {
        // the thread exits after its current task once the channel closes
        self.tx.take();
    }
}
