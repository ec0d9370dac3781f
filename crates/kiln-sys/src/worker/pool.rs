//! Worker pool controller
//!
//! Tasks go to an idle worker when there is one, otherwise to a freshly
//! spawned worker while the pool is below its ceiling, otherwise to a FIFO
//! queue. Workers report back through [`WorkerEvents`]; a worker that exits
//! while holding a task fails that task and is replaced on demand.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::protocol::{TaskMessage, TaskResponse};
use super::registry::WorkerFunction;
use super::WorkerError;
use crate::destroy::{self, DestroyCallback};

type Reply = oneshot::Sender<Result<Value, WorkerError>>;

/// One live worker as seen by the pool.
pub trait WorkerHandle: Send {
    /// Hand a task to the worker. Must not block.
    fn send(&mut self, task_id: u64, task: TaskMessage) -> io::Result<()>;

    /// Stop the worker. Must not block for long and may be called twice.
    fn terminate(&mut self);
}

/// Creates workers for a pool.
pub trait WorkerSpawner: Send + Sync + fmt::Debug {
    /// Start a worker that reports through `events`.
    ///
    /// Called with the pool locked; implementations must not call back into
    /// `events` before returning.
    fn spawn(&self, events: WorkerEvents) -> Result<Box<dyn WorkerHandle>, WorkerError>;
}

/// Channel from a worker back to its pool.
#[derive(Clone)]
pub struct WorkerEvents {
    worker_id: u64,
    pool: Weak<PoolShared>,
}

impl WorkerEvents {
    /// Id of the worker these events belong to.
    pub fn worker_id(&self) -> u64 {
        self.worker_id
    }

    /// The worker finished a task.
    pub fn completed(&self, task_id: u64, response: TaskResponse) {
        if let Some(pool) = self.pool.upgrade() {
            pool.on_completed(self.worker_id, task_id, response);
        }
    }

    /// The worker is gone.
    pub fn exited(&self) {
        if let Some(pool) = self.pool.upgrade() {
            pool.on_exited(self.worker_id);
        }
    }

    /// Guard that reports [`WorkerEvents::exited`] when dropped, including
    /// during a panic unwind.
    pub fn exit_guard(&self) -> ExitGuard {
        ExitGuard(self.clone())
    }
}

/// Reports a worker exit on drop.
pub struct ExitGuard(WorkerEvents);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.0.exited();
    }
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    /// Ceiling
    pub max_workers: usize,
    /// Live workers
    pub active_workers: usize,
    /// Workers holding a task
    pub busy_workers: usize,
    /// Tasks waiting for a worker
    pub queued_tasks: usize,
    /// Highest number of live workers seen
    pub peak_workers: usize,
    /// Tasks that produced a response
    pub completed_tasks: u64,
    /// Workers that exited without being asked to
    pub crashed_workers: u64,
}

struct InFlight {
    task_id: u64,
    reply: Reply,
}

struct WorkerSlot {
    handle: Box<dyn WorkerHandle>,
    current: Option<InFlight>,
}

struct QueuedTask {
    task_id: u64,
    message: TaskMessage,
    reply: Reply,
}

#[derive(Default)]
struct PoolState {
    workers: BTreeMap<u64, WorkerSlot>,
    queue: VecDeque<QueuedTask>,
    next_worker_id: u64,
    next_task_id: u64,
    destroyed: bool,
    peak_workers: usize,
    completed_tasks: u64,
    crashed_workers: u64,
}

/// State shared between controller handles and worker callbacks.
struct PoolShared {
    max_workers: usize,
    spawner: Arc<dyn WorkerSpawner>,
    state: Mutex<PoolState>,
}

impl PoolShared {
    fn submit(self: &Arc<Self>, message: TaskMessage, reply: Reply) {
        let mut state = self.state.lock();
        if state.destroyed {
            let _ = reply.send(Err(WorkerError::Cancelled));
            return;
        }
        state.next_task_id += 1;
        let task_id = state.next_task_id;
        state.queue.push_back(QueuedTask {
            task_id,
            message,
            reply,
        });
        self.pump(&mut state);
    }

    /// Move queued tasks onto idle or new workers.
    fn pump(self: &Arc<Self>, state: &mut PoolState) {
        while !state.queue.is_empty() {
            let idle = state
                .workers
                .iter()
                .find(|(_, slot)| slot.current.is_none())
                .map(|(id, _)| *id);
            let worker_id = match idle {
                Some(id) => id,
                None if state.workers.len() < self.max_workers => match self.spawn_worker(state) {
                    Ok(id) => id,
                    Err(err) => {
                        warn!(error = %err, "failed to spawn worker");
                        if state.workers.is_empty() {
                            // nothing left that could drain the queue
                            for task in state.queue.drain(..) {
                                let _ = task.reply.send(Err(WorkerError::Spawn(err.to_string())));
                            }
                        }
                        return;
                    }
                },
                None => return,
            };
            let Some(task) = state.queue.pop_front() else {
                return;
            };
            self.assign(state, worker_id, task);
        }
    }

    fn spawn_worker(self: &Arc<Self>, state: &mut PoolState) -> Result<u64, WorkerError> {
        state.next_worker_id += 1;
        let worker_id = state.next_worker_id;
        let handle = self.spawner.spawn(WorkerEvents {
            worker_id,
            pool: Arc::downgrade(self),
        })?;
        state.workers.insert(
            worker_id,
            WorkerSlot {
                handle,
                current: None,
            },
        );
        state.peak_workers = state.peak_workers.max(state.workers.len());
        debug!(worker_id, active = state.workers.len(), "worker spawned");
        Ok(worker_id)
    }

    fn assign(&self, state: &mut PoolState, worker_id: u64, task: QueuedTask) {
        let Some(slot) = state.workers.get_mut(&worker_id) else {
            let _ = task.reply.send(Err(WorkerError::WorkerCrashed { worker_id }));
            return;
        };
        match slot.handle.send(task.task_id, task.message) {
            Ok(()) => {
                slot.current = Some(InFlight {
                    task_id: task.task_id,
                    reply: task.reply,
                });
            }
            Err(err) => {
                warn!(worker_id, error = %err, "worker rejected task");
                let _ = task.reply.send(Err(WorkerError::WorkerCrashed { worker_id }));
                if let Some(mut dead) = state.workers.remove(&worker_id) {
                    dead.handle.terminate();
                }
                state.crashed_workers += 1;
            }
        }
    }

    fn on_completed(self: &Arc<Self>, worker_id: u64, task_id: u64, response: TaskResponse) {
        let reply = {
            let mut state = self.state.lock();
            let reply = state
                .workers
                .get_mut(&worker_id)
                .and_then(|slot| slot.current.take_if(|task| task.task_id == task_id))
                .map(|task| task.reply);
            if reply.is_some() {
                state.completed_tasks += 1;
            } else {
                debug!(worker_id, task_id, "response for unknown task dropped");
            }
            if !state.destroyed {
                self.pump(&mut state);
            }
            reply
        };
        if let Some(reply) = reply {
            let _ = reply.send(response.map_err(WorkerError::Task));
        }
    }

    fn on_exited(self: &Arc<Self>, worker_id: u64) {
        let mut state = self.state.lock();
        // workers the pool stopped itself are already gone
        let Some(mut slot) = state.workers.remove(&worker_id) else {
            return;
        };
        state.crashed_workers += 1;
        slot.handle.terminate();
        match slot.current.take() {
            Some(task) => {
                warn!(worker_id, task_id = task.task_id, "worker crashed while running a task");
                let _ = task.reply.send(Err(WorkerError::WorkerCrashed { worker_id }));
            }
            None => warn!(worker_id, "idle worker exited"),
        }
        if !state.destroyed {
            self.pump(&mut state);
        }
    }

    fn destroy(&self) {
        let (workers, queued) = {
            let mut state = self.state.lock();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            let workers = std::mem::take(&mut state.workers);
            let queued: Vec<QueuedTask> = state.queue.drain(..).collect();
            (workers, queued)
        };

        let count = workers.len();
        for (_, mut slot) in workers {
            if let Some(task) = slot.current.take() {
                let _ = task.reply.send(Err(WorkerError::Cancelled));
            }
            slot.handle.terminate();
        }
        for task in queued {
            let _ = task.reply.send(Err(WorkerError::Cancelled));
        }
        info!(workers = count, "worker pool destroyed");
    }

    fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            max_workers: self.max_workers,
            active_workers: state.workers.len(),
            busy_workers: state.workers.values().filter(|s| s.current.is_some()).count(),
            queued_tasks: state.queue.len(),
            peak_workers: state.peak_workers,
            completed_tasks: state.completed_tasks,
            crashed_workers: state.crashed_workers,
        }
    }
}

impl Drop for PoolShared {
    fn drop(&mut self) {
        for slot in self.state.get_mut().workers.values_mut() {
            slot.handle.terminate();
        }
    }
}

/// Bounded pool of workers executing registered functions.
///
/// Cheap to clone; all clones drive the same pool.
#[derive(Clone)]
pub struct WorkerPoolController {
    shared: Arc<PoolShared>,
}

impl WorkerPoolController {
    /// Create a pool that never runs more than `max_workers` workers.
    ///
    /// No worker is started until the first dispatch.
    pub fn new(max_workers: usize, spawner: Arc<dyn WorkerSpawner>) -> Result<Self, WorkerError> {
        if max_workers == 0 {
            return Err(WorkerError::InvalidConcurrency(max_workers));
        }
        Ok(Self {
            shared: Arc::new(PoolShared {
                max_workers,
                spawner,
                state: Mutex::new(PoolState::default()),
            }),
        })
    }

    /// Ceiling on concurrent workers.
    pub fn max_workers(&self) -> usize {
        self.shared.max_workers
    }

    /// Queue a call of `function_name` with `args`.
    ///
    /// Unknown function names are rejected here, before anything is queued.
    pub fn dispatch(&self, function_name: &str, args: Vec<Value>) -> Result<PendingTask, WorkerError> {
        let function = WorkerFunction::from_name(function_name)
            .ok_or_else(|| WorkerError::UnknownFunction(function_name.to_string()))?;
        Ok(self.run(function, args))
    }

    /// Queue a call of a registered function.
    pub fn run(&self, function: WorkerFunction, args: Vec<Value>) -> PendingTask {
        let (tx, rx) = oneshot::channel();
        self.shared.submit(
            TaskMessage {
                function_name: function.name().to_string(),
                args,
            },
            tx,
        );
        PendingTask { rx }
    }

    /// Terminate every worker and cancel every pending task. Idempotent.
    pub fn destroy(&self) {
        self.shared.destroy();
    }

    /// Whether [`WorkerPoolController::destroy`] has run.
    pub fn is_destroyed(&self) -> bool {
        self.shared.state.lock().destroyed
    }

    /// Current counters.
    pub fn stats(&self) -> PoolStats {
        self.shared.stats()
    }

    /// Destroy callback that does not keep the pool alive.
    pub fn destroy_callback(&self) -> DestroyCallback {
        let weak = Arc::downgrade(&self.shared);
        destroy::callback(move || {
            if let Some(shared) = weak.upgrade() {
                shared.destroy();
            }
            Ok(())
        })
    }
}

impl fmt::Debug for WorkerPoolController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPoolController")
            .field("spawner", &self.shared.spawner)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Result of a dispatched task.
///
/// Resolves to the function's return value, or to [`WorkerError::Task`],
/// [`WorkerError::WorkerCrashed`] or [`WorkerError::Cancelled`].
#[must_use = "a dispatched task does nothing useful unless awaited"]
pub struct PendingTask {
    rx: oneshot::Receiver<Result<Value, WorkerError>>,
}

impl PendingTask {
    /// Block the current thread until the task settles.
    ///
    /// Must not be called from within an async context.
    pub fn wait(self) -> Result<Value, WorkerError> {
        self.rx.blocking_recv().unwrap_or(Err(WorkerError::Cancelled))
    }
}

impl Future for PendingTask {
    type Output = Result<Value, WorkerError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(WorkerError::Cancelled)))
    }
}

impl fmt::Debug for PendingTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTask").finish_non_exhaustive()
    }
}
