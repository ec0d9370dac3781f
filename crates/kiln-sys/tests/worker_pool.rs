//! Worker pool scheduling, crash recovery and shutdown

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kiln_sys::worker::{
    CompilerWorkerContext, ErrorDescriptor, TaskResponse, ThreadSpawner, WorkerError,
    WorkerFunction, WorkerPoolController,
};
use serde_json::{json, Value};

/// Context whose `transpile` sleeps, tracks concurrency and can be told to
/// fail or crash through its first argument.
#[derive(Default)]
struct TestContext {
    running: AtomicUsize,
    max_running: AtomicUsize,
    delay_ms: u64,
}

impl TestContext {
    fn with_delay(delay_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            delay_ms,
            ..Self::default()
        })
    }

    fn run(&self, args: &[Value]) -> TaskResponse {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(self.delay_ms));
        self.running.fetch_sub(1, Ordering::SeqCst);

        match args.first().and_then(Value::as_str) {
            Some("crash") => panic!("worker crash requested"),
            Some("fail") => Err(ErrorDescriptor::new("requested failure").with_stack("at run")),
            _ => Ok(args.first().cloned().unwrap_or(Value::Null)),
        }
    }
}

impl CompilerWorkerContext for TestContext {
    fn transpile(&self, args: &[Value]) -> TaskResponse {
        self.run(args)
    }
    fn transform_css_to_esm(&self, args: &[Value]) -> TaskResponse {
        self.run(args)
    }
    fn prepare_module(&self, args: &[Value]) -> TaskResponse {
        self.run(args)
    }
    fn optimize_css(&self, args: &[Value]) -> TaskResponse {
        self.run(args)
    }
    fn transpile_to_es5(&self, args: &[Value]) -> TaskResponse {
        self.run(args)
    }
    fn prerender_worker(&self, args: &[Value]) -> TaskResponse {
        self.run(args)
    }
}

fn pool(context: &Arc<TestContext>, max: usize) -> WorkerPoolController {
    WorkerPoolController::new(max, Arc::new(ThreadSpawner::new(context.clone()))).unwrap()
}

#[test]
fn test_zero_ceiling_rejected() {
    let context = TestContext::with_delay(0);
    let err = WorkerPoolController::new(0, Arc::new(ThreadSpawner::new(context))).unwrap_err();
    assert!(matches!(err, WorkerError::InvalidConcurrency(0)));
}

#[test]
fn test_unknown_function_rejected_synchronously() {
    let context = TestContext::with_delay(0);
    let pool = pool(&context, 1);
    let err = pool.dispatch("formatDisk", vec![]).unwrap_err();
    assert!(matches!(err, WorkerError::UnknownFunction(name) if name == "formatDisk"));
    assert_eq!(pool.stats().active_workers, 0);
}

#[tokio::test]
async fn test_never_exceeds_ceiling() {
    let context = TestContext::with_delay(30);
    let pool = pool(&context, 2);

    let pending: Vec<_> = (0..8)
        .map(|i| pool.dispatch("transpile", vec![json!(i)]).unwrap())
        .collect();
    assert!(pool.stats().active_workers <= 2);
    assert!(pool.stats().queued_tasks >= 5);

    let mut results = Vec::new();
    for task in pending {
        results.push(task.await.unwrap());
    }
    assert_eq!(results, (0..8).map(|i| json!(i)).collect::<Vec<_>>());

    let stats = pool.stats();
    assert!(context.max_running.load(Ordering::SeqCst) <= 2);
    assert_eq!(stats.peak_workers, 2);
    assert_eq!(stats.completed_tasks, 8);
    assert_eq!(stats.queued_tasks, 0);
    assert_eq!(stats.busy_workers, 0);
}

#[tokio::test]
async fn test_workers_are_reused() {
    let context = TestContext::with_delay(0);
    let pool = pool(&context, 4);
    for i in 0..5 {
        pool.run(WorkerFunction::OptimizeCss, vec![json!(i)]).await.unwrap();
    }
    assert_eq!(pool.stats().peak_workers, 1);
}

#[tokio::test]
async fn test_function_failure_rejects_task() {
    let context = TestContext::with_delay(0);
    let pool = pool(&context, 1);
    let err = pool.dispatch("prepareModule", vec![json!("fail")]).unwrap().await.unwrap_err();
    match err {
        WorkerError::Task(descriptor) => {
            assert_eq!(descriptor.message, "requested failure");
            assert_eq!(descriptor.stack.as_deref(), Some("at run"));
        }
        other => panic!("unexpected error: {other}"),
    }
    // the worker survives a reported failure
    assert_eq!(pool.stats().active_workers, 1);
    assert_eq!(pool.stats().crashed_workers, 0);
}

#[tokio::test]
async fn test_crash_rejects_task_and_pool_recovers() {
    let context = TestContext::with_delay(0);
    let pool = pool(&context, 2);

    pool.dispatch("transpile", vec![json!("warm")]).unwrap().await.unwrap();
    assert_eq!(pool.stats().active_workers, 1);

    let err = pool.dispatch("transpile", vec![json!("crash")]).unwrap().await.unwrap_err();
    assert!(matches!(err, WorkerError::WorkerCrashed { .. }));
    let stats = pool.stats();
    assert_eq!(stats.active_workers, 0);
    assert_eq!(stats.crashed_workers, 1);

    let value = pool.dispatch("transpile", vec![json!("after")]).unwrap().await.unwrap();
    assert_eq!(value, json!("after"));
    assert_eq!(pool.stats().active_workers, 1);
}

#[tokio::test]
async fn test_crash_spawns_replacement_for_queue() {
    let context = TestContext::with_delay(20);
    let pool = pool(&context, 1);

    let crash = pool.dispatch("transpile", vec![json!("crash")]).unwrap();
    let queued = pool.dispatch("transpile", vec![json!("queued")]).unwrap();

    assert!(matches!(crash.await, Err(WorkerError::WorkerCrashed { .. })));
    assert_eq!(queued.await.unwrap(), json!("queued"));
    assert_eq!(pool.stats().crashed_workers, 1);
}

#[tokio::test]
async fn test_destroy_cancels_everything() {
    let context = TestContext::with_delay(200);
    let pool = pool(&context, 1);

    let running = pool.dispatch("transpile", vec![json!(1)]).unwrap();
    let queued = pool.dispatch("transpile", vec![json!(2)]).unwrap();
    pool.destroy();
    pool.destroy();

    assert!(matches!(running.await, Err(WorkerError::Cancelled)));
    assert!(matches!(queued.await, Err(WorkerError::Cancelled)));
    assert!(pool.is_destroyed());

    let late = pool.dispatch("transpile", vec![json!(3)]).unwrap();
    assert!(matches!(late.await, Err(WorkerError::Cancelled)));
    assert_eq!(pool.stats().active_workers, 0);
}

#[test]
fn test_blocking_wait() {
    let context = TestContext::with_delay(0);
    let pool = pool(&context, 1);
    let value = pool.dispatch("prerenderWorker", vec![json!({"url": "/"})]).unwrap().wait();
    assert_eq!(value.unwrap(), json!({"url": "/"}));
}
