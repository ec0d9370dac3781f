//! Child-process workers speaking the line protocol

use std::sync::Arc;

use kiln_sys::worker::{ProcessSpawner, WorkerError, WorkerPoolController};
use serde_json::json;

fn worker_pool(max: usize) -> WorkerPoolController {
    let spawner = ProcessSpawner::new(env!("CARGO_BIN_EXE_kiln-worker"), Vec::new());
    WorkerPoolController::new(max, Arc::new(spawner)).unwrap()
}

#[tokio::test]
async fn test_round_trip_through_child_process() {
    let pool = worker_pool(2);
    let a = pool.dispatch("transpile", vec![json!("export const a = 1;")]).unwrap();
    let b = pool.dispatch("optimizeCss", vec![json!({"css": "a{}"})]).unwrap();

    for (pending, name) in [(a, "transpile"), (b, "optimizeCss")] {
        match pending.await {
            Err(WorkerError::Task(descriptor)) => {
                assert_eq!(descriptor.message, format!("no worker context configured for {name}"))
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
    assert_eq!(pool.stats().completed_tasks, 2);
    assert_eq!(pool.stats().crashed_workers, 0);
    pool.destroy();
}

#[tokio::test]
async fn test_missing_program_fails_task() {
    let spawner = ProcessSpawner::new("/nonexistent/kiln-worker", Vec::new());
    let pool = WorkerPoolController::new(1, Arc::new(spawner)).unwrap();
    let err = pool.dispatch("transpile", vec![]).unwrap().await.unwrap_err();
    assert!(matches!(err, WorkerError::Spawn(_)));
    assert_eq!(pool.stats().active_workers, 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_exiting_process_counts_as_crash() {
    // reads one task, then dies without answering
    let spawner = ProcessSpawner::new(
        "sh",
        vec!["-c".to_string(), "read line; exit 1".to_string()],
    );
    let pool = WorkerPoolController::new(1, Arc::new(spawner)).unwrap();

    let err = pool.dispatch("transpile", vec![json!("x")]).unwrap().await.unwrap_err();
    assert!(matches!(err, WorkerError::WorkerCrashed { .. }));
    assert_eq!(pool.stats().active_workers, 0);
    assert_eq!(pool.stats().crashed_workers, 1);
}
