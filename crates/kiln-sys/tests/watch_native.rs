//! Native directory watching through the compiler system

use std::sync::Arc;
use std::time::{Duration, Instant};

use kiln_sys::{CompilerSystem, FsEventKind, HostKind};
use parking_lot::Mutex;

type Seen = Arc<Mutex<Vec<(String, FsEventKind)>>>;

fn adds_for(seen: &Seen, suffix: &str) -> usize {
    seen.lock()
        .iter()
        .filter(|(path, kind)| kind.is_add() && path.ends_with(suffix))
        .count()
}

async fn wait_for(seen: &Seen, suffix: &str) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while adds_for(seen, suffix) == 0 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_recursive_watch_reports_one_add() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    let sys = CompilerSystem::builder(HostKind::Native)
        .cwd(root.to_string_lossy().replace('\\', "/"))
        .build()
        .unwrap();
    let cwd = sys.get_current_directory();

    let from_callback: Seen = Arc::default();
    let from_bus: Seen = Arc::default();
    let sink = from_callback.clone();
    let bus_sink = from_bus.clone();
    sys.events()
        .on_any(move |event| bus_sink.lock().push((event.path.clone(), event.kind)));

    let watcher = sys
        .watch_directory(&cwd, move |path, kind| sink.lock().push((path.to_string(), kind)), true)
        .unwrap();
    assert!(watcher.is_recursive());

    std::fs::create_dir(root.join("a")).unwrap();
    wait_for(&from_callback, "/a").await;
    // give the backend time to watch the new subdirectory
    tokio::time::sleep(Duration::from_millis(300)).await;

    std::fs::write(root.join("a").join("b.ts"), "export {}").unwrap();
    wait_for(&from_callback, "a/b.ts").await;
    wait_for(&from_bus, "a/b.ts").await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(adds_for(&from_callback, "a/b.ts"), 1);
    assert_eq!(adds_for(&from_bus, "a/b.ts"), 1);
    assert!(from_callback.lock().iter().all(|(path, _)| !path.contains('\\')));

    sys.destroy().await;
    assert!(watcher.is_closed());

    let before = from_callback.lock().len();
    std::fs::write(root.join("a").join("c.ts"), "export {}").unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(from_callback.lock().len(), before);
}

#[tokio::test]
async fn test_watch_missing_path_fails() {
    let dir = tempfile::tempdir().unwrap();
    let sys = CompilerSystem::builder(HostKind::Native)
        .cwd(dir.path().to_string_lossy().replace('\\', "/"))
        .build()
        .unwrap();
    let err = sys.watch_file("does-not-exist.ts", |_, _| {}).unwrap_err();
    assert_eq!(err.operation, "watch");
    sys.destroy().await;
}

#[tokio::test]
async fn test_native_tmpdir_removed_on_destroy() {
    let sys = CompilerSystem::builder(HostKind::Native).build().unwrap();
    let tmp = sys.tmpdir().unwrap();
    assert_eq!(sys.tmpdir().unwrap(), tmp);
    assert!(sys.write_file(&format!("{tmp}/cache.json"), "{}").await.error.is_none());

    sys.destroy().await;
    assert!(!sys.access(&tmp).await);
}
