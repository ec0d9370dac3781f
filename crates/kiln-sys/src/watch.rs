//! Filesystem watchers
//!
//! A watcher owns one backend subscription and one consumption thread. Raw
//! events are mapped to the fixed [`FsEventKind`] vocabulary, handed to the
//! caller's callback and then published on the system [`EventBus`].
//!
//! Delivery holds a reentrant gate, and [`FsWatcher::close`] takes the same
//! gate before marking the watcher closed, so once `close` returns no further
//! callback runs for that watcher.

use std::cell::Cell;
use std::sync::{Arc, Weak};
use std::thread;

use crossbeam::channel::{unbounded, Receiver};
use parking_lot::{Mutex, ReentrantMutex};
use tracing::{debug, warn};

use crate::destroy::{self, DestroyCallback, DestroyRegistry};
use crate::events::{EventBus, FsEvent, FsEventKind};
use crate::fs::{FsBackend, FsError, NativeEvent, NativeEventKind, WatchSubscription};

/// Callback invoked with the normalized path and event kind.
pub type WatchCallback = Arc<dyn Fn(&str, FsEventKind) + Send + Sync>;

/// What a watcher was opened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKind {
    /// A single file
    File,
    /// A directory (optionally recursive)
    Directory,
}

impl WatchKind {
    /// Map a raw event kind to the vocabulary of this watch kind.
    pub fn normalize(self, kind: NativeEventKind) -> FsEventKind {
        match (self, kind) {
            (WatchKind::File, NativeEventKind::Create) => FsEventKind::FileAdd,
            (WatchKind::File, NativeEventKind::Modify) => FsEventKind::FileUpdate,
            (WatchKind::File, NativeEventKind::Remove) => FsEventKind::FileDelete,
            (WatchKind::Directory, NativeEventKind::Create) => FsEventKind::DirAdd,
            (WatchKind::Directory, NativeEventKind::Modify) => FsEventKind::FileUpdate,
            (WatchKind::Directory, NativeEventKind::Remove) => FsEventKind::DirDelete,
        }
    }
}

struct WatcherInner {
    path: String,
    recursive: bool,
    kind: WatchKind,
    callback: WatchCallback,
    bus: Arc<EventBus>,
    /// Closed flag; held for the whole of each delivery
    gate: ReentrantMutex<Cell<bool>>,
    subscription: Mutex<Option<Box<dyn WatchSubscription>>>,
    registration: Mutex<Option<(Weak<DestroyRegistry>, DestroyCallback)>>,
}

impl WatcherInner {
    fn deliver(&self, event: NativeEvent) {
        let gate = self.gate.lock();
        if gate.get() {
            return;
        }
        let kind = self.kind.normalize(event.kind);
        for path in event.paths {
            (self.callback)(&path, kind);
            self.bus.emit(&FsEvent { path, kind });
        }
    }

    fn report_error(&self, message: &str) {
        if self.gate.lock().get() {
            // teardown race after close() was requested
            debug!(path = %self.path, error = message, "watch error after close ignored");
        } else {
            warn!(path = %self.path, error = message, "watch error");
        }
    }

    fn close(&self) {
        {
            let gate = self.gate.lock();
            if gate.replace(true) {
                return;
            }
        }
        if let Some(subscription) = self.subscription.lock().take() {
            if let Err(err) = subscription.unsubscribe() {
                debug!(path = %self.path, error = %err, "unsubscribe failed during close");
            }
        }
        if let Some((registry, callback)) = self.registration.lock().take() {
            if let Some(registry) = registry.upgrade() {
                registry.remove(&callback);
            }
        }
        debug!(path = %self.path, "watcher closed");
    }

    fn consume(self: Arc<Self>, rx: Receiver<Result<NativeEvent, String>>) {
        // ends once the subscription (and with it every sender) is dropped
        for message in rx {
            match message {
                Ok(event) => self.deliver(event),
                Err(err) => self.report_error(&err),
            }
        }
    }
}

/// Handle to an open filesystem subscription.
///
/// Cloning yields another handle to the same watcher. The watcher keeps
/// running until [`FsWatcher::close`] or the owning registry is destroyed.
#[derive(Clone)]
pub struct FsWatcher {
    inner: Arc<WatcherInner>,
}

impl FsWatcher {
    /// Open a subscription on `path` and start delivering events.
    ///
    /// `path` must already be absolute and normalized.
    pub fn start(
        backend: &Arc<dyn FsBackend>,
        path: String,
        kind: WatchKind,
        recursive: bool,
        callback: WatchCallback,
        bus: Arc<EventBus>,
        registry: &Arc<DestroyRegistry>,
    ) -> Result<Self, FsError> {
        let (tx, rx) = unbounded();
        let subscription = backend
            .watch(&path, recursive, tx)
            .map_err(|err| FsError::new("watch", path.clone(), &err))?;

        let inner = Arc::new(WatcherInner {
            path: path.clone(),
            recursive,
            kind,
            callback,
            bus,
            gate: ReentrantMutex::new(Cell::new(false)),
            subscription: Mutex::new(Some(subscription)),
            registration: Mutex::new(None),
        });

        let consumer = inner.clone();
        let spawned = thread::Builder::new()
            .name("kiln-watch".to_string())
            .spawn(move || consumer.consume(rx));
        if let Err(err) = spawned {
            inner.close();
            return Err(FsError::new("watch", path, &err));
        }

        let weak = Arc::downgrade(&inner);
        let on_destroy = destroy::callback(move || {
            if let Some(inner) = weak.upgrade() {
                inner.close();
            }
            Ok(())
        });
        registry.add(on_destroy.clone());
        *inner.registration.lock() = Some((Arc::downgrade(registry), on_destroy));

        debug!(path = %path, recursive, ?kind, "watcher started");
        Ok(Self { inner })
    }

    /// Watched path.
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    /// Whether subdirectories are watched too.
    pub fn is_recursive(&self) -> bool {
        self.inner.recursive
    }

    /// File or directory watch.
    pub fn kind(&self) -> WatchKind {
        self.inner.kind
    }

    /// Whether [`FsWatcher::close`] has run.
    pub fn is_closed(&self) -> bool {
        self.inner.gate.lock().get()
    }

    /// Stop the subscription. Idempotent.
    pub fn close(&self) {
        self.inner.close();
    }
}

impl std::fmt::Debug for FsWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsWatcher")
            .field("path", &self.inner.path)
            .field("recursive", &self.inner.recursive)
            .field("kind", &self.inner.kind)
            .field("closed", &self.is_closed())
            .finish()
    }
}
