//! Filesystem change events and the shared event bus

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::handles::HandleRegistry;

/// Normalized filesystem change kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FsEventKind {
    /// A file appeared
    FileAdd,
    /// A file (or something under a watched directory) changed
    FileUpdate,
    /// A file disappeared
    FileDelete,
    /// Something appeared under a watched directory
    DirAdd,
    /// Something disappeared under a watched directory
    DirDelete,
}

impl FsEventKind {
    /// Event name as seen by subscribers.
    pub fn as_str(self) -> &'static str {
        match self {
            FsEventKind::FileAdd => "fileAdd",
            FsEventKind::FileUpdate => "fileUpdate",
            FsEventKind::FileDelete => "fileDelete",
            FsEventKind::DirAdd => "dirAdd",
            FsEventKind::DirDelete => "dirDelete",
        }
    }

    /// Whether this kind reports a new entry.
    pub fn is_add(self) -> bool {
        matches!(self, FsEventKind::FileAdd | FsEventKind::DirAdd)
    }
}

impl fmt::Display for FsEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    /// Forward-slash absolute path
    pub path: String,
    /// What happened
    pub kind: FsEventKind,
}

type Listener = Arc<dyn Fn(&FsEvent) + Send + Sync>;

#[derive(Clone)]
struct Subscription {
    kind: Option<FsEventKind>,
    listener: Listener,
}

/// Publish/subscribe bus owned by one [`CompilerSystem`](crate::CompilerSystem).
///
/// Listeners are invoked on the publishing thread, in subscription order,
/// outside of any internal lock.
#[derive(Default)]
pub struct EventBus {
    subscriptions: HandleRegistry<Subscription>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one event kind. Returns an id for [`EventBus::off`].
    pub fn on<F>(&self, kind: FsEventKind, listener: F) -> u64
    where
        F: Fn(&FsEvent) + Send + Sync + 'static,
    {
        self.subscriptions.insert(Subscription {
            kind: Some(kind),
            listener: Arc::new(listener),
        })
    }

    /// Subscribe to every event kind.
    pub fn on_any<F>(&self, listener: F) -> u64
    where
        F: Fn(&FsEvent) + Send + Sync + 'static,
    {
        self.subscriptions.insert(Subscription {
            kind: None,
            listener: Arc::new(listener),
        })
    }

    /// Unsubscribe. Returns false if the id was unknown.
    pub fn off(&self, id: u64) -> bool {
        self.subscriptions.remove(id).is_some()
    }

    /// Publish an event to every matching listener.
    pub fn emit(&self, event: &FsEvent) {
        for (_, sub) in self.subscriptions.snapshot() {
            if sub.kind.map_or(true, |kind| kind == event.kind) {
                (sub.listener)(event);
            }
        }
    }

    /// Number of subscriptions.
    pub fn listener_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Drop every subscription.
    pub fn clear(&self) {
        self.subscriptions.drain();
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn event(path: &str, kind: FsEventKind) -> FsEvent {
        FsEvent {
            path: path.to_string(),
            kind,
        }
    }

    #[test]
    fn test_kind_filtering() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.on(FsEventKind::FileAdd, move |e| sink.lock().push(e.path.clone()));

        bus.emit(&event("/a", FsEventKind::FileAdd));
        bus.emit(&event("/b", FsEventKind::FileDelete));
        assert_eq!(*seen.lock(), vec!["/a".to_string()]);
    }

    #[test]
    fn test_off_and_reentrant_subscribe() {
        let bus = Arc::new(EventBus::new());
        let inner = bus.clone();
        let id = bus.on_any(move |_| {
            inner.on_any(|_| {});
        });
        bus.emit(&event("/x", FsEventKind::DirAdd));
        assert_eq!(bus.listener_count(), 2);
        assert!(bus.off(id));
        assert!(!bus.off(id));
        bus.clear();
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn test_event_names() {
        assert_eq!(FsEventKind::FileUpdate.to_string(), "fileUpdate");
        assert_eq!(FsEventKind::DirDelete.as_str(), "dirDelete");
        assert!(FsEventKind::DirAdd.is_add());
        assert!(!FsEventKind::FileUpdate.is_add());
    }
}
