//! Backend seam between the adapter and a concrete filesystem

use std::fmt;
use std::io;

use crossbeam::channel::Sender;
use serde::Serialize;

/// Normalized file status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FsStat {
    /// Regular file (after following a symlink)
    pub is_file: bool,
    /// Directory (after following a symlink)
    pub is_directory: bool,
    /// The path itself is a symlink
    pub is_symbolic_link: bool,
    /// Size in bytes
    pub size: u64,
}

/// Raw change kinds produced by a backend before normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeEventKind {
    /// Entry created
    Create,
    /// Entry contents or metadata changed
    Modify,
    /// Entry removed
    Remove,
}

/// One raw change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeEvent {
    /// What happened
    pub kind: NativeEventKind,
    /// Affected paths, forward-slash separated
    pub paths: Vec<String>,
}

/// Channel a backend pushes raw events (or watcher errors) into.
pub type NativeEventSender = Sender<Result<NativeEvent, String>>;

/// An open change subscription.
pub trait WatchSubscription: Send {
    /// Stop the subscription. No events are sent after this returns.
    fn unsubscribe(self: Box<Self>) -> io::Result<()>;
}

/// Filesystem primitives the [`FsAdapter`](super::FsAdapter) is built on.
///
/// Paths are absolute and forward-slash separated. Implementations report
/// failures as `io::Error` and never panic.
pub trait FsBackend: Send + Sync + fmt::Debug {
    /// Status of `path` without following a final symlink for the link flag.
    fn stat(&self, path: &str) -> io::Result<FsStat>;

    /// Read a whole file.
    fn read(&self, path: &str) -> io::Result<Vec<u8>>;

    /// Create or truncate a file. The parent must exist.
    fn write(&self, path: &str, content: &[u8]) -> io::Result<()>;

    /// Create one directory. The parent must exist.
    fn create_dir(&self, path: &str) -> io::Result<()>;

    /// Remove one empty directory.
    fn remove_dir(&self, path: &str) -> io::Result<()>;

    /// Remove one file.
    fn remove_file(&self, path: &str) -> io::Result<()>;

    /// Move a file or directory.
    fn rename(&self, from: &str, to: &str) -> io::Result<()>;

    /// Copy a file, returning the bytes copied.
    fn copy(&self, from: &str, to: &str) -> io::Result<u64>;

    /// Names of the direct children of a directory.
    fn read_dir(&self, path: &str) -> io::Result<Vec<String>>;

    /// Resolve symlinks and relative segments.
    fn canonicalize(&self, path: &str) -> io::Result<String>;

    /// Create a fresh temporary directory and return its path.
    fn create_temp_dir(&self, prefix: &str) -> io::Result<String>;

    /// Subscribe to changes of `path` (and below it when `recursive`).
    fn watch(
        &self,
        path: &str,
        recursive: bool,
        sink: NativeEventSender,
    ) -> io::Result<Box<dyn WatchSubscription>>;
}
