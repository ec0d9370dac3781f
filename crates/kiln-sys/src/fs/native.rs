//! Native filesystem backend
//!
//! `std::fs` for file operations and the `notify` crate (v7) for change
//! notification.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use kiln_path::normalize_slashes;
use notify::{recommended_watcher, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tempfile::TempDir;

use super::backend::{
    FsBackend, FsStat, NativeEvent, NativeEventKind, NativeEventSender, WatchSubscription,
};

/// Backend over the real filesystem.
#[derive(Debug, Default)]
pub struct NativeFs {
    /// Temp directories created for this backend, removed on drop
    temp_dirs: Mutex<Vec<TempDir>>,
}

impl NativeFs {
    /// Create a native backend.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Render a native path with forward slashes and without the verbatim prefix.
pub(crate) fn path_to_string(path: &Path) -> String {
    let slashed = normalize_slashes(&path.to_string_lossy());
    match slashed.strip_prefix("//?/") {
        Some(stripped) => stripped.to_string(),
        None => slashed,
    }
}

fn notify_error(err: notify::Error) -> io::Error {
    match err.kind {
        notify::ErrorKind::Io(io_err) => io_err,
        notify::ErrorKind::PathNotFound => io::Error::new(io::ErrorKind::NotFound, "path not found"),
        _ => io::Error::other(err.to_string()),
    }
}

impl FsBackend for NativeFs {
    fn stat(&self, path: &str) -> io::Result<FsStat> {
        let link = fs::symlink_metadata(path)?;
        let is_symbolic_link = link.file_type().is_symlink();
        let target = if is_symbolic_link {
            fs::metadata(path).ok()
        } else {
            Some(link.clone())
        };
        Ok(match target {
            Some(meta) => FsStat {
                is_file: meta.is_file(),
                is_directory: meta.is_dir(),
                is_symbolic_link,
                size: meta.len(),
            },
            // dangling symlink
            None => FsStat {
                is_symbolic_link,
                size: link.len(),
                ..FsStat::default()
            },
        })
    }

    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write(&self, path: &str, content: &[u8]) -> io::Result<()> {
        fs::write(path, content)
    }

    fn create_dir(&self, path: &str) -> io::Result<()> {
        fs::create_dir(path)
    }

    fn remove_dir(&self, path: &str) -> io::Result<()> {
        fs::remove_dir(path)
    }

    fn remove_file(&self, path: &str) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn copy(&self, from: &str, to: &str) -> io::Result<u64> {
        fs::copy(from, to)
    }

    fn read_dir(&self, path: &str) -> io::Result<Vec<String>> {
        fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect()
    }

    fn canonicalize(&self, path: &str) -> io::Result<String> {
        fs::canonicalize(path).map(|p| path_to_string(&p))
    }

    fn create_temp_dir(&self, prefix: &str) -> io::Result<String> {
        let dir = tempfile::Builder::new().prefix(prefix).tempdir()?;
        let path = path_to_string(dir.path());
        self.temp_dirs.lock().push(dir);
        Ok(path)
    }

    fn watch(
        &self,
        path: &str,
        recursive: bool,
        sink: NativeEventSender,
    ) -> io::Result<Box<dyn WatchSubscription>> {
        let mut watcher = recommended_watcher(move |res: notify::Result<notify::Event>| {
            let message = match res {
                Ok(event) => {
                    let kind = match event.kind {
                        EventKind::Create(_) => NativeEventKind::Create,
                        EventKind::Modify(_) => NativeEventKind::Modify,
                        EventKind::Remove(_) => NativeEventKind::Remove,
                        _ => return,
                    };
                    Ok(NativeEvent {
                        kind,
                        paths: event.paths.iter().map(|p| path_to_string(p)).collect(),
                    })
                }
                Err(err) => Err(err.to_string()),
            };
            let _ = sink.send(message);
        })
        .map_err(notify_error)?;

        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        let target = PathBuf::from(path);
        watcher.watch(&target, mode).map_err(notify_error)?;

        Ok(Box::new(NotifySubscription {
            watcher,
            path: target,
        }))
    }
}

struct NotifySubscription {
    watcher: RecommendedWatcher,
    path: PathBuf,
}

impl WatchSubscription for NotifySubscription {
    fn unsubscribe(mut self: Box<Self>) -> io::Result<()> {
        // dropping the watcher stops delivery even if unwatch fails
        let path = std::mem::take(&mut self.path);
        self.watcher.unwatch(&path).map_err(notify_error)
    }
}
