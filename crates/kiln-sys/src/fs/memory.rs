//! In-memory filesystem backend
//!
//! Used on hosts without a real filesystem. The tree is a sorted map from
//! absolute path to node, rooted at `/`. Mutations feed the same raw event
//! stream a native watcher would, so watch normalization is shared.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

use super::backend::{
    FsBackend, FsStat, NativeEvent, NativeEventKind, NativeEventSender, WatchSubscription,
};

#[derive(Debug, Clone)]
enum Node {
    File(Vec<u8>),
    Dir,
}

#[derive(Debug)]
struct MemoryWatch {
    id: u64,
    path: String,
    recursive: bool,
    sink: NativeEventSender,
}

impl MemoryWatch {
    fn covers(&self, path: &str) -> bool {
        if path == self.path {
            return true;
        }
        let Some(rest) = under(path, &self.path) else {
            return false;
        };
        self.recursive || !rest.contains('/')
    }
}

#[derive(Debug)]
struct MemoryState {
    nodes: BTreeMap<String, Node>,
    watches: Vec<MemoryWatch>,
    next_watch: u64,
    next_temp: u64,
}

impl MemoryState {
    fn notify(&self, kind: NativeEventKind, path: &str) {
        for watch in self.watches.iter().filter(|w| w.covers(path)) {
            let _ = watch.sink.send(Ok(NativeEvent {
                kind,
                paths: vec![path.to_string()],
            }));
        }
    }

    fn parent_is_dir(&self, path: &str) -> io::Result<()> {
        let parent = parent(path).ok_or_else(|| invalid(path))?;
        match self.nodes.get(parent) {
            Some(Node::Dir) => Ok(()),
            Some(Node::File(_)) => Err(io::Error::new(io::ErrorKind::NotADirectory, parent.to_string())),
            None => Err(not_found(parent)),
        }
    }

    fn has_children(&self, path: &str) -> bool {
        self.descendants(path).next().is_some()
    }

    /// Every node strictly below `path`, in key order.
    fn descendants<'a>(&'a self, path: &str) -> impl Iterator<Item = (&'a String, &'a Node)> + 'a {
        // "/a-b" sorts between "/a" and "/a/x", so scan from the "/a/" prefix
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{path}/")
        };
        self.nodes
            .range(prefix.clone()..)
            .take_while(move |(key, _)| key.starts_with(&prefix))
            .filter(|(key, _)| key.as_str() != "/")
    }
}

/// Path of `child` relative to `dir`, if it lies strictly below it.
fn under<'a>(child: &'a str, dir: &str) -> Option<&'a str> {
    let rest = if dir == "/" {
        child.strip_prefix('/')?
    } else {
        child.strip_prefix(dir)?.strip_prefix('/')?
    };
    (!rest.is_empty()).then_some(rest)
}

fn parent(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

fn not_found(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("no such file or directory: {path}"))
}

fn invalid(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, format!("invalid path: {path}"))
}

/// Backend holding the whole tree in memory.
#[derive(Debug, Clone)]
pub struct MemoryFs {
    state: Arc<Mutex<MemoryState>>,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    /// Create a filesystem containing only `/`.
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::Dir);
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                nodes,
                watches: Vec::new(),
                next_watch: 1,
                next_temp: 1,
            })),
        }
    }

    /// All paths in the tree, sorted. Useful for before/after comparisons.
    pub fn snapshot(&self) -> Vec<(String, Option<Vec<u8>>)> {
        self.state
            .lock()
            .nodes
            .iter()
            .map(|(path, node)| {
                let content = match node {
                    Node::File(bytes) => Some(bytes.clone()),
                    Node::Dir => None,
                };
                (path.clone(), content)
            })
            .collect()
    }

    /// Number of open watch subscriptions.
    pub fn watch_count(&self) -> usize {
        self.state.lock().watches.len()
    }

    /// Report a watcher failure to every subscription covering `path`.
    pub fn fail_watches(&self, path: &str, message: &str) {
        let state = self.state.lock();
        for watch in state.watches.iter().filter(|w| w.covers(path)) {
            let _ = watch.sink.send(Err(message.to_string()));
        }
    }
}

impl FsBackend for MemoryFs {
    fn stat(&self, path: &str) -> io::Result<FsStat> {
        match self.state.lock().nodes.get(path) {
            Some(Node::File(bytes)) => Ok(FsStat {
                is_file: true,
                size: bytes.len() as u64,
                ..FsStat::default()
            }),
            Some(Node::Dir) => Ok(FsStat {
                is_directory: true,
                ..FsStat::default()
            }),
            None => Err(not_found(path)),
        }
    }

    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        match self.state.lock().nodes.get(path) {
            Some(Node::File(bytes)) => Ok(bytes.clone()),
            Some(Node::Dir) => Err(io::Error::new(io::ErrorKind::IsADirectory, path.to_string())),
            None => Err(not_found(path)),
        }
    }

    fn write(&self, path: &str, content: &[u8]) -> io::Result<()> {
        let mut state = self.state.lock();
        state.parent_is_dir(path)?;
        let kind = match state.nodes.get(path) {
            Some(Node::Dir) => {
                return Err(io::Error::new(io::ErrorKind::IsADirectory, path.to_string()))
            }
            Some(Node::File(_)) => NativeEventKind::Modify,
            None => NativeEventKind::Create,
        };
        state.nodes.insert(path.to_string(), Node::File(content.to_vec()));
        state.notify(kind, path);
        Ok(())
    }

    fn create_dir(&self, path: &str) -> io::Result<()> {
        let mut state = self.state.lock();
        if state.nodes.contains_key(path) {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, path.to_string()));
        }
        state.parent_is_dir(path)?;
        state.nodes.insert(path.to_string(), Node::Dir);
        state.notify(NativeEventKind::Create, path);
        Ok(())
    }

    fn remove_dir(&self, path: &str) -> io::Result<()> {
        let mut state = self.state.lock();
        match state.nodes.get(path) {
            Some(Node::Dir) if path == "/" => return Err(invalid(path)),
            Some(Node::Dir) => {}
            Some(Node::File(_)) => {
                return Err(io::Error::new(io::ErrorKind::NotADirectory, path.to_string()))
            }
            None => return Err(not_found(path)),
        }
        if state.has_children(path) {
            return Err(io::Error::new(io::ErrorKind::DirectoryNotEmpty, path.to_string()));
        }
        state.nodes.remove(path);
        state.notify(NativeEventKind::Remove, path);
        Ok(())
    }

    fn remove_file(&self, path: &str) -> io::Result<()> {
        let mut state = self.state.lock();
        match state.nodes.get(path) {
            Some(Node::File(_)) => {}
            Some(Node::Dir) => {
                return Err(io::Error::new(io::ErrorKind::IsADirectory, path.to_string()))
            }
            None => return Err(not_found(path)),
        }
        state.nodes.remove(path);
        state.notify(NativeEventKind::Remove, path);
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        let mut state = self.state.lock();
        let Some(node) = state.nodes.get(from).cloned() else {
            return Err(not_found(from));
        };
        if from == to {
            return Ok(());
        }
        if from == "/" || under(to, from).is_some() {
            return Err(invalid(to));
        }
        state.parent_is_dir(to)?;
        match (&node, state.nodes.get(to)) {
            (Node::Dir, Some(Node::File(_))) => {
                return Err(io::Error::new(io::ErrorKind::NotADirectory, to.to_string()))
            }
            (Node::File(_), Some(Node::Dir)) => {
                return Err(io::Error::new(io::ErrorKind::IsADirectory, to.to_string()))
            }
            (Node::Dir, Some(Node::Dir)) if state.has_children(to) => {
                return Err(io::Error::new(io::ErrorKind::DirectoryNotEmpty, to.to_string()))
            }
            _ => {}
        }

        let moved: Vec<(String, Node)> = state
            .descendants(from)
            .map(|(key, node)| (key.clone(), node.clone()))
            .collect();
        state.nodes.remove(from);
        state.nodes.insert(to.to_string(), node);
        for (key, node) in moved {
            state.nodes.remove(&key);
            let suffix = &key[from.len()..];
            state.nodes.insert(format!("{to}{suffix}"), node);
        }
        state.notify(NativeEventKind::Remove, from);
        state.notify(NativeEventKind::Create, to);
        Ok(())
    }

    fn copy(&self, from: &str, to: &str) -> io::Result<u64> {
        let mut state = self.state.lock();
        let bytes = match state.nodes.get(from) {
            Some(Node::File(bytes)) => bytes.clone(),
            Some(Node::Dir) => {
                return Err(io::Error::new(io::ErrorKind::IsADirectory, from.to_string()))
            }
            None => return Err(not_found(from)),
        };
        state.parent_is_dir(to)?;
        let kind = match state.nodes.get(to) {
            Some(Node::Dir) => {
                return Err(io::Error::new(io::ErrorKind::IsADirectory, to.to_string()))
            }
            Some(Node::File(_)) => NativeEventKind::Modify,
            None => NativeEventKind::Create,
        };
        let len = bytes.len() as u64;
        state.nodes.insert(to.to_string(), Node::File(bytes));
        state.notify(kind, to);
        Ok(len)
    }

    fn read_dir(&self, path: &str) -> io::Result<Vec<String>> {
        let state = self.state.lock();
        match state.nodes.get(path) {
            Some(Node::Dir) => {}
            Some(Node::File(_)) => {
                return Err(io::Error::new(io::ErrorKind::NotADirectory, path.to_string()))
            }
            None => return Err(not_found(path)),
        }
        Ok(state
            .descendants(path)
            .filter_map(|(key, _)| under(key, path))
            .filter(|rest| !rest.contains('/'))
            .map(str::to_string)
            .collect())
    }

    fn canonicalize(&self, path: &str) -> io::Result<String> {
        if self.state.lock().nodes.contains_key(path) {
            Ok(path.to_string())
        } else {
            Err(not_found(path))
        }
    }

    fn create_temp_dir(&self, prefix: &str) -> io::Result<String> {
        let mut state = self.state.lock();
        if !state.nodes.contains_key("/tmp") {
            state.nodes.insert("/tmp".to_string(), Node::Dir);
        }
        loop {
            let candidate = format!("/tmp/{prefix}{}", state.next_temp);
            state.next_temp += 1;
            if !state.nodes.contains_key(&candidate) {
                state.nodes.insert(candidate.clone(), Node::Dir);
                return Ok(candidate);
            }
        }
    }

    fn watch(
        &self,
        path: &str,
        recursive: bool,
        sink: NativeEventSender,
    ) -> io::Result<Box<dyn WatchSubscription>> {
        let mut state = self.state.lock();
        if !state.nodes.contains_key(path) {
            return Err(not_found(path));
        }
        let id = state.next_watch;
        state.next_watch += 1;
        state.watches.push(MemoryWatch {
            id,
            path: path.to_string(),
            recursive,
            sink,
        });
        Ok(Box::new(MemorySubscription {
            id,
            state: self.state.clone(),
        }))
    }
}

struct MemorySubscription {
    id: u64,
    state: Arc<Mutex<MemoryState>>,
}

impl WatchSubscription for MemorySubscription {
    fn unsubscribe(self: Box<Self>) -> io::Result<()> {
        let mut state = self.state.lock();
        let before = state.watches.len();
        state.watches.retain(|w| w.id != self.id);
        if state.watches.len() == before {
            return Err(io::Error::new(io::ErrorKind::NotFound, "watch already removed"));
        }
        Ok(())
    }
}
