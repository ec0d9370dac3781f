//! Filesystem adapter
//!
//! Wraps an [`FsBackend`] and normalizes it into the compiler system contract:
//!
//! - reads and queries never fail; they return `false`, `None` or an empty
//!   vector when the target is missing or unreadable
//! - mutations never fail either; the error lands in the result's `error`
//!   field and every list field is left empty
//!
//! All paths going in are resolved against the adapter's working directory,
//! and all paths coming out are absolute with forward slashes.

mod backend;
mod memory;
mod native;

use std::io;
use std::sync::Arc;

use kiln_path::PathUtils;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

pub use backend::{
    FsBackend, FsStat, NativeEvent, NativeEventKind, NativeEventSender, WatchSubscription,
};
pub use memory::MemoryFs;
pub use native::NativeFs;
pub(crate) use native::path_to_string;

/// A failed filesystem mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} {path}: {message}")]
pub struct FsError {
    /// Operation name (`mkdir`, `rename`, ...)
    pub operation: &'static str,
    /// Path the failure refers to
    pub path: String,
    /// Underlying error kind
    pub kind: io::ErrorKind,
    /// Human readable cause
    pub message: String,
}

impl FsError {
    /// Build from an I/O error.
    pub fn new(operation: &'static str, path: impl Into<String>, err: &io::Error) -> Self {
        Self {
            operation,
            path: path.into(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// The background task running the operation did not complete.
    pub fn background(operation: &'static str, path: impl Into<String>) -> Self {
        Self {
            operation,
            path: path.into(),
            kind: io::ErrorKind::Other,
            message: "background task failed".to_string(),
        }
    }
}

impl Serialize for FsError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Options for [`FsAdapter::mkdir`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MkdirOptions {
    /// Create missing ancestors as well
    pub recursive: bool,
}

/// Options for [`FsAdapter::rmdir`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RmdirOptions {
    /// Remove contents as well
    pub recursive: bool,
}

/// Result of [`FsAdapter::mkdir`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MkdirResult {
    /// Normalized target
    pub path: String,
    /// Final component of `path`
    pub basename: String,
    /// Parent of `path`
    pub dirname: String,
    /// Directories created, outermost first
    pub new_dirs: Vec<String>,
    /// Set iff the operation failed
    pub error: Option<FsError>,
}

/// Result of [`FsAdapter::rmdir`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RmdirResult {
    /// Normalized target
    pub path: String,
    /// Final component of `path`
    pub basename: String,
    /// Parent of `path`
    pub dirname: String,
    /// Directories removed, deepest first
    pub removed_dirs: Vec<String>,
    /// Files removed
    pub removed_files: Vec<String>,
    /// Set iff the operation failed
    pub error: Option<FsError>,
}

/// Result of [`FsAdapter::rename`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameResult {
    /// Normalized source
    pub old_path: String,
    /// Normalized destination
    pub new_path: String,
    /// Source was a file
    pub is_file: bool,
    /// Source was a directory
    pub is_directory: bool,
    /// Directories that no longer exist under the old name
    pub old_dirs: Vec<String>,
    /// Files that no longer exist under the old name
    pub old_files: Vec<String>,
    /// Directories that now exist under the new name
    pub new_dirs: Vec<String>,
    /// Files that now exist under the new name
    pub new_files: Vec<String>,
    /// `(old, new)` pairs for every moved entry
    pub renamed: Vec<(String, String)>,
    /// Set iff the operation failed
    pub error: Option<FsError>,
}

/// Result of [`FsAdapter::unlink`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlinkResult {
    /// Normalized target
    pub path: String,
    /// Final component of `path`
    pub basename: String,
    /// Parent of `path`
    pub dirname: String,
    /// Set iff the operation failed
    pub error: Option<FsError>,
}

/// Result of [`FsAdapter::write_file`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteFileResult {
    /// Normalized target
    pub path: String,
    /// Set iff the operation failed
    pub error: Option<FsError>,
}

/// Result of [`FsAdapter::copy_file`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyFileResult {
    /// Normalized source
    pub src: String,
    /// Normalized destination
    pub dst: String,
    /// Set iff the operation failed
    pub error: Option<FsError>,
}

/// Sentinel-returning, result-carrying view over a backend.
#[derive(Debug, Clone)]
pub struct FsAdapter {
    backend: Arc<dyn FsBackend>,
    paths: PathUtils,
}

impl FsAdapter {
    /// Wrap `backend`, resolving relative inputs with `paths`.
    pub fn new(backend: Arc<dyn FsBackend>, paths: PathUtils) -> Self {
        Self { backend, paths }
    }

    /// The wrapped backend.
    pub fn backend(&self) -> &Arc<dyn FsBackend> {
        &self.backend
    }

    /// Path utilities used to resolve inputs.
    pub fn paths(&self) -> &PathUtils {
        &self.paths
    }

    /// Absolute, forward-slash form of `path`.
    pub fn resolve(&self, path: &str) -> String {
        self.paths.resolve(&[path])
    }

    /// Whether `path` exists.
    pub fn access(&self, path: &str) -> bool {
        self.backend.stat(&self.resolve(path)).is_ok()
    }

    /// Status of `path`, or `None` if it cannot be read.
    pub fn stat(&self, path: &str) -> Option<FsStat> {
        self.backend.stat(&self.resolve(path)).ok()
    }

    /// Whether `path` is a symlink.
    pub fn is_symbolic_link(&self, path: &str) -> bool {
        self.stat(path).is_some_and(|st| st.is_symbolic_link)
    }

    /// UTF-8 contents of a file, or `None`.
    pub fn read_file(&self, path: &str) -> Option<String> {
        let bytes = self.backend.read(&self.resolve(path)).ok()?;
        String::from_utf8(bytes).ok()
    }

    /// Full paths of the children of a directory, sorted.
    pub fn readdir(&self, path: &str) -> Vec<String> {
        let dir = self.resolve(path);
        let mut entries: Vec<String> = match self.backend.read_dir(&dir) {
            Ok(names) => names
                .iter()
                .map(|name| self.paths.join(&[dir.as_str(), name.as_str()]))
                .collect(),
            Err(_) => return Vec::new(),
        };
        entries.sort();
        entries
    }

    /// Canonical form of `path`, or `None` if it does not exist.
    pub fn realpath(&self, path: &str) -> Option<String> {
        self.backend.canonicalize(&self.resolve(path)).ok()
    }

    /// Create a directory.
    pub fn mkdir(&self, path: &str, opts: MkdirOptions) -> MkdirResult {
        let target = self.resolve(path);
        let mut result = MkdirResult {
            basename: self.paths.basename(&target),
            dirname: self.paths.dirname(&target),
            path: target.clone(),
            ..MkdirResult::default()
        };

        if !opts.recursive {
            match self.backend.create_dir(&target) {
                Ok(()) => result.new_dirs.push(target),
                Err(err) => result.error = Some(FsError::new("mkdir", target, &err)),
            }
            return result;
        }

        // collect missing ancestors, innermost first
        let mut missing = Vec::new();
        let mut current = target.clone();
        loop {
            match self.backend.stat(&current) {
                Ok(st) if st.is_directory => break,
                Ok(_) => {
                    let err = io::Error::new(io::ErrorKind::NotADirectory, "not a directory");
                    result.error = Some(FsError::new("mkdir", current, &err));
                    return result;
                }
                Err(_) => {
                    let parent = self.paths.dirname(&current);
                    let at_root = parent == current;
                    missing.push(std::mem::replace(&mut current, parent));
                    if at_root {
                        break;
                    }
                }
            }
        }

        let mut created: Vec<String> = Vec::with_capacity(missing.len());
        for dir in missing.into_iter().rev() {
            if let Err(err) = self.backend.create_dir(&dir) {
                for done in created.iter().rev() {
                    if let Err(undo) = self.backend.remove_dir(done) {
                        debug!(path = %done, error = %undo, "mkdir rollback failed");
                    }
                }
                result.error = Some(FsError::new("mkdir", dir, &err));
                return result;
            }
            created.push(dir);
        }
        result.new_dirs = created;
        result
    }

    /// Remove a directory.
    pub fn rmdir(&self, path: &str, opts: RmdirOptions) -> RmdirResult {
        let target = self.resolve(path);
        let mut result = RmdirResult {
            basename: self.paths.basename(&target),
            dirname: self.paths.dirname(&target),
            path: target.clone(),
            ..RmdirResult::default()
        };

        if !opts.recursive {
            match self.backend.remove_dir(&target) {
                Ok(()) => result.removed_dirs.push(target),
                Err(err) => result.error = Some(FsError::new("rmdir", target, &err)),
            }
            return result;
        }

        match self.backend.stat(&target) {
            Ok(st) if st.is_directory && !st.is_symbolic_link => {}
            Ok(_) => {
                let err = io::Error::new(io::ErrorKind::NotADirectory, "not a directory");
                result.error = Some(FsError::new("rmdir", target, &err));
                return result;
            }
            Err(err) => {
                result.error = Some(FsError::new("rmdir", target, &err));
                return result;
            }
        }

        let mut dirs = Vec::new();
        let mut files = Vec::new();
        if let Err(err) = self.walk(&target, &mut dirs, &mut files) {
            result.error = Some(FsError::new("rmdir", target, &err));
            return result;
        }

        for file in &files {
            if let Err(err) = self.backend.remove_file(file) {
                result.error = Some(FsError::new("rmdir", file.clone(), &err));
                return result;
            }
        }
        // walk lists parents before children
        for dir in dirs.iter().rev() {
            if let Err(err) = self.backend.remove_dir(dir) {
                result.error = Some(FsError::new("rmdir", dir.clone(), &err));
                return result;
            }
        }
        result.removed_dirs = dirs.into_iter().rev().collect();
        result.removed_files = files;
        result
    }

    /// Move a file or directory.
    pub fn rename(&self, old_path: &str, new_path: &str) -> RenameResult {
        let old_path = self.resolve(old_path);
        let new_path = self.resolve(new_path);
        let mut result = RenameResult {
            old_path: old_path.clone(),
            new_path: new_path.clone(),
            ..RenameResult::default()
        };

        let st = match self.backend.stat(&old_path) {
            Ok(st) => st,
            Err(err) => {
                result.error = Some(FsError::new("rename", old_path, &err));
                return result;
            }
        };
        result.is_file = st.is_file;
        result.is_directory = st.is_directory;

        let mut old_dirs = Vec::new();
        let mut old_files = Vec::new();
        if st.is_directory && !st.is_symbolic_link {
            if let Err(err) = self.walk(&old_path, &mut old_dirs, &mut old_files) {
                result.error = Some(FsError::new("rename", old_path, &err));
                return result;
            }
        } else {
            old_files.push(old_path.clone());
        }

        if let Err(err) = self.backend.rename(&old_path, &new_path) {
            result.error = Some(FsError::new("rename", old_path, &err));
            return result;
        }

        let moved = |p: &String| format!("{}{}", new_path, &p[old_path.len()..]);
        result.new_dirs = old_dirs.iter().map(moved).collect();
        result.new_files = old_files.iter().map(moved).collect();
        result.renamed = old_dirs
            .iter()
            .chain(&old_files)
            .map(|p| (p.clone(), moved(p)))
            .collect();
        result.old_dirs = old_dirs;
        result.old_files = old_files;
        result
    }

    /// Remove a file.
    pub fn unlink(&self, path: &str) -> UnlinkResult {
        let target = self.resolve(path);
        let error = self
            .backend
            .remove_file(&target)
            .err()
            .map(|err| FsError::new("unlink", target.clone(), &err));
        UnlinkResult {
            basename: self.paths.basename(&target),
            dirname: self.paths.dirname(&target),
            path: target,
            error,
        }
    }

    /// Create or overwrite a file.
    pub fn write_file(&self, path: &str, content: &str) -> WriteFileResult {
        let target = self.resolve(path);
        let error = self
            .backend
            .write(&target, content.as_bytes())
            .err()
            .map(|err| FsError::new("writeFile", target.clone(), &err));
        WriteFileResult {
            path: target,
            error,
        }
    }

    /// Copy a file.
    pub fn copy_file(&self, src: &str, dst: &str) -> CopyFileResult {
        let src = self.resolve(src);
        let dst = self.resolve(dst);
        let error = self
            .backend
            .copy(&src, &dst)
            .err()
            .map(|err| FsError::new("copyFile", src.clone(), &err));
        CopyFileResult { src, dst, error }
    }

    /// Collect `dir` and every directory and file below it.
    ///
    /// Directories are listed parents first. Symlinks are reported as files.
    fn walk(&self, dir: &str, dirs: &mut Vec<String>, files: &mut Vec<String>) -> io::Result<()> {
        dirs.push(dir.to_string());
        let mut names = self.backend.read_dir(dir)?;
        names.sort();
        for name in names {
            let child = self.paths.join(&[dir, name.as_str()]);
            let st = self.backend.stat(&child)?;
            if st.is_directory && !st.is_symbolic_link {
                self.walk(&child, dirs, files)?;
            } else {
                files.push(child);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> (MemoryFs, FsAdapter) {
        let backend = MemoryFs::new();
        let adapter = FsAdapter::new(Arc::new(backend.clone()), PathUtils::posix("/"));
        (backend, adapter)
    }

    #[test]
    fn test_missing_paths_are_sentinels() {
        let (_, fs) = memory();
        assert!(!fs.access("/nope"));
        assert!(fs.stat("/nope").is_none());
        assert!(fs.read_file("/nope").is_none());
        assert!(fs.readdir("/nope").is_empty());
        assert!(fs.realpath("/nope").is_none());
        assert!(!fs.is_symbolic_link("/nope"));
    }

    #[test]
    fn test_mkdir_recursive_reports_new_dirs() {
        let (_, fs) = memory();
        let result = fs.mkdir("/tmp/x/y", MkdirOptions { recursive: true });
        assert!(result.error.is_none());
        assert_eq!(result.new_dirs, vec!["/tmp", "/tmp/x", "/tmp/x/y"]);
        assert_eq!(result.basename, "y");
        assert_eq!(result.dirname, "/tmp/x");

        let again = fs.mkdir("/tmp/x/y", MkdirOptions { recursive: true });
        assert!(again.error.is_none());
        assert!(again.new_dirs.is_empty());
    }

    #[test]
    fn test_mkdir_errors_leave_no_trace() {
        let (backend, fs) = memory();
        fs.write_file("/file", "x");
        let before = backend.snapshot();

        let result = fs.mkdir("/file/sub/dir", MkdirOptions { recursive: true });
        assert_eq!(result.error.as_ref().map(|e| e.kind), Some(io::ErrorKind::NotADirectory));
        assert!(result.new_dirs.is_empty());

        let result = fs.mkdir("/a/b", MkdirOptions::default());
        assert_eq!(result.error.as_ref().map(|e| e.kind), Some(io::ErrorKind::NotFound));
        assert_eq!(backend.snapshot(), before);
    }

    /// Memory backend that refuses to create one directory.
    #[derive(Debug)]
    struct RefusingMkdir {
        inner: MemoryFs,
        refuse: &'static str,
    }

    impl FsBackend for RefusingMkdir {
        fn stat(&self, path: &str) -> io::Result<FsStat> {
            self.inner.stat(path)
        }
        fn read(&self, path: &str) -> io::Result<Vec<u8>> {
            self.inner.read(path)
        }
        fn write(&self, path: &str, content: &[u8]) -> io::Result<()> {
            self.inner.write(path, content)
        }
        fn create_dir(&self, path: &str) -> io::Result<()> {
            if path == self.refuse {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "refused"));
            }
            self.inner.create_dir(path)
        }
        fn remove_dir(&self, path: &str) -> io::Result<()> {
            self.inner.remove_dir(path)
        }
        fn remove_file(&self, path: &str) -> io::Result<()> {
            self.inner.remove_file(path)
        }
        fn rename(&self, from: &str, to: &str) -> io::Result<()> {
            self.inner.rename(from, to)
        }
        fn copy(&self, from: &str, to: &str) -> io::Result<u64> {
            self.inner.copy(from, to)
        }
        fn read_dir(&self, path: &str) -> io::Result<Vec<String>> {
            self.inner.read_dir(path)
        }
        fn canonicalize(&self, path: &str) -> io::Result<String> {
            self.inner.canonicalize(path)
        }
        fn create_temp_dir(&self, prefix: &str) -> io::Result<String> {
            self.inner.create_temp_dir(prefix)
        }
        fn watch(
            &self,
            path: &str,
            recursive: bool,
            sink: NativeEventSender,
        ) -> io::Result<Box<dyn WatchSubscription>> {
            self.inner.watch(path, recursive, sink)
        }
    }

    #[test]
    fn test_recursive_mkdir_rolls_back_created_dirs() {
        let memory = MemoryFs::new();
        let backend = RefusingMkdir {
            inner: memory.clone(),
            refuse: "/a/b/c",
        };
        let fs = FsAdapter::new(Arc::new(backend), PathUtils::posix("/"));
        let before = memory.snapshot();

        let result = fs.mkdir("/a/b/c/d", MkdirOptions { recursive: true });
        assert_eq!(result.error.as_ref().map(|e| e.kind), Some(io::ErrorKind::PermissionDenied));
        assert_eq!(result.error.as_ref().map(|e| e.path.as_str()), Some("/a/b/c"));
        assert!(result.new_dirs.is_empty());
        assert_eq!(memory.snapshot(), before);
    }

    #[test]
    fn test_rmdir_recursive() {
        let (_, fs) = memory();
        fs.mkdir("/r/a/b", MkdirOptions { recursive: true });
        fs.write_file("/r/a/one.ts", "1");
        fs.write_file("/r/a/b/two.ts", "2");

        let result = fs.rmdir("/r", RmdirOptions { recursive: true });
        assert!(result.error.is_none());
        assert_eq!(result.removed_dirs, vec!["/r/a/b", "/r/a", "/r"]);
        assert_eq!(result.removed_files, vec!["/r/a/b/two.ts", "/r/a/one.ts"]);
        assert!(!fs.access("/r"));
    }

    #[test]
    fn test_rmdir_non_empty_fails() {
        let (backend, fs) = memory();
        fs.mkdir("/d", MkdirOptions::default());
        fs.write_file("/d/f", "x");
        let before = backend.snapshot();
        let result = fs.rmdir("/d", RmdirOptions::default());
        assert!(result.error.is_some());
        assert!(result.removed_dirs.is_empty());
        assert_eq!(backend.snapshot(), before);
    }

    #[test]
    fn test_rename_directory_lists_entries() {
        let (_, fs) = memory();
        fs.mkdir("/src/lib", MkdirOptions { recursive: true });
        fs.write_file("/src/lib/a.ts", "a");

        let result = fs.rename("/src", "/out");
        assert!(result.error.is_none());
        assert!(result.is_directory);
        assert_eq!(result.old_dirs, vec!["/src", "/src/lib"]);
        assert_eq!(result.new_dirs, vec!["/out", "/out/lib"]);
        assert_eq!(result.new_files, vec!["/out/lib/a.ts"]);
        assert!(result
            .renamed
            .contains(&("/src/lib/a.ts".to_string(), "/out/lib/a.ts".to_string())));
        assert_eq!(fs.read_file("/out/lib/a.ts").as_deref(), Some("a"));
    }

    #[test]
    fn test_rename_missing_source() {
        let (backend, fs) = memory();
        let before = backend.snapshot();
        let result = fs.rename("/missing", "/other");
        assert!(result.error.is_some());
        assert!(result.renamed.is_empty() && result.new_files.is_empty());
        assert_eq!(backend.snapshot(), before);
    }

    #[test]
    fn test_unlink_write_copy() {
        let (_, fs) = memory();
        assert!(fs.write_file("/a.txt", "hello").error.is_none());
        let copied = fs.copy_file("/a.txt", "/b.txt");
        assert!(copied.error.is_none());
        assert_eq!(fs.read_file("/b.txt").as_deref(), Some("hello"));

        let removed = fs.unlink("/a.txt");
        assert!(removed.error.is_none());
        assert_eq!(removed.basename, "a.txt");
        assert_eq!(removed.dirname, "/");
        assert!(fs.unlink("/a.txt").error.is_some());
        assert!(fs.write_file("/no/such/dir.txt", "").error.is_some());
    }

    #[test]
    fn test_readdir_full_sorted_paths() {
        let (_, fs) = memory();
        fs.write_file("/b.ts", "");
        fs.write_file("/a.ts", "");
        fs.mkdir("/c", MkdirOptions::default());
        assert_eq!(fs.readdir("/"), vec!["/a.ts", "/b.ts", "/c"]);
    }

    #[test]
    fn test_relative_inputs_resolve_against_cwd() {
        let backend = MemoryFs::new();
        let fs = FsAdapter::new(Arc::new(backend), PathUtils::posix("/work"));
        let result = fs.mkdir("out", MkdirOptions { recursive: true });
        assert_eq!(result.path, "/work/out");
        assert_eq!(result.new_dirs, vec!["/work", "/work/out"]);
    }
}
