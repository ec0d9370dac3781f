//! Platform-parameterized path operations

use crate::normalize::{normalize_slashes, root_length, split_reduced};

/// The components of a path, as returned by [`PathUtils::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedPath {
    /// Root (`/`, `c:/`, `//server/share/` or empty)
    pub root: String,
    /// Directory portion, empty when the path has no directory
    pub dir: String,
    /// Final component including its extension
    pub base: String,
    /// Extension including the leading dot, or empty
    pub ext: String,
    /// Final component without its extension
    pub name: String,
}

/// Path operations bound to a platform flavor and a working directory.
///
/// The Windows flavor accepts `\` as a separator, recognizes drive and UNC
/// roots and compares components case-insensitively. Both flavors emit `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathUtils {
    is_windows: bool,
    cwd: String,
}

impl PathUtils {
    /// Create path utilities for the given flavor and working directory.
    ///
    /// A relative `cwd` is anchored at the root.
    pub fn new(is_windows: bool, cwd: &str) -> Self {
        let mut utils = Self {
            is_windows,
            cwd: String::new(),
        };
        let cwd = utils.normalize(cwd);
        utils.cwd = if utils.is_absolute(&cwd) {
            cwd
        } else if cwd == "." {
            "/".to_string()
        } else {
            utils.normalize(&format!("/{cwd}"))
        };
        utils
    }

    /// POSIX flavor.
    pub fn posix(cwd: &str) -> Self {
        Self::new(false, cwd)
    }

    /// Windows flavor.
    pub fn windows(cwd: &str) -> Self {
        Self::new(true, cwd)
    }

    /// Whether this is the Windows flavor.
    pub fn is_windows(&self) -> bool {
        self.is_windows
    }

    /// The working directory relative paths are resolved against.
    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    /// Same flavor, different working directory.
    pub fn with_cwd(&self, cwd: &str) -> Self {
        Self::new(self.is_windows, cwd)
    }

    /// Native separator of the flavor (`\` or `/`).
    pub fn sep(&self) -> char {
        if self.is_windows { '\\' } else { '/' }
    }

    /// Search-path delimiter of the flavor (`;` or `:`).
    pub fn delimiter(&self) -> char {
        if self.is_windows { ';' } else { ':' }
    }

    fn slashes(&self, path: &str) -> String {
        if self.is_windows {
            normalize_slashes(path)
        } else {
            path.to_string()
        }
    }

    fn same_component(&self, a: &str, b: &str) -> bool {
        if self.is_windows {
            a.eq_ignore_ascii_case(b)
        } else {
            a == b
        }
    }

    fn drive(&self) -> Option<&str> {
        let bytes = self.cwd.as_bytes();
        if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
            Some(&self.cwd[..2])
        } else {
            None
        }
    }

    /// Whether `path` is absolute for this flavor.
    pub fn is_absolute(&self, path: &str) -> bool {
        let path = self.slashes(path);
        let len = root_length(&path, self.is_windows);
        // a bare drive ("c:") is drive-relative, not absolute
        len > 0 && !(self.is_windows && len == 2 && path.as_bytes()[1] == b':')
    }

    /// Reduce `.`/`..` segments and duplicate separators.
    ///
    /// Trailing separators are dropped; an empty result becomes `.`.
    pub fn normalize(&self, path: &str) -> String {
        let path = self.slashes(path);
        let (root, parts) = split_reduced(&path, self.is_windows);
        let joined = parts.join("/");
        if root.is_empty() && joined.is_empty() {
            ".".to_string()
        } else {
            format!("{root}{joined}")
        }
    }

    /// Join segments and normalize the result. Empty segments are ignored.
    pub fn join(&self, parts: &[&str]) -> String {
        let joined = parts
            .iter()
            .filter(|p| !p.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("/");
        if joined.is_empty() {
            return ".".to_string();
        }
        self.normalize(&joined)
    }

    /// Resolve segments right to left into an absolute path.
    ///
    /// Processing stops at the first absolute segment; if none is absolute the
    /// working directory is prepended.
    pub fn resolve(&self, parts: &[&str]) -> String {
        let mut resolved = String::new();
        for part in parts.iter().rev().filter(|p| !p.is_empty()) {
            let part = self.slashes(part);
            let absolute = self.is_absolute(&part);
            resolved = if resolved.is_empty() {
                part
            } else {
                format!("{part}/{resolved}")
            };
            if absolute {
                break;
            }
        }
        if !self.is_absolute(&resolved) {
            resolved = if resolved.is_empty() {
                self.cwd.clone()
            } else {
                format!("{}/{}", self.cwd, resolved)
            };
        }

        let normalized = self.normalize(&resolved);
        if self.is_windows && normalized.starts_with('/') && !normalized.starts_with("//") {
            if let Some(drive) = self.drive() {
                return format!("{drive}{normalized}");
            }
        }
        normalized
    }

    /// Relative path from `from` to `to`, both resolved first.
    ///
    /// Returns an empty string when both resolve to the same path, and the
    /// resolved `to` when they live under different roots.
    pub fn relative(&self, from: &str, to: &str) -> String {
        let from = self.resolve(&[from]);
        let to = self.resolve(&[to]);
        let (from_root, from_parts) = split_reduced(&from, self.is_windows);
        let (to_root, to_parts) = split_reduced(&to, self.is_windows);
        if !self.same_component(from_root, to_root) {
            return to;
        }

        let common = from_parts
            .iter()
            .zip(&to_parts)
            .take_while(|(a, b)| self.same_component(a, b))
            .count();
        let mut segments = vec![".."; from_parts.len() - common];
        segments.extend_from_slice(&to_parts[common..]);
        segments.join("/")
    }

    /// Directory portion of a path (`.` when there is none).
    pub fn dirname(&self, path: &str) -> String {
        let path = self.slashes(path);
        if path.is_empty() {
            return ".".to_string();
        }
        let root_len = root_length(&path, self.is_windows);
        let body = path[root_len..].trim_end_matches('/');
        match body.rfind('/') {
            Some(idx) => {
                let dir = body[..idx].trim_end_matches('/');
                format!("{}{}", &path[..root_len], dir)
            }
            None if root_len > 0 => path[..root_len].to_string(),
            None => ".".to_string(),
        }
    }

    /// Final component of a path, ignoring trailing separators.
    pub fn basename(&self, path: &str) -> String {
        let path = self.slashes(path);
        let root_len = root_length(&path, self.is_windows);
        let body = path[root_len..].trim_end_matches('/');
        match body.rfind('/') {
            Some(idx) => body[idx + 1..].to_string(),
            None => body.to_string(),
        }
    }

    /// Extension of the final component including the dot.
    ///
    /// Dot-files such as `.bashrc` have no extension.
    pub fn extname(&self, path: &str) -> String {
        let base = self.basename(path);
        if base == ".." {
            return String::new();
        }
        match base.rfind('.') {
            Some(0) | None => String::new(),
            Some(idx) => base[idx..].to_string(),
        }
    }

    /// Split a path into root, directory, base, extension and name.
    pub fn parse(&self, path: &str) -> ParsedPath {
        let slashed = self.slashes(path);
        let root_len = root_length(&slashed, self.is_windows);
        let has_dir = root_len > 0 || slashed[root_len..].trim_end_matches('/').contains('/');
        let base = self.basename(path);
        let ext = self.extname(path);
        let name = base[..base.len() - ext.len()].to_string();
        ParsedPath {
            root: slashed[..root_len].to_string(),
            dir: if has_dir { self.dirname(path) } else { String::new() },
            base,
            ext,
            name,
        }
    }
}
