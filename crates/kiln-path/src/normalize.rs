//! Slash normalization and component reduction

/// Replace every `\` with `/`.
pub fn normalize_slashes(path: &str) -> String {
    path.replace('\\', "/")
}

/// Length in bytes of the root portion of a slash-normalized path.
///
/// With `windows` set, drive roots (`c:`, `c:/`) and UNC roots
/// (`//server/share/`) are recognized in addition to `/`.
pub fn root_length(path: &str, windows: bool) -> usize {
    let bytes = path.as_bytes();
    if bytes.is_empty() {
        return 0;
    }
    if !windows {
        return usize::from(bytes[0] == b'/');
    }

    if bytes.len() > 1 && bytes[0] == b'/' && bytes[1] == b'/' {
        // //server/share/
        let Some(server) = path[2..].find('/') else {
            return path.len();
        };
        let share_start = 2 + server + 1;
        return match path[share_start..].find('/') {
            Some(share) => share_start + share + 1,
            None => path.len(),
        };
    }
    if bytes[0] == b'/' {
        return 1;
    }
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return if bytes.get(2) == Some(&b'/') { 3 } else { 2 };
    }
    0
}

/// Split a slash-normalized path into its root and reduced components.
///
/// `.` and empty components are dropped. `..` pops the previous component;
/// it is kept only at the front of a relative path and dropped at a root.
pub(crate) fn split_reduced(path: &str, windows: bool) -> (&str, Vec<&str>) {
    let (root, rest) = path.split_at(root_length(path, windows));
    let mut parts: Vec<&str> = Vec::new();
    for part in rest.split('/') {
        match part {
            "" | "." => {}
            ".." => match parts.last() {
                Some(last) if *last != ".." => {
                    parts.pop();
                }
                _ if root.is_empty() => parts.push(".."),
                _ => {}
            },
            _ => parts.push(part),
        }
    }
    (root, parts)
}

/// Normalize a path the way the compiler core expects to see it.
///
/// Backslashes become `/`, redundant separators and `.`/`..` segments are
/// reduced, trailing separators are removed and an empty result becomes `.`.
/// A relative path that spans several segments and does not already start
/// with `.` or a scoped-package `@` gains a `./` prefix so it can never be
/// mistaken for a bare module specifier.
pub fn normalize_path(path: &str) -> String {
    let slashed = normalize_slashes(path.trim());
    let (root, parts) = split_reduced(&slashed, true);
    let normalized = format!("{}{}", root, parts.join("/"));
    if normalized.is_empty() {
        return ".".to_string();
    }
    if root.is_empty() && slashed.contains('/') {
        if let Some(first) = parts.first() {
            if !first.starts_with('.') && !first.starts_with('@') {
                return format!("./{normalized}");
            }
        }
    }
    normalized
}
