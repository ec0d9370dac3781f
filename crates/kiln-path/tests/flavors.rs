//! Cross-flavor behavior of the public path API

use kiln_path::{normalize_path, PathUtils};

#[test]
fn test_outputs_use_forward_slashes() {
    let w = PathUtils::windows("C:\\project");
    for out in [
        w.resolve(&["src\\lib\\index.ts"]),
        w.join(&["a\\b", "c"]),
        w.dirname("C:\\project\\src\\index.ts"),
        w.normalize("C:\\project\\.\\src"),
    ] {
        assert!(!out.contains('\\'), "{out}");
    }
}

#[test]
fn test_same_inputs_same_outputs() {
    let a = PathUtils::posix("/work");
    let b = PathUtils::posix("/work");
    assert_eq!(a.resolve(&["x", "../y"]), b.resolve(&["x", "../y"]));
    assert_eq!(a.with_cwd("/other").resolve(&["y"]), "/other/y");
    assert_eq!(a.resolve(&["y"]), "/work/y");
}

#[test]
fn test_relative_round_trips_through_resolve() {
    let p = PathUtils::posix("/repo");
    let rel = p.relative("/repo/packages/a/src", "/repo/packages/b/lib/index.ts");
    assert_eq!(rel, "../../b/lib/index.ts");
    assert_eq!(
        p.resolve(&["/repo/packages/a/src", &rel]),
        "/repo/packages/b/lib/index.ts"
    );
}

#[test]
fn test_normalize_path_matches_windows_flavor_for_absolute_paths() {
    let w = PathUtils::windows("C:/");
    for input in ["C:\\a\\..\\b\\c", "C:/a/./b/", "\\\\srv\\share\\x\\..\\y"] {
        assert_eq!(normalize_path(input), w.normalize(input), "{input}");
    }
}

#[test]
fn test_parse_windows_drive() {
    let w = PathUtils::windows("C:/");
    let parsed = w.parse("C:\\dir\\file.tar.gz");
    assert_eq!(parsed.root, "C:/");
    assert_eq!(parsed.dir, "C:/dir");
    assert_eq!(parsed.base, "file.tar.gz");
    assert_eq!(parsed.ext, ".gz");
    assert_eq!(parsed.name, "file.tar");
}
