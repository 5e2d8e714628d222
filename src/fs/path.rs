//! Request path normalization
//!
//! Turns a raw request path into the key used for cache lookups and for
//! locating the target below the served root.

use super::errors::FsError;

/// Strip `strip_slashes` leading segments and all surrounding slashes
///
/// * `strip_slashes = 0`, `"/foo/bar/"` -> `"foo/bar"`
/// * `strip_slashes = 1`, `"/foo/bar"` -> `"bar"`
/// * `strip_slashes = 2`, `"/foo/bar"` -> `""`
///
/// # Panics
/// When a segment is about to be stripped and the remaining path does not
/// start with `/`. Request paths always do, so this is a caller bug.
pub fn normalize(path: &[u8], strip_slashes: usize) -> &[u8] {
    let mut path = path;
    let mut strip = strip_slashes;

    while strip > 0 && !path.is_empty() {
        assert_eq!(path[0], b'/', "BUG: path must start with slash");
        match path[1..].iter().position(|&b| b == b'/') {
            Some(n) => path = &path[n + 1..],
            None => {
                path = &path[..0];
                break;
            }
        }
        strip -= 1;
    }

    while let [b'/', rest @ ..] = path {
        path = rest;
    }
    while let [rest @ .., b'/'] = path {
        path = rest;
    }
    path
}

/// Check a normalized path before it touches the filesystem
///
/// Rejects NUL bytes, non UTF-8 input and `..` segments.
pub fn validate(path: &[u8]) -> Result<&str, FsError> {
    if let Some(n) = path.iter().position(|&b| b == 0) {
        return Err(FsError::invalid_path(
            path,
            format!("nil byte at position {}", n),
        ));
    }

    let path_str = std::str::from_utf8(path)
        .map_err(|e| FsError::invalid_path(path, format!("not valid utf-8: {}", e)))?;

    if path_str.split('/').any(|segment| segment == "..") {
        return Err(FsError::invalid_path(path, "parent directory segment"));
    }

    Ok(path_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(path: &str, strip: usize) -> &str {
        std::str::from_utf8(normalize(path.as_bytes(), strip)).unwrap()
    }

    #[test]
    fn test_no_strip() {
        assert_eq!(norm("/foo/bar", 0), "foo/bar");
        assert_eq!(norm("/foo/bar///", 0), "foo/bar");
        assert_eq!(norm("/", 0), "");
        assert_eq!(norm("", 0), "");
    }

    #[test]
    fn test_strip_segments() {
        assert_eq!(norm("/foo/bar", 1), "bar");
        assert_eq!(norm("/foo/bar/baz/", 1), "bar/baz");
        assert_eq!(norm("/foo/bar/baz", 2), "baz");
        assert_eq!(norm("//foo", 1), "foo");
    }

    #[test]
    fn test_strip_more_than_available() {
        assert_eq!(norm("/foo/bar", 2), "");
        assert_eq!(norm("/foo/bar", 10), "");
        assert_eq!(norm("/foo", 1), "");
    }

    #[test]
    fn test_result_never_has_surrounding_slashes() {
        let paths = ["/a", "/a/", "/a/b/", "//a//b//", "/a/b/c/d"];
        for path in paths {
            for strip in 0..5 {
                let result = norm(path, strip);
                assert!(!result.starts_with('/'), "{path} / {strip} -> {result}");
                assert!(!result.ends_with('/'), "{path} / {strip} -> {result}");
            }
        }
    }

    #[test]
    #[should_panic(expected = "path must start with slash")]
    fn test_relative_path_is_a_bug() {
        normalize(b"foo/bar", 1);
    }

    #[test]
    fn test_validate_nul_byte() {
        for path in [&b"\0"[..], &b"foo\0"[..], &b"a/\0/b"[..], &b"\0../x"[..]] {
            match validate(path) {
                Err(FsError::InvalidPath { reason, .. }) => assert!(reason.contains("nil byte")),
                other => panic!("expected InvalidPath, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_validate_rejects_traversal_and_bad_utf8() {
        assert!(matches!(validate(b"../etc/passwd"), Err(FsError::InvalidPath { .. })));
        assert!(matches!(validate(b"a/../../b"), Err(FsError::InvalidPath { .. })));
        assert!(matches!(validate(b"a/\xff"), Err(FsError::InvalidPath { .. })));
    }

    #[test]
    fn test_validate_accepts_regular_paths() {
        assert_eq!(validate(b"css/site.css").unwrap(), "css/site.css");
        assert_eq!(validate(b"").unwrap(), "");
        assert_eq!(validate(b"a/..b/c.").unwrap(), "a/..b/c.");
    }
}
