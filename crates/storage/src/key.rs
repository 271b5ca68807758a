//! Blob key helpers.
//!
//! Object stores have a flat namespace: "directories" only exist as shared
//! key prefixes separated by [`DELIMITER`]. These helpers build and take apart
//! such keys, and map them safely onto the local filesystem for downloads.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Separator used by every supported backend for hierarchical listings.
pub const DELIMITER: char = '/';

/// Join a prefix and a (possibly nested) name with exactly one delimiter.
///
/// ```
/// use strata_storage::key::combine;
/// assert_eq!(combine("up", "a.txt"), "up/a.txt");
/// assert_eq!(combine("up/", "/nested/a.txt"), "up/nested/a.txt");
/// assert_eq!(combine("", "a.txt"), "a.txt");
/// ```
pub fn combine(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_end_matches(DELIMITER);
    let name = name.trim_start_matches(DELIMITER);
    match prefix.is_empty() {
        true => name.to_string(),
        false => format!("{prefix}{DELIMITER}{name}"),
    }
}

/// Parent directory prefix of a key or directory prefix, with a trailing
/// delimiter. The bucket root is the empty string.
///
/// ```
/// use strata_storage::key::parent;
/// assert_eq!(parent("a/b/"), "a/");
/// assert_eq!(parent("a/b/c.txt"), "a/b/");
/// assert_eq!(parent("a/"), "");
/// assert_eq!(parent(""), "");
/// ```
pub fn parent(key: &str) -> String {
    let trimmed = key.trim_end_matches(DELIMITER);
    match trimmed.rfind(DELIMITER) {
        Some(index) => trimmed[..=index].to_string(),
        None => String::new(),
    }
}

/// Last segment of a key. Directory prefixes keep their trailing delimiter so
/// they can still be told apart from blobs when rendered.
pub fn display_name(key: &str) -> &str {
    let is_directory = key.ends_with(DELIMITER);
    let trimmed = key.trim_end_matches(DELIMITER);
    let start = trimmed.rfind(DELIMITER).map(|index| index + 1).unwrap_or(0);
    match is_directory && !trimmed.is_empty() {
        // Includes the trailing delimiter.
        true => &key[start..=trimmed.len()],
        false => &key[start..],
    }
}

/// Map a blob key to a path beneath `root`.
///
/// The key is validated first: it must not escape `root` (no `..` traversal
/// past the start), must not contain null bytes, and must not normalize to
/// nothing.
///
/// > **Note:** This does **not** normalize backslashes, non-UTF8 bytes, or
/// >           platform-specific weirdness.
///
/// ```
/// use std::path::Path;
/// use strata_storage::key::local_path;
/// let root = Path::new("/downloads");
/// assert_eq!(local_path(root, "x/1.txt").unwrap(), Path::new("/downloads/x/1.txt"));
/// assert!(local_path(root, "../etc/passwd").is_err());
/// ```
pub fn local_path(root: impl AsRef<Path>, key: &str) -> Result<PathBuf> {
    Ok(root.as_ref().join(validate(key)?))
}

/// Validates a key for use as a relative filesystem path and returns the
/// normalized form.
pub fn validate(key: &str) -> Result<PathBuf> {
    // Rust's component parser deals with repeated and trailing separators.
    let mut components = Vec::new();
    for component in Path::new(key).components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but cause
                // truncation in C-based syscalls, reject them explicitly.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidKey(key.to_string()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidKey(key.to_string())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidKey(key.to_string()));
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidKey(key.to_string())),
        false => Ok(components.into_iter().collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("up", "a.txt", "up/a.txt")]
    #[case("up/", "a.txt", "up/a.txt")]
    #[case("up//", "/a.txt", "up/a.txt")]
    #[case("", "a.txt", "a.txt")]
    #[case("", "nested/a.txt", "nested/a.txt")]
    #[case("a/b", "c/d.txt", "a/b/c/d.txt")]
    fn test_combine(#[case] prefix: &str, #[case] name: &str, #[case] expected: &str) {
        assert_eq!(combine(prefix, name), expected);
    }

    #[rstest]
    #[case("a/b/", "a/")]
    #[case("a/b/c.txt", "a/b/")]
    #[case("a/", "")]
    #[case("a.txt", "")]
    #[case("", "")]
    fn test_parent(#[case] key: &str, #[case] expected: &str) {
        assert_eq!(parent(key), expected);
    }

    #[rstest]
    #[case("a/b/c.txt", "c.txt")]
    #[case("a/b/", "b/")]
    #[case("top.txt", "top.txt")]
    #[case("dir/", "dir/")]
    #[case("", "")]
    fn test_display_name(#[case] key: &str, #[case] expected: &str) {
        assert_eq!(display_name(key), expected);
    }

    #[test]
    fn test_valid_keys() {
        assert_eq!(validate("x/1.txt").unwrap(), Path::new("x/1.txt"));
        assert_eq!(validate("a//b//c").unwrap(), Path::new("a/b/c"));
        assert_eq!(validate("a/./b/./c").unwrap(), Path::new("a/b/c"));
        // Leading delimiter does not make the key absolute.
        assert_eq!(validate("/rooted/file").unwrap(), Path::new("rooted/file"));
        // Traversal that stays within the root is resolved.
        assert_eq!(validate("a/b/../c").unwrap(), Path::new("a/c"));
    }

    #[test]
    fn test_traversal_attempts() {
        assert!(validate("../etc/passwd").is_err());
        assert!(validate("a/../../b").is_err());
        assert!(validate("..").is_err());
    }

    #[test]
    fn test_invalid_keys() {
        assert!(validate("a\0b").is_err());
        assert!(validate("").is_err());
        assert!(validate("./").is_err());
        assert!(validate("//").is_err());
    }

    #[test]
    fn test_local_path() {
        let root = Path::new("/downloads");
        assert_eq!(local_path(root, "x/2.txt").unwrap(), Path::new("/downloads/x/2.txt"));
        let err = local_path(root, "x/../../escape").unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidKey(_)));
    }
}
