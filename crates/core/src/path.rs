//! Path canonicalization and the recursive suffix

use crate::error::Error;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

/// Trailing path component that marks a recursive watch request
pub const RECURSIVE_SUFFIX: &str = "...";

/// Split off a trailing `...` component
///
/// Returns the remaining path and whether the suffix was present. A bare
/// `...` means the current directory.
///
/// # Example
/// ```
/// use treewatch_core::split_recursive;
/// use std::path::Path;
///
/// let (path, recursive) = split_recursive(Path::new("/repo/..."));
/// assert_eq!(path, Path::new("/repo"));
/// assert!(recursive);
/// ```
pub fn split_recursive(path: &Path) -> (PathBuf, bool) {
    if path.file_name() != Some(OsStr::new(RECURSIVE_SUFFIX)) {
        return (path.to_path_buf(), false);
    }
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => (parent.to_path_buf(), true),
        _ => (PathBuf::from("."), true),
    }
}

/// Make `path` absolute, lexically clean and, when it exists, symlink-free
///
/// Paths that do not exist yet are only cleaned lexically; the backend
/// reports the failure if it cannot watch them.
pub fn canonicalize(path: &Path) -> Result<PathBuf, Error> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        let cwd = std::env::current_dir().map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        cwd.join(path)
    };

    let cleaned = clean(&absolute);

    match std::fs::canonicalize(&cleaned) {
        Ok(resolved) => Ok(resolved),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(cleaned),
        Err(source) => Err(Error::Io {
            path: cleaned,
            source,
        }),
    }
}

/// Remove `.` and resolve `..` without touching the filesystem
fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // ".." at the root stays at the root
                if !matches!(
                    out.components().next_back(),
                    None | Some(Component::RootDir) | Some(Component::Prefix(_))
                ) {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_split_recursive() {
        assert_eq!(split_recursive(Path::new("/a/b/...")), (PathBuf::from("/a/b"), true));
        assert_eq!(split_recursive(Path::new("/a/b")), (PathBuf::from("/a/b"), false));
        assert_eq!(split_recursive(Path::new("...")), (PathBuf::from("."), true));
        assert_eq!(split_recursive(Path::new("/a/b..")), (PathBuf::from("/a/b.."), false));
    }

    #[cfg(unix)]
    #[test]
    fn test_clean_removes_dots() {
        assert_eq!(clean(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(clean(Path::new("/../a")), PathBuf::from("/a"));
        assert_eq!(clean(Path::new("/a/b/")), PathBuf::from("/a/b"));
    }

    #[cfg(unix)]
    #[test]
    fn test_canonicalize_missing_path_is_cleaned() -> Result<()> {
        let p = canonicalize(Path::new("/definitely/not/./there/../here"))?;
        assert_eq!(p, PathBuf::from("/definitely/not/here"));
        Ok(())
    }

    #[test]
    fn test_canonicalize_resolves_existing_path() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let nested = temp_dir.path().join("x");
        std::fs::create_dir(&nested)?;

        let via_dots = temp_dir.path().join("x").join("..").join("x");
        assert_eq!(canonicalize(&via_dots)?, std::fs::canonicalize(&nested)?);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_canonicalize_resolves_symlinks() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let target = temp_dir.path().join("target");
        let link = temp_dir.path().join("link");
        std::fs::create_dir(&target)?;
        std::os::unix::fs::symlink(&target, &link)?;

        assert_eq!(canonicalize(&link)?, std::fs::canonicalize(&target)?);
        Ok(())
    }
}
