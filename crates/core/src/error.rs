//! Path and tree errors

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while resolving paths or looking up tree nodes
#[derive(Debug, Error)]
pub enum Error {
    /// Path is relative where an absolute one is required
    #[error("path is not absolute: {}", .0.display())]
    NotAbsolute(PathBuf),

    /// Path still contains `.` or `..` components
    #[error("path is not canonical: {}", .0.display())]
    NotCanonical(PathBuf),

    /// No node (or no file) exists at the path
    #[error("no such path: {}", .0.display())]
    NotExist(PathBuf),

    /// A recursive watch was requested on something that is not a directory
    #[error("not a directory: {}", .0.display())]
    NotDirectory(PathBuf),

    /// I/O failure while resolving a path
    #[error("failed to resolve {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
