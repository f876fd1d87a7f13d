//! Errors returned by `Notifier::watch` and `Notifier::stop`

use crate::backend::BackendError;
use std::path::PathBuf;
use thiserror::Error;

/// Failure of a watch or stop request
#[derive(Debug, Error)]
pub enum Error {
    /// The path could not be resolved or is unsuitable
    #[error(transparent)]
    Path(#[from] treewatch_core::Error),

    /// The native backend rejected a call
    #[error("{op} {} failed: {source}", path.display())]
    Backend {
        /// Native operation that failed
        op: &'static str,
        /// Path the operation targeted
        path: PathBuf,
        #[source]
        source: BackendError,
    },
}

/// Result type for notifier operations
pub type Result<T> = std::result::Result<T, Error>;
