//! Treewatch Core - watch-point tree primitives
//!
//! This crate provides the backend-free data model:
//! - Portable event vocabulary and set algebra
//! - Per-directory watch points (subscriber -> event mask)
//! - The path-indexed tree of watch points
//! - Records of what is registered with the native backend
//! - Path canonicalization and recursive-suffix handling

pub mod error;
pub mod event;
pub mod native;
pub mod path;
pub mod tree;
pub mod watchpoint;

// Re-export main types for convenience
pub use error::Error;
pub use event::{Event, EventDiff, EventInfo, RawEvent};
pub use native::NativeWatch;
pub use path::{canonicalize, split_recursive, RECURSIVE_SUFFIX};
pub use tree::{Node, Tree, Walk};
pub use watchpoint::{SubscriberId, WatchPoint};

/// Common result type used throughout treewatch-core
pub type Result<T> = std::result::Result<T, Error>;
