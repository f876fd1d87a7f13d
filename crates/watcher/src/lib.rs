//! Filesystem change notification for Treewatch
//!
//! This crate turns subscriptions into a minimal set of native watches:
//! - Direct and recursive (`path/...`) subscriptions with event masks
//! - Merging of nested recursive watches into one, and splitting on stop
//! - Recursion emulated with per-directory watches where the OS lacks it
//! - Routing of native events to every interested subscriber, once each
//!
//! ```no_run
//! use treewatch::{subscriber, Event, Notifier, NotifierConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let notifier = Notifier::recommended(&NotifierConfig::default())?;
//! let (sub, events) = subscriber::bounded(64);
//! notifier.watch("/tmp/project/...", &sub, Event::CREATE | Event::WRITE)?;
//!
//! for info in events.iter().take(1) {
//!     println!("{} {}", info.event(), info.path().display());
//! }
//! notifier.stop(&sub)?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod native;
pub mod platform;
pub mod subscriber;

mod dispatch;
mod index;
mod notifier;
mod plan;

// Re-export main types for convenience
pub use backend::{Backend, BackendError, RecursiveWatcher, Watcher};
pub use config::{NotifierConfig, RecursionMode};
pub use error::{Error, Result};
pub use native::NativeOp;
pub use notifier::Notifier;
pub use subscriber::Subscriber;
pub use treewatch_core::{Event, EventInfo, NativeWatch, RawEvent, SubscriberId};
