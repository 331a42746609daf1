//! Filesystem watch subscriptions with modification-time deduplication.
//!
//! The controller subscribes to three kinds of targets: the configuration
//! root (recursive), the source files of every overridden rule set, and the
//! parent of a configuration root that has gone missing. Subscriptions are
//! idempotent and reference counted per backend path, so watching the same
//! thing twice registers it once.

mod backend;
mod ledger;
mod manager;


pub use self::backend::{ManualBackend, NotifyBackend, WatchBackend};
pub use self::ledger::ModificationLedger;
pub use self::manager::WatchManager;

use std::fmt;

/// What a subscription is for.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WatchTarget {
    /// The configuration root, watched recursively.
    ConfigRoot,
    /// A file backing the named rule set.
    SourceFile(String),
    /// Parent of a missing configuration root, waiting for it to reappear.
    RootParent,
}

impl WatchTarget {
    pub fn is_recursive(&self) -> bool {
        matches!(self, WatchTarget::ConfigRoot)
    }
}

impl fmt::Display for WatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchTarget::ConfigRoot => write!(f, "config root"),
            WatchTarget::SourceFile(id) => write!(f, "source of {}", id),
            WatchTarget::RootParent => write!(f, "config root parent"),
        }
    }
}
