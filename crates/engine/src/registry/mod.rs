//! Read access to the host's base rule registry.
//!
//! The registry owns the original rule sets; the engine only reads from it
//! and reacts to its add/remove notifications. Two adapters ship here: an
//! in-memory registry for tests and embedding hosts, and a filesystem-backed
//! one that parses rule files from the user root with hot-reload.

mod fs;
mod memory;
pub(crate) mod talon;
mod watcher;


pub use self::fs::{FsRegistry, LoadResult, LoadStatus};
pub use self::memory::MemoryRegistry;
pub use self::talon::{TalonFile, TalonList};

use std::collections::BTreeMap;
use std::fmt;

/// Entries of one list: spoken form to written value.
pub type ListEntries = BTreeMap<String, String>;

/// Rule text to implementation body.
pub type CommandTable = BTreeMap<String, String>;

/// Capture name to its rule text.
pub type CaptureTable = BTreeMap<String, String>;

/// Consumed interface of the base registry.
pub trait RuleRegistry: Send + Sync {
    /// Identifiers of every currently loaded rule set.
    fn rule_sets(&self) -> Vec<String>;

    fn contains(&self, id: &str) -> bool {
        self.rule_sets().iter().any(|known| known == id)
    }

    /// Match condition of a rule set, one condition per line. Empty when the
    /// rule set applies unconditionally.
    fn match_condition(&self, id: &str) -> Option<String>;

    /// Lists defined by a rule set, keyed by list name.
    fn lists(&self, id: &str) -> Option<BTreeMap<String, ListEntries>>;

    /// Commands defined by a rule set.
    fn commands(&self, id: &str) -> Option<CommandTable>;

    /// Captures declared by a rule set. Registries that cannot see capture
    /// declarations report none.
    fn captures(&self, _id: &str) -> Option<CaptureTable> {
        None
    }

    /// Turn a capability tag on or off in the host.
    fn set_tag_active(&self, tag: &str, active: bool);
}

/// Add/remove notification from the registry, keyed by identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Added(String),
    Removed(String),
}

impl RegistryEvent {
    pub fn id(&self) -> &str {
        match self {
            RegistryEvent::Added(id) | RegistryEvent::Removed(id) => id,
        }
    }
}

impl fmt::Display for RegistryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryEvent::Added(id) => write!(f, "added {}", id),
            RegistryEvent::Removed(id) => write!(f, "removed {}", id),
        }
    }
}

/// Everything the registry knows about one rule set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSetDefinition {
    pub match_condition: String,
    pub lists: BTreeMap<String, ListEntries>,
    pub commands: CommandTable,
    pub captures: CaptureTable,
}

impl RuleSetDefinition {
    pub fn with_match(mut self, condition: impl Into<String>) -> Self {
        self.match_condition = condition.into();
        self
    }

    pub fn with_list<K, V>(mut self, name: impl Into<String>, entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.lists.insert(
            name.into(),
            entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        );
        self
    }

    pub fn with_command(mut self, rule: impl Into<String>, body: impl Into<String>) -> Self {
        self.commands.insert(rule.into(), body.into());
        self
    }

    pub fn with_capture(mut self, name: impl Into<String>, rule: impl Into<String>) -> Self {
        self.captures.insert(name.into(), rule.into());
        self
    }
}
