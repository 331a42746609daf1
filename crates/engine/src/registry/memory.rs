//! [`MemoryRegistry`]: a thread-safe in-memory base registry.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use super::{CaptureTable, CommandTable, ListEntries, RegistryEvent, RuleRegistry, RuleSetDefinition};

/// In-memory registry. Mutations return the event a host would broadcast.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    rule_sets: RwLock<BTreeMap<String, RuleSetDefinition>>,
    active_tags: RwLock<BTreeSet<String>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a rule set.
    pub fn insert(&self, id: impl Into<String>, definition: RuleSetDefinition) -> RegistryEvent {
        let id = id.into();
        self.rule_sets
            .write()
            .expect("rule_sets lock poisoned")
            .insert(id.clone(), definition);
        RegistryEvent::Added(id)
    }

    /// Remove a rule set; `None` when it was not loaded.
    pub fn remove(&self, id: &str) -> Option<RegistryEvent> {
        self.rule_sets
            .write()
            .expect("rule_sets lock poisoned")
            .remove(id)
            .map(|_| RegistryEvent::Removed(id.to_string()))
    }

    pub fn is_tag_active(&self, tag: &str) -> bool {
        self.active_tags
            .read()
            .expect("active_tags lock poisoned")
            .contains(tag)
    }

    fn with_definition<T>(&self, id: &str, f: impl FnOnce(&RuleSetDefinition) -> T) -> Option<T> {
        self.rule_sets
            .read()
            .expect("rule_sets lock poisoned")
            .get(id)
            .map(f)
    }
}

impl RuleRegistry for MemoryRegistry {
    fn rule_sets(&self) -> Vec<String> {
        self.rule_sets
            .read()
            .expect("rule_sets lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    fn contains(&self, id: &str) -> bool {
        self.rule_sets
            .read()
            .expect("rule_sets lock poisoned")
            .contains_key(id)
    }

    fn match_condition(&self, id: &str) -> Option<String> {
        self.with_definition(id, |d| d.match_condition.clone())
    }

    fn lists(&self, id: &str) -> Option<BTreeMap<String, ListEntries>> {
        self.with_definition(id, |d| d.lists.clone())
    }

    fn commands(&self, id: &str) -> Option<CommandTable> {
        self.with_definition(id, |d| d.commands.clone())
    }

    fn captures(&self, id: &str) -> Option<CaptureTable> {
        self.with_definition(id, |d| d.captures.clone())
    }

    fn set_tag_active(&self, tag: &str, active: bool) {
        let mut tags = self.active_tags.write().expect("active_tags lock poisoned");
        if active {
            tags.insert(tag.to_string());
        } else {
            tags.remove(tag);
        }
    }
}
