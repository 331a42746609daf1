//! [`OverlayStore`]: overlays keyed by rule-set identifier.

use std::collections::BTreeMap;

use persona_core::RuleSetKind;
use tracing::debug;

use crate::directive::{DataRow, Directive};
use crate::error::{OverlayError, Result};
use crate::registry::RuleRegistry;

use super::{CommandOverlay, ListOverlay, OverlayState};

/// All overlays held by the engine. At most one entry per identifier.
#[derive(Debug, Clone, Default)]
pub struct OverlayStore {
    entries: BTreeMap<String, OverlayState>,
}

impl OverlayStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&OverlayState> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Identifiers holding an overlay of the given kind.
    pub fn ids_of(&self, kind: RuleSetKind) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, state)| state.kind() == kind)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Move every entry of `other` into this store, replacing same-id entries.
    pub fn merge(&mut self, other: OverlayStore) {
        self.entries.extend(other.entries);
    }

    pub fn remove(&mut self, id: &str) -> Option<OverlayState> {
        self.entries.remove(id)
    }

    /// Drop every overlay of one kind, returning their identifiers.
    pub fn clear_kind(&mut self, kind: RuleSetKind) -> Vec<String> {
        let ids = self.ids_of(kind);
        for id in &ids {
            self.entries.remove(id);
        }
        ids
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Apply a list directive. The target list must exist in the base rule set.
    pub fn apply_list_directive(
        &mut self,
        directive: &Directive,
        rows: &[DataRow],
        registry: &dyn RuleRegistry,
    ) -> Result<()> {
        let base = registry
            .lists(&directive.source)
            .and_then(|mut lists| lists.remove(&directive.target))
            .ok_or_else(|| OverlayError::UnknownRule {
                rule_set: directive.source.clone(),
                rule: directive.target.clone(),
            })?;

        let mut overlay = match self.entries.get(&directive.source) {
            Some(OverlayState::List(overlay)) => overlay.clone(),
            _ => ListOverlay::default(),
        };
        overlay.apply(directive, &base, rows)?;

        debug!(
            rule_set = %directive.source,
            list = %directive.target,
            action = %directive.action,
            rows = rows.len(),
            "applied list directive"
        );
        self.commit(&directive.source, OverlayState::List(overlay));
        Ok(())
    }

    /// Apply a command directive against the base rule file.
    pub fn apply_command_directive(
        &mut self,
        directive: &Directive,
        rows: &[DataRow],
        registry: &dyn RuleRegistry,
    ) -> Result<()> {
        let base = registry
            .commands(&directive.source)
            .ok_or_else(|| OverlayError::UnknownRule {
                rule_set: directive.source.clone(),
                rule: directive.source.clone(),
            })?;

        let mut overlay = match self.entries.get(&directive.source) {
            Some(OverlayState::Command(overlay)) => overlay.clone(),
            _ => CommandOverlay::default(),
        };
        overlay.apply(directive, &directive.source, &base, rows)?;

        debug!(
            rule_set = %directive.source,
            action = %directive.action,
            rows = rows.len(),
            "applied command directive"
        );
        self.commit(&directive.source, OverlayState::Command(overlay));
        Ok(())
    }

    /// Dispatch on the directive's category.
    pub fn apply(&mut self, directive: &Directive, rows: &[DataRow], registry: &dyn RuleRegistry) -> Result<()> {
        match directive.kind {
            RuleSetKind::List => self.apply_list_directive(directive, rows, registry),
            RuleSetKind::Command => self.apply_command_directive(directive, rows, registry),
        }
    }

    fn commit(&mut self, id: &str, state: OverlayState) {
        self.entries.insert(id.to_string(), state);
    }
}
