//! [`ListOverlay`]: overridden lists of one rule set.

use std::collections::BTreeMap;

use crate::directive::{Action, DataRow, Directive};
use crate::error::{OverlayError, Result};
use crate::registry::ListEntries;

/// Overridden lists of one rule set, keyed by list name.
///
/// A list enters the overlay seeded with its base entries the first time a
/// directive touches it; later directives edit that copy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOverlay {
    lists: BTreeMap<String, ListEntries>,
}

impl From<BTreeMap<String, ListEntries>> for ListOverlay {
    fn from(lists: BTreeMap<String, ListEntries>) -> Self {
        Self { lists }
    }
}

impl ListOverlay {
    pub fn list(&self, name: &str) -> Option<&ListEntries> {
        self.lists.get(name)
    }

    pub fn lists(&self) -> &BTreeMap<String, ListEntries> {
        &self.lists
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    /// Apply one directive to the list it targets.
    ///
    /// `base` is the registry's current copy of that list; it seeds the
    /// overlay on first touch. Nothing changes unless every row applies.
    pub fn apply(&mut self, directive: &Directive, base: &ListEntries, rows: &[DataRow]) -> Result<()> {
        let mut entries = self
            .lists
            .get(&directive.target)
            .cloned()
            .unwrap_or_else(|| base.clone());

        if directive.action == Action::Replace {
            entries.clear();
        }

        for row in rows {
            let key = row.field(0).unwrap_or_default().to_string();
            match directive.action {
                Action::Add | Action::Replace => {
                    let value = row.field(1).unwrap_or(&key).to_string();
                    entries.insert(key, value);
                }
                Action::ReplaceKey => {
                    let new_key = row.field(1).ok_or_else(|| short_row(directive, row))?;
                    let value = entries.remove(&key).ok_or_else(|| OverlayError::MissingKey {
                        target: directive.target.clone(),
                        key: key.clone(),
                    })?;
                    entries.insert(new_key.to_string(), value);
                }
                Action::Delete => {
                    entries.remove(&key).ok_or_else(|| OverlayError::MissingKey {
                        target: directive.target.clone(),
                        key: key.clone(),
                    })?;
                }
            }
        }

        self.lists.insert(directive.target.clone(), entries);
        Ok(())
    }
}

pub(super) fn short_row(directive: &Directive, row: &DataRow) -> OverlayError {
    OverlayError::Arity {
        path: directive.data_file.clone().unwrap_or_default(),
        line: row.line,
        expected: directive.expected_arity(),
        found: row.fields.len(),
    }
}
