//! [`CommandOverlay`]: overridden commands of one rule file.

use crate::directive::{Action, DataRow, Directive};
use crate::error::{OverlayError, Result};
use crate::registry::CommandTable;

use super::list::short_row;

/// Implementation body that neutralizes a command.
pub const NOOP_IMPLEMENTATION: &str = "skip()";

/// Overridden rules of one rule file: only rules a directive touched appear.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOverlay {
    commands: CommandTable,
}

impl From<CommandTable> for CommandOverlay {
    fn from(commands: CommandTable) -> Self {
        Self { commands }
    }
}

impl CommandOverlay {
    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    pub fn get(&self, rule: &str) -> Option<&str> {
        self.commands.get(rule).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Apply one directive against the base command table of the rule file.
    ///
    /// ADD maps the new rule text to the existing implementation, REPLACE
    /// does the same after dropping the old rule from the overlay, DELETE
    /// keeps the rule but swaps its body for [`NOOP_IMPLEMENTATION`] so other
    /// rules never reference a rule that no longer exists.
    pub fn apply(&mut self, directive: &Directive, rule_set: &str, base: &CommandTable, rows: &[DataRow]) -> Result<()> {
        let mut commands = self.commands.clone();

        for row in rows {
            let rule = row.field(0).unwrap_or_default();
            let implementation = base.get(rule).ok_or_else(|| OverlayError::UnknownRule {
                rule_set: rule_set.to_string(),
                rule: rule.to_string(),
            })?;

            match directive.action {
                Action::Add | Action::Replace => {
                    let new_rule = row.field(1).ok_or_else(|| short_row(directive, row))?;
                    if directive.action == Action::Replace {
                        commands.remove(rule);
                    }
                    commands.insert(new_rule.to_string(), implementation.clone());
                }
                Action::Delete => {
                    commands.insert(rule.to_string(), NOOP_IMPLEMENTATION.to_string());
                }
                Action::ReplaceKey => {
                    return Err(OverlayError::UnknownAction(format!(
                        "{} (not valid for command directives)",
                        directive.action
                    )));
                }
            }
        }

        self.commands = commands;
        Ok(())
    }
}
