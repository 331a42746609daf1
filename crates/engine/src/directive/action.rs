//! Directive action tokens.

use std::fmt;
use std::str::FromStr;

use persona_core::RuleSetKind;

use crate::error::OverlayError;

/// What a directive does to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Merge rows into the target.
    Add,
    /// Remove (lists) or neutralize (commands) each listed key.
    Delete,
    /// Clear the target, then merge rows.
    Replace,
    /// Rename list keys, keeping their values.
    ReplaceKey,
}

impl Action {
    /// Fields per data row: `key` for DELETE, a pair for everything else.
    pub fn arity(self) -> usize {
        match self {
            Action::Delete => 1,
            Action::Add | Action::Replace | Action::ReplaceKey => 2,
        }
    }

    /// REPLACE alone may omit its data file, meaning "clear".
    pub fn requires_data_file(self) -> bool {
        !matches!(self, Action::Replace)
    }

    /// Whether the action is meaningful for the given rule set kind.
    pub fn supports(self, kind: RuleSetKind) -> bool {
        match kind {
            RuleSetKind::List => true,
            RuleSetKind::Command => !matches!(self, Action::ReplaceKey),
        }
    }

    /// Parse a token for a specific category.
    pub fn parse_for(token: &str, kind: RuleSetKind) -> Result<Self, OverlayError> {
        let action: Action = token.parse()?;
        if action.supports(kind) {
            Ok(action)
        } else {
            Err(OverlayError::UnknownAction(format!("{} (not valid for {} directives)", action, kind)))
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Add => write!(f, "ADD"),
            Action::Delete => write!(f, "DELETE"),
            Action::Replace => write!(f, "REPLACE"),
            Action::ReplaceKey => write!(f, "REPLACE_KEY"),
        }
    }
}

impl FromStr for Action {
    type Err = OverlayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADD" => Ok(Action::Add),
            "DELETE" => Ok(Action::Delete),
            "REPLACE" => Ok(Action::Replace),
            "REPLACE_KEY" => Ok(Action::ReplaceKey),
            _ => Err(OverlayError::UnknownAction(s.trim().to_string())),
        }
    }
}
