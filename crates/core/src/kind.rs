//! Rule set kind: vocabulary lists versus command tables.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The two kinds of rule sets the registry holds.
///
/// Doubles as the directive category: each kind has its own control file,
/// its own overlay variant and its own artifact form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleSetKind {
    List,
    Command,
}

impl RuleSetKind {
    /// Both kinds in reconciliation order: lists resolve before commands.
    pub const ALL: [RuleSetKind; 2] = [RuleSetKind::List, RuleSetKind::Command];
}

impl fmt::Display for RuleSetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleSetKind::List => write!(f, "list"),
            RuleSetKind::Command => write!(f, "command"),
        }
    }
}
