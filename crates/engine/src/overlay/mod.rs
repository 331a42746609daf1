//! In-memory overlay state computed from directives on top of the base registry.
//!
//! Each overridden rule set has exactly one [`OverlayState`]: a list overlay
//! for module rule sets, a command overlay for rule files. Applying a
//! directive is all-or-nothing: on error the previous state is kept.

mod command;
mod list;
mod store;


pub use self::command::{CommandOverlay, NOOP_IMPLEMENTATION};
pub use self::list::ListOverlay;
pub use self::store::OverlayStore;

use persona_core::RuleSetKind;

/// Overridden state of one rule set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayState {
    List(ListOverlay),
    Command(CommandOverlay),
}

impl OverlayState {
    pub fn kind(&self) -> RuleSetKind {
        match self {
            OverlayState::List(_) => RuleSetKind::List,
            OverlayState::Command(_) => RuleSetKind::Command,
        }
    }

    pub fn as_list(&self) -> Option<&ListOverlay> {
        match self {
            OverlayState::List(overlay) => Some(overlay),
            OverlayState::Command(_) => None,
        }
    }

    pub fn as_command(&self) -> Option<&CommandOverlay> {
        match self {
            OverlayState::Command(overlay) => Some(overlay),
            OverlayState::List(_) => None,
        }
    }
}
