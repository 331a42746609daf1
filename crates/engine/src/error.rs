//! Error taxonomy for parsing, applying and reconciling overlays.

use std::path::PathBuf;

use persona_core::{CoreError, RuleSetKind};

use crate::directive::Action;

/// Errors raised while turning directives into overlays and artifacts.
#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    /// Identifier or path outside the user root.
    #[error(transparent)]
    PathOutsideRoot(#[from] CoreError),

    /// Data file outside the configuration root or with the wrong extension.
    #[error("data file {path} must live under {root} and end in .{extension}")]
    Naming {
        path: PathBuf,
        root: PathBuf,
        extension: String,
    },

    /// Row with more fields than its action allows.
    #[error("{path}:{line}: expected at most {expected} fields, found {found}")]
    Arity {
        path: PathBuf,
        line: usize,
        expected: usize,
        found: usize,
    },

    /// Control or data file that does not exist.
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    /// Action that needs a data file but the control row names none.
    #[error("{action} requires a data file")]
    MissingDataFile { action: Action },

    /// Override target absent from the base registry.
    #[error("'{rule}' is not defined in {rule_set}")]
    UnknownRule { rule_set: String, rule: String },

    /// Control row whose source belongs to the other category's control file.
    #[error("'{id}' is not a {expected} rule set")]
    WrongKind { id: String, expected: RuleSetKind },

    /// Delete or rename of a key the overlay does not contain.
    #[error("key '{key}' is not present in {target}")]
    MissingKey { target: String, key: String },

    #[error("unknown action '{0}'")]
    UnknownAction(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Notify watcher error: {0}")]
    Notify(#[from] notify::Error),
}

/// Result alias for overlay operations.
pub type Result<T> = std::result::Result<T, OverlayError>;
