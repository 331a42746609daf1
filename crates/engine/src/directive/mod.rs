//! Directive parsing: control files (ordered directives) and their data files.
//!
//! Control files are re-read on every reconciliation pass; nothing parsed
//! here is retained between passes. A malformed row fails on its own and
//! never takes the rest of the file down with it.

mod action;
mod parser;


pub use self::action::Action;
pub use self::parser::DirectiveParser;

use std::path::PathBuf;

use persona_core::RuleSetKind;

use crate::error::OverlayError;

/// One parsed control-file row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    /// Category of the control file the row came from.
    pub kind: RuleSetKind,
    pub action: Action,
    /// Rule set the directive overrides.
    pub source: String,
    /// List name for list directives; the rule set itself for commands.
    pub target: String,
    pub data_file: Option<PathBuf>,
    /// 1-based line in the control file.
    pub line: usize,
}

impl Directive {
    /// Maximum number of fields a data row may carry for this directive.
    pub fn expected_arity(&self) -> usize {
        self.action.arity()
    }
}

/// Ordered fields of one data-file row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRow {
    pub line: usize,
    pub fields: Vec<String>,
}

impl DataRow {
    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }
}

/// A row or directive that was skipped, with the reason.
#[derive(Debug)]
pub struct DirectiveFailure {
    pub control_file: PathBuf,
    pub line: usize,
    pub error: OverlayError,
}

/// Output of parsing one control file.
#[derive(Debug, Default)]
pub struct ParsedControl {
    pub directives: Vec<Directive>,
    pub failures: Vec<DirectiveFailure>,
    /// Every data file the rows reference, valid or not, so edits to a
    /// missing file can still trigger reconciliation once it appears.
    pub data_files: Vec<PathBuf>,
}
