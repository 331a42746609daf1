//! [`DirectiveParser`]: CSV control and data file reader.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use persona_core::config::PersonalizationConfig;
use persona_core::{PathMapper, RuleSetKind};
use tracing::{debug, warn};

use crate::error::{OverlayError, Result};

use super::{Action, DataRow, Directive, DirectiveFailure, ParsedControl};

/// Reads control files into [`Directive`]s and data files into [`DataRow`]s.
///
/// Data files are resolved relative to the configuration root and must stay
/// inside it with the configured extension.
#[derive(Debug, Clone)]
pub struct DirectiveParser {
    mapper: PathMapper,
    config_root: PathBuf,
    data_extension: String,
    escape: u8,
}

impl DirectiveParser {
    pub fn new(mapper: PathMapper, config_root: &Path, settings: &PersonalizationConfig) -> Self {
        let escape = if settings.escape_char.is_ascii() {
            settings.escape_char as u8
        } else {
            warn!(escape = %settings.escape_char, "non-ASCII escape character, falling back to '\\'");
            b'\\'
        };
        Self {
            mapper,
            config_root: normalize(config_root),
            data_extension: settings.data_extension.clone(),
            escape,
        }
    }

    pub fn config_root(&self) -> &Path {
        &self.config_root
    }

    /// Parse a control file into directives, in row order.
    ///
    /// Fails as a whole only when the file cannot be read or is not valid CSV.
    /// Bad rows are collected as failures and skipped.
    pub fn parse_control_file(&self, path: &Path, kind: RuleSetKind) -> Result<ParsedControl> {
        let rows = self.read_rows(path)?;
        let mut parsed = ParsedControl::default();

        for row in rows {
            match self.parse_control_row(path, &row, kind, &mut parsed.data_files) {
                Ok(directive) => {
                    debug!(
                        control = %path.display(),
                        line = row.line,
                        action = %directive.action,
                        source = %directive.source,
                        "parsed directive"
                    );
                    parsed.directives.push(directive);
                }
                Err(error) => {
                    warn!(
                        control = %path.display(),
                        line = row.line,
                        error = %error,
                        "skipping control row"
                    );
                    parsed.failures.push(DirectiveFailure {
                        control_file: path.to_path_buf(),
                        line: row.line,
                        error,
                    });
                }
            }
        }

        Ok(parsed)
    }

    /// Parse a data file, rejecting it entirely if any row exceeds `expected_arity`.
    ///
    /// Rows with fewer fields are returned as-is; the overlay decides what a
    /// partial row means for its action.
    pub fn parse_data_file(&self, path: &Path, expected_arity: usize) -> Result<Vec<DataRow>> {
        self.check_data_path(path)?;
        if !path.is_file() {
            return Err(OverlayError::NotFound(path.to_path_buf()));
        }

        let rows = self.read_rows(path)?;
        if let Some(row) = rows.iter().find(|r| r.fields.len() > expected_arity) {
            return Err(OverlayError::Arity {
                path: path.to_path_buf(),
                line: row.line,
                expected: expected_arity,
                found: row.fields.len(),
            });
        }
        Ok(rows)
    }

    /// Resolve a data file name from a control row against the configuration root.
    pub fn resolve_data_file(&self, name: &str) -> Result<PathBuf> {
        let candidate = Path::new(name);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.config_root.join(candidate)
        };
        let resolved = normalize(&joined);
        self.check_data_path(&resolved)?;
        Ok(resolved)
    }

    fn check_data_path(&self, path: &Path) -> Result<()> {
        let has_extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e == self.data_extension)
            .unwrap_or(false);
        if !has_extension || !normalize(path).starts_with(&self.config_root) {
            return Err(OverlayError::Naming {
                path: path.to_path_buf(),
                root: self.config_root.clone(),
                extension: self.data_extension.clone(),
            });
        }
        Ok(())
    }

    fn parse_control_row(
        &self,
        control: &Path,
        row: &DataRow,
        kind: RuleSetKind,
        data_files: &mut Vec<PathBuf>,
    ) -> Result<Directive> {
        // list rows: action,source,target[,data]  command rows: action,source,data
        let (min_fields, max_fields, data_index) = match kind {
            RuleSetKind::List => (3, 4, 3),
            RuleSetKind::Command => (2, 3, 2),
        };
        if row.fields.len() < min_fields || row.fields.len() > max_fields {
            return Err(OverlayError::Arity {
                path: control.to_path_buf(),
                line: row.line,
                expected: max_fields,
                found: row.fields.len(),
            });
        }

        let action = Action::parse_for(&row.fields[0], kind)?;
        let source = row.fields[1].clone();
        self.mapper.validate_id(&source)?;
        if self.mapper.kind_of(&source) != kind {
            return Err(OverlayError::WrongKind { id: source, expected: kind });
        }
        let target = match kind {
            RuleSetKind::List => row.fields[2].clone(),
            RuleSetKind::Command => source.clone(),
        };

        let data_file = match row.field(data_index).filter(|name| !name.is_empty()) {
            Some(name) => {
                let path = self.resolve_data_file(name)?;
                data_files.push(path.clone());
                if !path.is_file() {
                    return Err(OverlayError::NotFound(path));
                }
                Some(path)
            }
            None if action.requires_data_file() => {
                return Err(OverlayError::MissingDataFile { action });
            }
            None => None,
        };

        Ok(Directive {
            kind,
            action,
            source,
            target,
            data_file,
            line: row.line,
        })
    }

    /// Read every non-blank, non-comment row, trimming fields and trailing
    /// empty fields. Each physical line is one row, so line numbers are exact.
    fn read_rows(&self, path: &Path) -> Result<Vec<DataRow>> {
        let contents = fs::read_to_string(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => OverlayError::NotFound(path.to_path_buf()),
            _ => OverlayError::Io(e),
        })?;

        let mut rows = Vec::new();
        for (index, text) in contents.lines().enumerate() {
            let trimmed = text.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let Some(mut fields) = self.split_line(trimmed)? else {
                continue;
            };
            while fields.last().is_some_and(|f| f.is_empty()) {
                fields.pop();
            }
            if fields.is_empty() {
                continue;
            }
            rows.push(DataRow {
                line: index + 1,
                fields,
            });
        }
        Ok(rows)
    }

    fn split_line(&self, line: &str) -> Result<Option<Vec<String>>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .double_quote(false)
            .escape(Some(self.escape))
            .trim(csv::Trim::All)
            .from_reader(line.as_bytes());

        let mut record = csv::StringRecord::new();
        if !reader.read_record(&mut record)? {
            return Ok(None);
        }
        Ok(Some(record.iter().map(str::to_string).collect()))
    }
}

/// Lexically resolve `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
