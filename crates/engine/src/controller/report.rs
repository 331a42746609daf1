//! [`ReconcileReport`]: what one controller call changed.

use std::fmt;
use std::path::PathBuf;

use crate::directive::DirectiveFailure;
use crate::error::OverlayError;

/// Outcome of one controller operation.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Artifacts created or rewritten.
    pub written: Vec<PathBuf>,
    /// Artifacts deleted.
    pub removed: Vec<PathBuf>,
    /// Artifacts regenerated with identical contents and left alone.
    pub unchanged: Vec<PathBuf>,
    /// Rows and directives that were skipped.
    pub failures: Vec<DirectiveFailure>,
    /// Failures outside any single directive (unreadable control file,
    /// artifact I/O).
    pub errors: Vec<OverlayError>,
}

impl ReconcileReport {
    /// Nothing was written, removed or skipped.
    pub fn is_empty(&self) -> bool {
        self.written.is_empty()
            && self.removed.is_empty()
            && self.unchanged.is_empty()
            && self.failures.is_empty()
            && self.errors.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.errors.is_empty()
    }

    pub fn merge(&mut self, other: ReconcileReport) {
        self.written.extend(other.written);
        self.removed.extend(other.removed);
        self.unchanged.extend(other.unchanged);
        self.failures.extend(other.failures);
        self.errors.extend(other.errors);
    }
}

impl fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "written: {}, removed: {}, unchanged: {}, failures: {}, errors: {}",
            self.written.len(),
            self.removed.len(),
            self.unchanged.len(),
            self.failures.len(),
            self.errors.len()
        )?;
        for path in &self.written {
            writeln!(f, "  + {}", path.display())?;
        }
        for path in &self.removed {
            writeln!(f, "  - {}", path.display())?;
        }
        for failure in &self.failures {
            writeln!(
                f,
                "  ! {}:{}: {}",
                failure.control_file.display(),
                failure.line,
                failure.error
            )?;
        }
        for error in &self.errors {
            writeln!(f, "  ! {}", error)?;
        }
        Ok(())
    }
}
