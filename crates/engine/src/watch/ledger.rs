//! [`ModificationLedger`]: last observed modification time per path.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Last seen modification time of each watched path.
///
/// `None` records that the path did not exist when last observed, so a
/// missing file that stays missing is never reported as modified.
#[derive(Debug, Default)]
pub struct ModificationLedger {
    seen: HashMap<PathBuf, Option<SystemTime>>,
}

impl ModificationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current modification time of `path`, `None` when it does not exist.
    pub fn observe(path: &Path) -> Option<SystemTime> {
        fs::metadata(path).and_then(|m| m.modified()).ok()
    }

    /// Record the current modification time of `path`.
    pub fn record(&mut self, path: &Path) {
        self.seen.insert(path.to_path_buf(), Self::observe(path));
    }

    /// Compare against the last observation and record the new one.
    ///
    /// Returns `false` only when the time equals the recorded value; a path
    /// seen for the first time counts as modified.
    pub fn is_modified(&mut self, path: &Path) -> bool {
        let current = Self::observe(path);
        match self.seen.insert(path.to_path_buf(), current) {
            Some(previous) => previous != current,
            None => true,
        }
    }

    pub fn forget(&mut self, path: &Path) {
        self.seen.remove(path);
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
