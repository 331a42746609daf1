//! [`ArtifactWriter`]: atomic, change-aware artifact files under the output root.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::Result;

/// What a write did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Unchanged,
}

/// Owns the output root. Nothing else writes there.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    output_root: PathBuf,
}

impl ArtifactWriter {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Write `contents` to `path` unless the file already holds exactly that.
    ///
    /// Writes to a dotted `.tmp` sibling first, then renames over the final
    /// path, so readers never observe a partial artifact.
    pub fn write(&self, path: &Path, contents: &str) -> Result<WriteOutcome> {
        match fs::read_to_string(path) {
            Ok(existing) if existing == contents => {
                debug!(path = %path.display(), "artifact unchanged");
                return Ok(WriteOutcome::Unchanged);
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));
        fs::write(&tmp_path, contents)?;
        fs::rename(&tmp_path, path)?;

        info!(path = %path.display(), bytes = contents.len(), "wrote artifact");
        Ok(WriteOutcome::Written)
    }

    /// Delete an artifact and any directories it leaves empty below the
    /// output root. Returns `false` when there was nothing to delete.
    pub fn remove(&self, path: &Path) -> Result<bool> {
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }
        info!(path = %path.display(), "removed artifact");

        let mut dir = path.parent();
        while let Some(current) = dir {
            if !current.starts_with(&self.output_root) || current == self.output_root {
                break;
            }
            // Stops at the first non-empty directory.
            if fs::remove_dir(current).is_err() {
                break;
            }
            dir = current.parent();
        }
        Ok(true)
    }

    /// Every file currently under the output root, dotfiles excluded.
    pub fn existing(&self) -> Vec<PathBuf> {
        walkdir::WalkDir::new(&self.output_root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
            .map(|entry| entry.into_path())
            .collect()
    }
}
