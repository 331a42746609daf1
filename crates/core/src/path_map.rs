//! Mapping between hierarchical rule-set identifiers and filesystem paths.
//!
//! Identifiers look like `user.apps.vscode.talon` (a rule file, which keeps
//! its extension as a terminal marker segment) or `user.core.keys` (a module
//! file, extension stripped). Everything lives under a single user root.

use std::path::{Component, Path, PathBuf};

use crate::config::Config;
use crate::error::{CoreError, Result};
use crate::kind::RuleSetKind;

/// Namespace every identifier under the user root carries.
pub const USER_NAMESPACE: &str = "user";

/// Extension of generated list artifacts.
pub const LIST_ARTIFACT_EXTENSION: &str = "py";

/// Converts between logical identifiers and filesystem locations.
#[derive(Debug, Clone)]
pub struct PathMapper {
    root: PathBuf,
    rule_extension: String,
    module_extensions: Vec<String>,
}

impl PathMapper {
    pub fn new(
        root: impl Into<PathBuf>,
        rule_extension: impl Into<String>,
        module_extensions: Vec<String>,
    ) -> Self {
        Self {
            root: root.into(),
            rule_extension: rule_extension.into(),
            module_extensions,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.paths.user_root.clone(),
            config.personalization.rule_extension.clone(),
            config.personalization.module_extensions.clone(),
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn rule_extension(&self) -> &str {
        &self.rule_extension
    }

    /// Kind of rule set an identifier names: rule files hold commands,
    /// module files hold lists.
    pub fn kind_of(&self, id: &str) -> RuleSetKind {
        match id.rsplit_once('.') {
            Some((_, last)) if last == self.rule_extension => RuleSetKind::Command,
            _ => RuleSetKind::List,
        }
    }

    /// Identifier for a path under the root.
    ///
    /// The root prefix is stripped and separators become dots. Rule files keep
    /// their extension as the last segment; every other extension is dropped.
    pub fn to_logical_id(&self, path: &Path) -> Result<String> {
        let outside = || CoreError::PathOutsideRoot {
            path: path.to_path_buf(),
            root: self.root.clone(),
        };
        let rel = path.strip_prefix(&self.root).map_err(|_| outside())?;

        let mut segments = Vec::new();
        for component in rel.components() {
            match component {
                Component::Normal(part) => segments.push(part.to_string_lossy().into_owned()),
                Component::CurDir => {}
                _ => return Err(outside()),
            }
        }

        let Some(file_name) = segments.pop() else {
            return Err(outside());
        };
        let file = Path::new(&file_name);
        let stem = file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_name.clone());
        match file.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext == self.rule_extension => {
                segments.push(stem);
                segments.push(self.rule_extension.clone());
            }
            _ => segments.push(stem),
        }

        Ok(format!("{}.{}", USER_NAMESPACE, segments.join(".")))
    }

    /// Existing files backing an identifier, in priority order.
    ///
    /// A rule-file identifier yields up to two paths: the companion module file
    /// of a same-named directory (`lang/talon/talon.py` for `user.lang.talon.talon`)
    /// followed by the rule file itself. A plain identifier yields at most one path,
    /// the first existing candidate among the module extensions.
    pub fn to_filesystem_paths(&self, id: &str) -> Result<Vec<PathBuf>> {
        let segments = self.segments(id)?;
        let mut paths = Vec::new();

        match self.kind_of(id) {
            RuleSetKind::Command if segments.len() >= 2 => {
                let base = self.join_segments(&segments[..segments.len() - 1]);
                let companion_stem = base.join(&self.rule_extension);
                if base.is_dir() {
                    if let Some(companion) = self.first_module_file(&companion_stem) {
                        paths.push(companion);
                    }
                }
                let rule_file = base.with_extension(&self.rule_extension);
                if rule_file.exists() {
                    paths.push(rule_file);
                }
            }
            _ => {
                let base = self.join_segments(&segments);
                if let Some(module) = self.first_module_file(&base) {
                    paths.push(module);
                }
            }
        }

        Ok(paths)
    }

    /// Check that an identifier belongs to the user namespace.
    pub fn validate_id(&self, id: &str) -> Result<()> {
        self.segments(id).map(|_| ())
    }

    /// Location of the generated artifact overriding `id` under `output_root`.
    pub fn artifact_path(&self, output_root: &Path, id: &str) -> Result<PathBuf> {
        let segments = self.segments(id)?;
        let path = match self.kind_of(id) {
            RuleSetKind::Command if segments.len() >= 2 => {
                join_under(output_root, &segments[..segments.len() - 1])
                    .with_extension(&self.rule_extension)
            }
            _ => join_under(output_root, &segments).with_extension(LIST_ARTIFACT_EXTENSION),
        };
        Ok(path)
    }

    /// Identifier prefix shared by everything under `dir`, e.g. `user._generated.`.
    pub fn id_prefix_for(&self, dir: &Path) -> Result<String> {
        let rel = dir.strip_prefix(&self.root).map_err(|_| CoreError::PathOutsideRoot {
            path: dir.to_path_buf(),
            root: self.root.clone(),
        })?;
        let mut prefix = String::from(USER_NAMESPACE);
        for component in rel.components() {
            if let Component::Normal(part) = component {
                prefix.push('.');
                prefix.push_str(&part.to_string_lossy());
            }
        }
        prefix.push('.');
        Ok(prefix)
    }

    fn segments<'a>(&self, id: &'a str) -> Result<Vec<&'a str>> {
        let rest = id
            .strip_prefix(USER_NAMESPACE)
            .and_then(|r| r.strip_prefix('.'))
            .filter(|r| !r.split('.').any(str::is_empty))
            .ok_or_else(|| CoreError::IdOutsideRoot {
                id: id.to_string(),
                namespace: USER_NAMESPACE.to_string(),
            })?;
        Ok(rest.split('.').collect())
    }

    fn join_segments(&self, segments: &[&str]) -> PathBuf {
        join_under(&self.root, segments)
    }

    fn first_module_file(&self, stem_path: &Path) -> Option<PathBuf> {
        self.module_extensions
            .iter()
            .map(|ext| stem_path.with_extension(ext))
            .find(|candidate| candidate.is_file())
    }
}

fn join_under(base: &Path, segments: &[&str]) -> PathBuf {
    let mut path = base.to_path_buf();
    for segment in segments {
        path.push(segment);
    }
    path
}
