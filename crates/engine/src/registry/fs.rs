//! [`FsRegistry`]: base registry backed by rule files under the user root.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use persona_core::PathMapper;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::Result;

use super::talon::{parse_talon_file, parse_talon_list};
use super::watcher::handle_fs_event;
use super::{CommandTable, ListEntries, RegistryEvent, RuleRegistry, RuleSetDefinition};

/// Extension of list files.
pub const LIST_FILE_EXTENSION: &str = "talon-list";

/// Outcome of loading a single rule file.
#[derive(Debug)]
pub struct LoadResult {
    /// Path to the file that was loaded.
    pub path: PathBuf,
    /// Status of the load attempt.
    pub status: LoadStatus,
}

/// Status of a single file load attempt.
#[derive(Debug)]
pub enum LoadStatus {
    /// Rule set was successfully loaded.
    Loaded { rule_set: String },
    /// File was skipped (dotfile, unsupported extension, etc.).
    Skipped { reason: String },
    /// Read or parse error occurred.
    Failed { error: String },
}

/// Filesystem-backed registry with optional hot-reload.
///
/// Scans the user root recursively for rule files (`*.talon`) and list files
/// (`*.talon-list`) and keeps an in-memory map keyed by rule-set identifier.
pub struct FsRegistry {
    mapper: PathMapper,
    /// Directories under the root that are never scanned, such as the
    /// engine's own output.
    excluded: Vec<PathBuf>,
    rule_sets: RwLock<BTreeMap<String, RuleSetDefinition>>,
    active_tags: RwLock<BTreeSet<String>>,
    /// Active filesystem watcher (held to keep it alive).
    _watcher: Option<RecommendedWatcher>,
}

impl FsRegistry {
    pub fn new(mapper: PathMapper) -> Self {
        Self {
            mapper,
            excluded: Vec::new(),
            rule_sets: RwLock::new(BTreeMap::new()),
            active_tags: RwLock::new(BTreeSet::new()),
            _watcher: None,
        }
    }

    /// Leave `dir` and everything below it out of scans and reloads.
    pub fn excluding(mut self, dir: impl Into<PathBuf>) -> Self {
        self.excluded.push(dir.into());
        self
    }

    pub fn root(&self) -> &Path {
        self.mapper.root()
    }

    fn is_excluded(&self, path: &Path) -> bool {
        self.excluded.iter().any(|dir| path.starts_with(dir))
    }

    /// Recursively scan the user root and load every rule and list file.
    ///
    /// Dotfiles and dot-directories are skipped. Parse errors are reported
    /// per file but do not abort the scan.
    pub fn load_all(&self) -> Result<Vec<LoadResult>> {
        let mut results = Vec::new();
        let walker = WalkDir::new(self.mapper.root())
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !(is_hidden(e.path()) || self.is_excluded(e.path())));

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "failed to read directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.into_path();

            match self.load_file(&path) {
                Ok(Some((id, definition))) => {
                    info!(rule_set = %id, path = %path.display(), "loaded rule set");
                    self.insert(id.clone(), definition);
                    results.push(LoadResult {
                        path,
                        status: LoadStatus::Loaded { rule_set: id },
                    });
                }
                Ok(None) => results.push(LoadResult {
                    path,
                    status: LoadStatus::Skipped {
                        reason: "not a rule or list file".to_string(),
                    },
                }),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to load rule file");
                    results.push(LoadResult {
                        path,
                        status: LoadStatus::Failed {
                            error: e.to_string(),
                        },
                    });
                }
            }
        }

        Ok(results)
    }

    /// Parse a single file. `Ok(None)` for files that hold no rule set.
    pub fn load_file(&self, path: &Path) -> Result<Option<(String, RuleSetDefinition)>> {
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        let is_rule_file = extension == self.mapper.rule_extension();
        if !is_rule_file && extension != LIST_FILE_EXTENSION {
            return Ok(None);
        }

        let id = self.mapper.to_logical_id(path)?;
        let contents = fs::read_to_string(path)?;

        let definition = if is_rule_file {
            let file = parse_talon_file(&contents);
            RuleSetDefinition {
                match_condition: file.matches.join("\n"),
                lists: BTreeMap::new(),
                commands: file.commands,
                ..RuleSetDefinition::default()
            }
        } else {
            let Some(list) = parse_talon_list(&contents) else {
                warn!(path = %path.display(), "list file has no 'list:' header");
                return Ok(None);
            };
            RuleSetDefinition {
                match_condition: list.matches.join("\n"),
                lists: BTreeMap::from([(list.name, list.entries)]),
                ..RuleSetDefinition::default()
            }
        };
        Ok(Some((id, definition)))
    }

    /// Re-read one changed path and report what changed in the registry.
    ///
    /// On read or parse failure the previous version is kept and no event
    /// is produced.
    pub fn refresh_path(&self, path: &Path) -> Vec<RegistryEvent> {
        if is_hidden(path) || self.is_excluded(path) {
            return Vec::new();
        }
        if path.is_file() {
            return match self.load_file(path) {
                Ok(Some((id, definition))) => {
                    info!(rule_set = %id, path = %path.display(), "hot-reloaded rule set");
                    self.insert(id.clone(), definition);
                    vec![RegistryEvent::Added(id)]
                }
                Ok(None) => Vec::new(),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "failed to reload rule file, keeping previous version"
                    );
                    Vec::new()
                }
            };
        }

        let Ok(id) = self.mapper.to_logical_id(path) else {
            debug!(path = %path.display(), "ignoring change outside the user root");
            return Vec::new();
        };
        let removed = self
            .rule_sets
            .write()
            .expect("rule_sets lock poisoned")
            .remove(&id);
        match removed {
            Some(_) => {
                info!(rule_set = %id, path = %path.display(), "removed rule set after file deletion");
                vec![RegistryEvent::Removed(id)]
            }
            None => Vec::new(),
        }
    }

    /// Start a recursive watcher on the user root.
    ///
    /// `on_change` receives every created, modified or removed rule/list
    /// file path; feed those back into [`refresh_path`](Self::refresh_path)
    /// on the event loop.
    pub fn watch<F>(&mut self, on_change: F) -> Result<()>
    where
        F: Fn(PathBuf) + Send + 'static,
    {
        let rule_extension = self.mapper.rule_extension().to_string();
        let mut watcher = notify::recommended_watcher(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => handle_fs_event(&event, &rule_extension, &on_change),
                Err(e) => warn!(error = %e, "registry watcher error"),
            },
        )?;

        watcher.watch(self.mapper.root(), RecursiveMode::Recursive)?;

        info!(path = %self.mapper.root().display(), "watching user root for rule file changes (recursive)");
        self._watcher = Some(watcher);
        Ok(())
    }

    pub fn is_tag_active(&self, tag: &str) -> bool {
        self.active_tags
            .read()
            .expect("active_tags lock poisoned")
            .contains(tag)
    }

    fn insert(&self, id: String, definition: RuleSetDefinition) {
        self.rule_sets
            .write()
            .expect("rule_sets lock poisoned")
            .insert(id, definition);
    }

    fn with_definition<T>(&self, id: &str, f: impl FnOnce(&RuleSetDefinition) -> T) -> Option<T> {
        self.rule_sets
            .read()
            .expect("rule_sets lock poisoned")
            .get(id)
            .map(f)
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

impl RuleRegistry for FsRegistry {
    fn rule_sets(&self) -> Vec<String> {
        self.rule_sets
            .read()
            .expect("rule_sets lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    fn contains(&self, id: &str) -> bool {
        self.rule_sets
            .read()
            .expect("rule_sets lock poisoned")
            .contains_key(id)
    }

    fn match_condition(&self, id: &str) -> Option<String> {
        self.with_definition(id, |d| d.match_condition.clone())
    }

    fn lists(&self, id: &str) -> Option<BTreeMap<String, ListEntries>> {
        self.with_definition(id, |d| d.lists.clone())
    }

    fn commands(&self, id: &str) -> Option<CommandTable> {
        self.with_definition(id, |d| d.commands.clone())
    }

    fn set_tag_active(&self, tag: &str, active: bool) {
        info!(tag = %tag, active, "capability tag changed");
        let mut tags = self.active_tags.write().expect("active_tags lock poisoned");
        if active {
            tags.insert(tag.to_string());
        } else {
            tags.remove(tag);
        }
    }
}
