//! [`WatchManager`]: idempotent subscriptions over a [`WatchBackend`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::Result;

use super::{ModificationLedger, WatchBackend, WatchTarget};

/// Tracks what the engine watches and when each path last changed.
///
/// Source files are watched through their parent directory so that atomic
/// replacements by editors keep being seen.
pub struct WatchManager {
    backend: Box<dyn WatchBackend>,
    subscriptions: BTreeMap<PathBuf, BTreeSet<WatchTarget>>,
    backend_refs: HashMap<PathBuf, usize>,
    ledger: ModificationLedger,
}

impl WatchManager {
    pub fn new(backend: Box<dyn WatchBackend>) -> Self {
        Self {
            backend,
            subscriptions: BTreeMap::new(),
            backend_refs: HashMap::new(),
            ledger: ModificationLedger::new(),
        }
    }

    /// Subscribe `path` for `target`. Subscribing twice is a no-op.
    ///
    /// The path's current modification time is recorded so that an
    /// immediate [`is_modified`](Self::is_modified) reports no change.
    pub fn watch(&mut self, path: &Path, target: WatchTarget) -> Result<()> {
        if self.is_watching(path, &target) {
            return Ok(());
        }

        let (backend_path, recursive) = backend_location(path, &target);
        let refs = self.backend_refs.get(&backend_path).copied().unwrap_or(0);
        if refs == 0 {
            self.backend.watch(&backend_path, recursive)?;
            debug!(path = %backend_path.display(), recursive, "registered watch");
        }
        self.backend_refs.insert(backend_path, refs + 1);

        self.ledger.record(path);
        info!(path = %path.display(), target = %target, "watching");
        self.subscriptions
            .entry(path.to_path_buf())
            .or_default()
            .insert(target);
        Ok(())
    }

    /// Drop a subscription. Unknown subscriptions are ignored.
    pub fn unwatch(&mut self, path: &Path, target: &WatchTarget) {
        let Some(targets) = self.subscriptions.get_mut(path) else {
            return;
        };
        if !targets.remove(target) {
            return;
        }
        if targets.is_empty() {
            self.subscriptions.remove(path);
            self.ledger.forget(path);
        }

        let (backend_path, _) = backend_location(path, target);
        let remaining = match self.backend_refs.get_mut(&backend_path) {
            Some(refs) => {
                *refs = refs.saturating_sub(1);
                *refs
            }
            None => return,
        };
        if remaining == 0 {
            self.backend_refs.remove(&backend_path);
            self.release(&backend_path);
        }
        info!(path = %path.display(), target = %target, "stopped watching");
    }

    /// Drop every subscription and backend watch.
    pub fn unwatch_all(&mut self) {
        let paths: Vec<PathBuf> = self.backend_refs.drain().map(|(path, _)| path).collect();
        for path in paths {
            self.release(&path);
        }
        self.subscriptions.clear();
        self.ledger.clear();
    }

    /// Record the current modification time of a path inside a watched tree.
    pub fn record(&mut self, path: &Path) {
        self.ledger.record(path);
    }

    /// Whether `path` changed since it was last checked or subscribed.
    pub fn is_modified(&mut self, path: &Path) -> bool {
        self.ledger.is_modified(path)
    }

    pub fn is_watching(&self, path: &Path, target: &WatchTarget) -> bool {
        self.subscriptions
            .get(path)
            .map(|targets| targets.contains(target))
            .unwrap_or(false)
    }

    /// Subscriptions an event on `path` belongs to, as `(subscribed path, target)`.
    pub fn targets_for(&self, path: &Path) -> Vec<(PathBuf, WatchTarget)> {
        let mut matched = Vec::new();
        for (subscribed, targets) in &self.subscriptions {
            for target in targets {
                let hit = match target {
                    WatchTarget::ConfigRoot => path.starts_with(subscribed),
                    WatchTarget::SourceFile(_) => path == subscribed,
                    WatchTarget::RootParent => path == subscribed || path.parent() == Some(subscribed.as_path()),
                };
                if hit {
                    matched.push((subscribed.clone(), target.clone()));
                }
            }
        }
        matched
    }

    /// Every subscribed path with its targets.
    pub fn subscriptions(&self) -> impl Iterator<Item = (&Path, &BTreeSet<WatchTarget>)> {
        self.subscriptions.iter().map(|(path, targets)| (path.as_path(), targets))
    }

    /// Paths subscribed for the given source rule set.
    pub fn source_paths(&self, id: &str) -> Vec<PathBuf> {
        let target = WatchTarget::SourceFile(id.to_string());
        self.subscriptions
            .iter()
            .filter(|(_, targets)| targets.contains(&target))
            .map(|(path, _)| path.clone())
            .collect()
    }

    fn release(&mut self, backend_path: &Path) {
        match self.backend.unwatch(backend_path) {
            Ok(()) => debug!(path = %backend_path.display(), "released watch"),
            Err(e) => warn!(path = %backend_path.display(), error = %e, "failed to release watch"),
        }
    }
}

fn backend_location(path: &Path, target: &WatchTarget) -> (PathBuf, bool) {
    match target {
        WatchTarget::SourceFile(_) => (
            path.parent().map(Path::to_path_buf).unwrap_or_else(|| path.to_path_buf()),
            false,
        ),
        _ => (path.to_path_buf(), target.is_recursive()),
    }
}
