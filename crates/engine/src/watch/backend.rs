//! Watch backends: notify for real filesystems, a manual one for hosts that
//! deliver events themselves.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

use crate::error::{OverlayError, Result};

/// Registers and releases OS-level watches.
pub trait WatchBackend: Send {
    fn watch(&mut self, path: &Path, recursive: bool) -> Result<()>;

    fn unwatch(&mut self, path: &Path) -> Result<()>;
}

/// Backend on top of `notify`'s recommended watcher.
///
/// Every created, modified or removed path is handed to the callback given
/// at construction; filtering happens in the controller.
pub struct NotifyBackend {
    watcher: RecommendedWatcher,
}

impl NotifyBackend {
    pub fn new<F>(on_event: F) -> Result<Self>
    where
        F: Fn(PathBuf) + Send + 'static,
    {
        let watcher = notify::recommended_watcher(
            move |res: std::result::Result<Event, notify::Error>| match res {
                Ok(event) => forward_event(&event, &on_event),
                Err(e) => warn!(error = %e, "watch backend error"),
            },
        )?;
        Ok(Self { watcher })
    }
}

fn forward_event<F>(event: &Event, on_event: &F)
where
    F: Fn(PathBuf),
{
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return;
    }
    for path in &event.paths {
        // Skip dotfiles (atomic-write temporaries among them)
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(false);
        if hidden {
            continue;
        }
        debug!(path = %path.display(), kind = ?event.kind, "filesystem event");
        on_event(path.clone());
    }
}

impl WatchBackend for NotifyBackend {
    fn watch(&mut self, path: &Path, recursive: bool) -> Result<()> {
        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        self.watcher.watch(path, mode)?;
        Ok(())
    }

    fn unwatch(&mut self, path: &Path) -> Result<()> {
        self.watcher.unwatch(path)?;
        Ok(())
    }
}

/// Backend that only records registrations.
///
/// Used by one-shot runs and by hosts that feed paths to the controller
/// themselves. Cloning shares the registration table.
#[derive(Debug, Clone, Default)]
pub struct ManualBackend {
    watched: Arc<Mutex<BTreeMap<PathBuf, bool>>>,
}

impl ManualBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_watching(&self, path: &Path) -> bool {
        self.watched
            .lock()
            .expect("watched lock poisoned")
            .contains_key(path)
    }

    /// Registered paths with their recursive flag.
    pub fn watched(&self) -> Vec<(PathBuf, bool)> {
        self.watched
            .lock()
            .expect("watched lock poisoned")
            .iter()
            .map(|(path, recursive)| (path.clone(), *recursive))
            .collect()
    }
}

impl WatchBackend for ManualBackend {
    fn watch(&mut self, path: &Path, recursive: bool) -> Result<()> {
        if !path.exists() {
            return Err(OverlayError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("cannot watch missing path {}", path.display()),
            )));
        }
        self.watched
            .lock()
            .expect("watched lock poisoned")
            .insert(path.to_path_buf(), recursive);
        Ok(())
    }

    fn unwatch(&mut self, path: &Path) -> Result<()> {
        self.watched
            .lock()
            .expect("watched lock poisoned")
            .remove(path);
        Ok(())
    }
}
