//! Filesystem event handler for the registry's notify watcher (hot-reload).

use std::path::PathBuf;

use notify::{Event, EventKind};
use tracing::debug;

use super::fs::LIST_FILE_EXTENSION;

/// Forward each rule or list file path touched by `event` to `on_change`.
pub(super) fn handle_fs_event<F>(event: &Event, rule_extension: &str, on_change: &F)
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
        let is_rule_set = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e == rule_extension || e == LIST_FILE_EXTENSION)
            .unwrap_or(false);
        if !is_rule_set {
            continue;
        }

        // Skip dotfiles (including our .tmp files)
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if name.starts_with('.') {
                continue;
            }
        }

        debug!(path = %path.display(), kind = ?event.kind, "rule file changed");
        on_change(path.clone());
    }
}
