//! Tests for the controller lifecycle and event handling.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use persona_core::{Config, RuleSetKind};
use tempfile::TempDir;

use super::*;
use crate::error::OverlayError;
use crate::registry::{MemoryRegistry, RuleSetDefinition};
use crate::watch::ManualBackend;

const KEYS: &str = "user.core.keys";
const VSCODE: &str = "user.apps.vscode.talon";
const TAG: &str = "user.personalization";

struct Fixture {
    _dir: TempDir,
    root: PathBuf,
    registry: Arc<MemoryRegistry>,
    backend: ManualBackend,
    controller: Controller,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("user");
        fs::create_dir_all(root.join("settings/personalization")).unwrap();

        let registry = Arc::new(MemoryRegistry::new());
        registry.insert(
            KEYS,
            RuleSetDefinition::default()
                .with_match("mode: command")
                .with_list("user.letter", [("air", "a"), ("bat", "b")]),
        );
        registry.insert(
            VSCODE,
            RuleSetDefinition::default()
                .with_match("app: vscode")
                .with_command("save file", "key(ctrl-s)")
                .with_command("close tab", "key(ctrl-w)"),
        );

        let backend = ManualBackend::new();
        let controller = Controller::new(&Config::for_root(root.clone()), registry.clone(), Box::new(backend.clone())).unwrap();
        Self {
            _dir: dir,
            root,
            registry,
            backend,
            controller,
        }
    }

    fn config_dir(&self) -> PathBuf {
        self.root.join("settings/personalization")
    }

    /// Write a file under the config dir with a fixed modification time.
    fn write_config(&self, name: &str, contents: &str, mtime: u64) -> PathBuf {
        let path = self.config_dir().join(name);
        write_at(&path, contents, mtime);
        path
    }

    fn artifact(&self, id: &str) -> PathBuf {
        self.controller.artifact_path(id).unwrap()
    }
}

fn write_at(path: &Path, contents: &str, mtime: u64) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + mtime))
        .unwrap();
}

fn list_setup(fx: &Fixture) -> PathBuf {
    fx.write_config("list_personalization.csv", "ADD,user.core.keys,user.letter,letters.csv\n", 0);
    fx.write_config("letters.csv", "cap,c\n", 0)
}

#[test]
fn enable_writes_artifacts_and_activates_tag() {
    let fx = Fixture::new();
    list_setup(&fx);

    let report = fx.controller.enable();
    assert!(report.is_clean(), "{}", report);
    assert_eq!(report.written, vec![fx.artifact(KEYS)]);
    assert_eq!(fx.controller.state(), EngineState::Active);
    assert!(fx.registry.is_tag_active(TAG));
    assert!(fx.backend.is_watching(&fx.config_dir()));

    let text = fs::read_to_string(fx.artifact(KEYS)).unwrap();
    assert!(text.contains("\"cap\": \"c\","));
    assert!(text.contains("\"air\": \"a\","));
    assert_eq!(fx.controller.configured().get(KEYS), Some(&RuleSetKind::List));
}

#[test]
fn enable_twice_does_nothing_the_second_time() {
    let fx = Fixture::new();
    list_setup(&fx);
    fx.controller.enable();
    assert!(fx.controller.enable().is_empty());
}

#[test]
fn disable_removes_artifacts_watches_and_tag() {
    let fx = Fixture::new();
    list_setup(&fx);
    fx.controller.enable();

    let report = fx.controller.disable();
    assert_eq!(report.removed, vec![fx.artifact(KEYS)]);
    assert!(!fx.artifact(KEYS).exists());
    assert_eq!(fx.controller.state(), EngineState::Disabled);
    assert!(!fx.registry.is_tag_active(TAG));
    assert!(fx.backend.watched().is_empty());
    assert!(fx.controller.configured().is_empty());
    assert!(fx.controller.overlay(KEYS).is_none());
}

#[test]
fn data_file_change_reconciles_once() {
    let fx = Fixture::new();
    let letters = list_setup(&fx);
    fx.controller.enable();

    write_at(&letters, "cap,c\ndog,d\n", 10);
    let report = fx.controller.handle_fs_event(&letters);
    assert_eq!(report.written, vec![fx.artifact(KEYS)]);
    assert!(fs::read_to_string(fx.artifact(KEYS)).unwrap().contains("\"dog\": \"d\""));

    // Same modification time: a duplicate notification.
    assert!(fx.controller.handle_fs_event(&letters).is_empty());
}

#[test]
fn unchanged_contents_are_not_rewritten() {
    let fx = Fixture::new();
    let letters = list_setup(&fx);
    fx.controller.enable();

    write_at(&letters, "cap,c\n", 20);
    let report = fx.controller.handle_fs_event(&letters);
    assert!(report.written.is_empty());
    assert_eq!(report.unchanged, vec![fx.artifact(KEYS)]);
}

#[test]
fn directory_and_unrelated_events_are_ignored() {
    let fx = Fixture::new();
    list_setup(&fx);
    fx.controller.enable();

    let subdir = fx.config_dir().join("drafts");
    fs::create_dir_all(&subdir).unwrap();
    assert!(fx.controller.handle_fs_event(&subdir).is_empty());

    let notes = fx.write_config("notes.csv", "x,y\n", 5);
    assert!(fx.controller.handle_fs_event(&notes).is_empty());
}

#[test]
fn removing_a_directive_removes_its_artifact() {
    let fx = Fixture::new();
    list_setup(&fx);
    fx.controller.enable();

    let control = fx.write_config("list_personalization.csv", "# nothing configured\n", 30);
    let report = fx.controller.handle_fs_event(&control);
    assert_eq!(report.removed, vec![fx.artifact(KEYS)]);
    assert!(fx.controller.configured().is_empty());
}

#[test]
fn command_override_of_unknown_rule_writes_nothing() {
    let fx = Fixture::new();
    fx.write_config("command_personalization.csv", "ADD,user.apps.vscode.talon,vscode.csv\n", 0);
    fx.write_config("vscode.csv", "open sesame,open\n", 0);

    let report = fx.controller.enable();
    assert!(report.written.is_empty());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].line, 1);
    assert!(matches!(report.failures[0].error, OverlayError::UnknownRule { .. }));
    assert!(!fx.artifact(VSCODE).exists());
    // Still configured, so a later registry change retries it.
    assert_eq!(fx.controller.configured().get(VSCODE), Some(&RuleSetKind::Command));
}

#[test]
fn command_artifact_is_written_after_lists() {
    let fx = Fixture::new();
    list_setup(&fx);
    fx.write_config(
        "command_personalization.csv",
        "REPLACE,user.apps.vscode.talon,vscode.csv\nDELETE,user.apps.vscode.talon,vscode_delete.csv\n",
        0,
    );
    fx.write_config("vscode.csv", "save file,store it\n", 0);
    fx.write_config("vscode_delete.csv", "close tab\n", 0);

    let report = fx.controller.enable();
    assert_eq!(report.written, vec![fx.artifact(KEYS), fx.artifact(VSCODE)]);

    let text = fs::read_to_string(fx.artifact(VSCODE)).unwrap();
    assert!(text.contains("app: vscode\ntag: user.personalization\n-\n"));
    assert!(text.contains("\nstore it:\n    key(ctrl-s)\n"));
    assert!(text.contains("\nclose tab:\n    skip()\n"));
}

#[test]
fn registry_events_for_generated_or_unconfigured_ids_are_ignored() {
    let fx = Fixture::new();
    list_setup(&fx);
    fx.controller.enable();

    let generated = RegistryEvent::Added("user._personalization_generated.core.keys".to_string());
    assert!(fx.controller.handle_registry_event(&generated).is_empty());

    let unrelated = RegistryEvent::Added("user.core.other".to_string());
    assert!(fx.controller.handle_registry_event(&unrelated).is_empty());
}

#[test]
fn configured_rule_set_follows_the_registry() {
    let fx = Fixture::new();
    list_setup(&fx);
    fx.controller.enable();

    let removed = fx.registry.remove(KEYS).unwrap();
    let report = fx.controller.handle_registry_event(&removed);
    assert_eq!(report.removed, vec![fx.artifact(KEYS)]);
    assert_eq!(report.failures.len(), 1);
    assert!(fx.controller.overlay(KEYS).is_none());
    assert!(fx.controller.configured().contains_key(KEYS));

    let added = fx.registry.insert(
        KEYS,
        RuleSetDefinition::default().with_list("user.letter", [("zap", "z")]),
    );
    let report = fx.controller.handle_registry_event(&added);
    assert_eq!(report.written, vec![fx.artifact(KEYS)]);
    let text = fs::read_to_string(fx.artifact(KEYS)).unwrap();
    assert!(text.contains("\"zap\": \"z\""));
    assert!(!text.contains("\"air\""));
}

#[test]
fn root_removal_unloads_and_reappearance_reloads() {
    let fx = Fixture::new();
    list_setup(&fx);
    fx.controller.enable();

    fs::remove_dir_all(fx.config_dir()).unwrap();
    let report = fx.controller.handle_fs_event(&fx.config_dir());
    assert_eq!(report.removed, vec![fx.artifact(KEYS)]);
    assert!(fx.controller.is_waiting_for_root());
    assert!(fx.controller.configured().is_empty());
    assert_eq!(fx.backend.watched(), vec![(fx.root.join("settings"), false)]);

    list_setup(&fx);
    let report = fx.controller.handle_fs_event(&fx.config_dir());
    assert!(!fx.controller.is_waiting_for_root());
    assert_eq!(report.written, vec![fx.artifact(KEYS)]);
    assert!(fx.backend.is_watching(&fx.config_dir()));
    assert!(!fx.backend.is_watching(&fx.root.join("settings")));
}

#[test]
fn waiting_follows_recreated_ancestors() {
    let fx = Fixture::new();
    fs::remove_dir_all(fx.root.join("settings")).unwrap();

    fx.controller.enable();
    assert!(fx.controller.is_waiting_for_root());
    assert_eq!(fx.backend.watched(), vec![(fx.root.clone(), false)]);

    fs::create_dir_all(fx.root.join("settings")).unwrap();
    assert!(fx.controller.handle_fs_event(&fx.root.join("settings")).is_empty());
    assert_eq!(fx.backend.watched(), vec![(fx.root.join("settings"), false)]);
    assert!(fx.controller.is_waiting_for_root());
}

#[test]
fn source_files_of_configured_rule_sets_are_watched() {
    let fx = Fixture::new();
    list_setup(&fx);
    let source = fx.root.join("core/keys.py");
    write_at(&source, "# keys\n", 0);

    fx.controller.enable();
    assert!(fx.backend.is_watching(&fx.root.join("core")));

    // A source change with a new modification time rebuilds that rule set.
    write_at(&source, "# keys, edited\n", 40);
    let report = fx.controller.handle_fs_event(&source);
    assert_eq!(report.unchanged, vec![fx.artifact(KEYS)]);

    let control = fx.write_config("list_personalization.csv", "", 50);
    fx.controller.handle_fs_event(&control);
    assert!(!fx.backend.is_watching(&fx.root.join("core")));
}

#[test]
fn stale_artifacts_are_swept_on_enable() {
    let fx = Fixture::new();
    let stale = fx.controller.output_root().join("apps/old.talon");
    write_at(&stale, "# leftover\n", 0);

    let report = fx.controller.enable();
    assert_eq!(report.removed, vec![stale.clone()]);
    assert!(!stale.exists());
}

#[test]
fn events_are_ignored_while_disabled() {
    let fx = Fixture::new();
    let letters = list_setup(&fx);
    assert!(fx.controller.handle_fs_event(&letters).is_empty());
    assert!(fx
        .controller
        .handle_registry_event(&RegistryEvent::Added(KEYS.to_string()))
        .is_empty());
    assert!(!fx.artifact(KEYS).exists());
}

#[test]
fn list_row_naming_a_command_rule_set_leaves_its_override_alone() {
    let fx = Fixture::new();
    fx.write_config("command_personalization.csv", "DELETE,user.apps.vscode.talon,del.csv\n", 0);
    fx.write_config("del.csv", "close tab\n", 0);
    fx.write_config("letters.csv", "cap,c\n", 0);
    fx.write_config("list_personalization.csv", "ADD,user.apps.vscode.talon,user.letter,letters.csv\n", 0);

    let report = fx.controller.enable();
    assert_eq!(report.written, vec![fx.artifact(VSCODE)]);
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(
        report.failures[0].error,
        OverlayError::WrongKind { expected: RuleSetKind::List, .. }
    ));
    assert_eq!(fx.controller.configured().get(VSCODE), Some(&RuleSetKind::Command));

    let control = fx.write_config(
        "list_personalization.csv",
        "ADD,user.apps.vscode.talon,user.letter,letters.csv\n",
        10,
    );
    fx.controller.handle_fs_event(&control);
    fx.controller
        .handle_registry_event(&RegistryEvent::Added(VSCODE.to_string()));

    assert!(fx.artifact(VSCODE).exists());
    assert!(fx.controller.overlay(VSCODE).is_some());
    assert_eq!(fx.controller.configured().get(VSCODE), Some(&RuleSetKind::Command));
}
