//! End-to-end reconciliation against a filesystem-backed registry.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use persona_core::{Config, PathMapper};
use persona_engine::overlay::OverlayState;
use persona_engine::registry::{FsRegistry, RegistryEvent, RuleRegistry};
use persona_engine::watch::ManualBackend;
use persona_engine::{Controller, OverlayError};
use tempfile::TempDir;

const MYLIST: &str = "user.module.mylist";
const EDITOR: &str = "user.apps.editor.talon";

struct Workspace {
    _dir: TempDir,
    root: PathBuf,
    config: Config,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().expect("create tempdir");
        let root = dir.path().join("user");
        let ws = Self {
            config: Config::for_root(root.clone()),
            root,
            _dir: dir,
        };
        ws.write("module/mylist.talon-list", "list: user.mylist\n-\ngreen: 00FF00\n", 0);
        ws.write(
            "apps/editor.talon",
            "app: editor\n-\ntag(): user.tabs\n\nsave file: key(ctrl-s)\nclose tab: key(ctrl-w)\n",
            0,
        );
        fs::create_dir_all(&ws.config.paths.config_dir).unwrap();
        ws
    }

    fn write(&self, rel: &str, contents: &str, mtime: u64) -> PathBuf {
        let path = self.root.join(rel);
        write_at(&path, contents, mtime);
        path
    }

    fn write_config(&self, name: &str, contents: &str, mtime: u64) -> PathBuf {
        let path = self.config.paths.config_dir.join(name);
        write_at(&path, contents, mtime);
        path
    }

    fn start(&self) -> (Arc<FsRegistry>, Controller) {
        let registry = FsRegistry::new(PathMapper::from_config(&self.config));
        registry.load_all().unwrap();
        let registry = Arc::new(registry);
        let controller = Controller::new(&self.config, registry.clone(), Box::new(ManualBackend::new())).unwrap();
        (registry, controller)
    }
}

fn write_at(path: &Path, contents: &str, mtime: u64) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + mtime))
        .unwrap();
}

fn list_entries(controller: &Controller, id: &str, list: &str) -> Vec<(String, String)> {
    let state = controller.overlay(id).expect("overlay present");
    let overlay = state.as_list().expect("list overlay");
    overlay
        .list(list)
        .expect("list overridden")
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

#[test]
fn add_merges_rows_onto_the_base_list() {
    let ws = Workspace::new();
    ws.write_config("list_personalization.csv", "ADD,user.module.mylist,user.mylist,colors.csv\n", 0);
    ws.write_config("colors.csv", "red,FF0000\nblue,0000FF\n", 0);

    let (_registry, controller) = ws.start();
    let report = controller.enable();
    assert!(report.is_clean(), "{}", report);

    assert_eq!(
        list_entries(&controller, MYLIST, "user.mylist"),
        pairs(&[("blue", "0000FF"), ("green", "00FF00"), ("red", "FF0000")])
    );

    let artifact = fs::read_to_string(controller.artifact_path(MYLIST).unwrap()).unwrap();
    assert!(artifact.contains("# source: user.module.mylist\n"));
    assert!(artifact.contains("    \"red\": \"FF0000\",\n"));
}

#[test]
fn replace_without_data_file_clears_the_list() {
    let ws = Workspace::new();
    ws.write_config("list_personalization.csv", "REPLACE,user.module.mylist,user.mylist\n", 0);

    let (_registry, controller) = ws.start();
    controller.enable();

    assert!(list_entries(&controller, MYLIST, "user.mylist").is_empty());
    let artifact = fs::read_to_string(controller.artifact_path(MYLIST).unwrap()).unwrap();
    assert!(artifact.ends_with("ctx.lists[\"user.mylist\"] = {}\n"));
}

#[test]
fn delete_of_absent_key_is_skipped() {
    let ws = Workspace::new();
    ws.write_config(
        "list_personalization.csv",
        "ADD,user.module.mylist,user.mylist,colors.csv\nDELETE,user.module.mylist,user.mylist,gone.csv\n",
        0,
    );
    ws.write_config("colors.csv", "red,FF0000\n", 0);
    ws.write_config("gone.csv", "green\npurple\n", 0);

    let (_registry, controller) = ws.start();
    let report = controller.enable();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].line, 2);
    assert!(matches!(report.failures[0].error, OverlayError::MissingKey { ref key, .. } if key == "purple"));
    // "green" is not removed: the failed directive has no effect at all.
    assert_eq!(
        list_entries(&controller, MYLIST, "user.mylist"),
        pairs(&[("green", "00FF00"), ("red", "FF0000")])
    );
}

#[test]
fn command_override_of_unknown_rule_writes_no_artifact() {
    let ws = Workspace::new();
    ws.write_config("command_personalization.csv", "ADD,user.apps.editor.talon,editor.csv\n", 0);
    ws.write_config("editor.csv", "open sesame,open\n", 0);

    let (_registry, controller) = ws.start();
    let report = controller.enable();

    assert!(matches!(report.failures[0].error, OverlayError::UnknownRule { .. }));
    assert!(report.written.is_empty());
    assert!(controller.overlay(EDITOR).is_none());
    assert!(!controller.artifact_path(EDITOR).unwrap().exists());
}

#[test]
fn command_artifact_keeps_match_and_tag_invocations() {
    let ws = Workspace::new();
    ws.write_config("command_personalization.csv", "ADD,user.apps.editor.talon,editor.csv\n", 0);
    ws.write_config("editor.csv", "save file,store it\n", 0);

    let (_registry, controller) = ws.start();
    controller.enable();

    let path = controller.artifact_path(EDITOR).unwrap();
    assert_eq!(path, ws.root.join("_personalization_generated/apps/editor.talon"));
    let artifact = fs::read_to_string(path).unwrap();
    assert!(artifact.contains("app: editor\ntag: user.personalization\n-\ntag(): user.tabs\n"));
    assert!(artifact.ends_with("\nstore it:\n    key(ctrl-s)\n"));
}

#[test]
fn regeneration_is_byte_identical() {
    let ws = Workspace::new();
    let control = ws.write_config("list_personalization.csv", "ADD,user.module.mylist,user.mylist,colors.csv\n", 0);
    ws.write_config("colors.csv", "red,FF0000\n", 0);

    let (_registry, controller) = ws.start();
    controller.enable();
    let path = controller.artifact_path(MYLIST).unwrap();
    let first = fs::read(&path).unwrap();

    write_at(&control, "ADD,user.module.mylist,user.mylist,colors.csv\n", 10);
    let report = controller.handle_fs_event(&control);
    assert_eq!(report.unchanged, vec![path.clone()]);
    assert_eq!(fs::read(&path).unwrap(), first);
}

#[test]
fn generated_artifacts_seen_by_the_registry_are_ignored() {
    let ws = Workspace::new();
    ws.write_config("command_personalization.csv", "DELETE,user.apps.editor.talon,editor.csv\n", 0);
    ws.write_config("editor.csv", "close tab\n", 0);

    let (registry, controller) = ws.start();
    controller.enable();

    let artifact = controller.artifact_path(EDITOR).unwrap();
    let events = registry.refresh_path(&artifact);
    assert_eq!(
        events,
        vec![RegistryEvent::Added("user._personalization_generated.apps.editor.talon".to_string())]
    );
    assert!(controller.handle_registry_event(&events[0]).is_empty());
}

#[test]
fn source_edits_flow_through_the_registry() {
    let ws = Workspace::new();
    ws.write_config("command_personalization.csv", "ADD,user.apps.editor.talon,editor.csv\n", 0);
    ws.write_config("editor.csv", "save file,store it\n", 0);

    let (registry, controller) = ws.start();
    controller.enable();

    let source = ws.write(
        "apps/editor.talon",
        "app: editor\n-\nsave file:\n    key(ctrl-s)\n    sleep(100ms)\n",
        20,
    );
    let mut written = Vec::new();
    for event in registry.refresh_path(&source) {
        written.extend(controller.handle_registry_event(&event).written);
    }
    assert_eq!(written, vec![controller.artifact_path(EDITOR).unwrap()]);

    let state = controller.overlay(EDITOR).unwrap();
    assert!(matches!(state, OverlayState::Command(ref overlay) if overlay.get("store it") == Some("key(ctrl-s)\nsleep(100ms)")));
    assert!(registry.is_tag_active("user.personalization"));
}

#[test]
fn teardown_removes_every_artifact() {
    let ws = Workspace::new();
    ws.write_config("list_personalization.csv", "REPLACE,user.module.mylist,user.mylist\n", 0);
    ws.write_config("command_personalization.csv", "DELETE,user.apps.editor.talon,editor.csv\n", 0);
    ws.write_config("editor.csv", "close tab\n", 0);

    let (registry, controller) = ws.start();
    assert_eq!(controller.enable().written.len(), 2);

    let report = controller.disable();
    assert_eq!(report.removed.len(), 2);
    assert!(!controller.output_root().join("module").exists());
    assert!(!controller.output_root().join("apps").exists());
    assert!(!registry.is_tag_active("user.personalization"));
    assert!(registry.contains(MYLIST));
}

#[test]
fn registry_excluding_the_output_root_skips_artifacts() {
    let ws = Workspace::new();
    ws.write_config("command_personalization.csv", "DELETE,user.apps.editor.talon,editor.csv\n", 0);
    ws.write_config("editor.csv", "close tab\n", 0);

    let (_registry, controller) = ws.start();
    controller.enable();
    let artifact = controller.artifact_path(EDITOR).unwrap();
    assert!(artifact.exists());

    let rescanned = FsRegistry::new(PathMapper::from_config(&ws.config)).excluding(ws.config.paths.output_root());
    rescanned.load_all().unwrap();
    assert!(rescanned
        .rule_sets()
        .iter()
        .all(|id| !id.starts_with("user._personalization_generated.")));
    assert!(rescanned.contains(EDITOR));
    assert!(rescanned.refresh_path(&artifact).is_empty());
}
