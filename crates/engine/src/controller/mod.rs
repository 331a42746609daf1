//! Reconciliation controller: the engine's lifecycle and event entry points.
//!
//! One [`Controller`] owns all mutable engine state behind a single mutex:
//! overlays, the configured set, the data-file index and the watch
//! subscriptions. Hosts call [`Controller::enable`] on ready,
//! [`Controller::disable`] on shutdown, and forward filesystem and registry
//! notifications to the `handle_*` methods. Every call returns a
//! [`ReconcileReport`] describing what it did.

mod reconcile;
mod report;

#[cfg(test)]
mod tests;

pub use self::report::ReconcileReport;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use persona_core::{Config, PathMapper, RuleSetKind};
use tracing::{debug, info, warn};

use crate::artifact::ArtifactWriter;
use crate::directive::DirectiveParser;
use crate::error::Result;
use crate::overlay::{OverlayState, OverlayStore};
use crate::registry::{RegistryEvent, RuleRegistry};
use crate::watch::{WatchBackend, WatchManager, WatchTarget};

/// Lifecycle state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Disabled,
    Loading,
    Active,
    Unloading,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Disabled => write!(f, "disabled"),
            EngineState::Loading => write!(f, "loading"),
            EngineState::Active => write!(f, "active"),
            EngineState::Unloading => write!(f, "unloading"),
        }
    }
}

struct ControllerInner {
    state: EngineState,
    /// Set while the configuration root is missing.
    waiting_for_root: bool,
    /// Ancestor watched while waiting for the root to reappear.
    root_parent: Option<PathBuf>,
    overlays: OverlayStore,
    /// Rule sets named by at least one directive, loaded in the registry or not.
    configured: BTreeMap<String, RuleSetKind>,
    /// Data file to the categories whose control files reference it.
    data_files: HashMap<PathBuf, BTreeSet<RuleSetKind>>,
    watches: WatchManager,
}

/// Orchestrates load, unload and selective regeneration of overlays.
pub struct Controller {
    mapper: PathMapper,
    parser: DirectiveParser,
    registry: Arc<dyn RuleRegistry>,
    writer: ArtifactWriter,
    list_control: PathBuf,
    command_control: PathBuf,
    /// Identifier prefix of everything under the output root.
    generated_prefix: String,
    tag: String,
    inner: Mutex<ControllerInner>,
}

impl Controller {
    pub fn new(config: &Config, registry: Arc<dyn RuleRegistry>, backend: Box<dyn WatchBackend>) -> Result<Self> {
        let mapper = PathMapper::from_config(config);
        let parser = DirectiveParser::new(mapper.clone(), &config.paths.config_dir, &config.personalization);
        let output_root = config.paths.output_root();
        let generated_prefix = mapper.id_prefix_for(&output_root)?;
        let config_root = parser.config_root().to_path_buf();

        Ok(Self {
            list_control: config_root.join(&config.personalization.list_control_file),
            command_control: config_root.join(&config.personalization.command_control_file),
            mapper,
            parser,
            registry,
            writer: ArtifactWriter::new(output_root),
            generated_prefix,
            tag: config.personalization.tag.clone(),
            inner: Mutex::new(ControllerInner {
                state: EngineState::Disabled,
                waiting_for_root: false,
                root_parent: None,
                overlays: OverlayStore::new(),
                configured: BTreeMap::new(),
                data_files: HashMap::new(),
                watches: WatchManager::new(backend),
            }),
        })
    }

    /// Load every directive, write all artifacts, start watching and turn
    /// the capability tag on.
    ///
    /// A missing configuration root is not an error: the controller becomes
    /// active with no overlays and waits for the root to appear.
    pub fn enable(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut inner = self.lock();
        if inner.state != EngineState::Disabled {
            debug!(state = %inner.state, "enable ignored, controller not disabled");
            return report;
        }

        inner.state = EngineState::Loading;
        info!(config_root = %self.config_root().display(), "loading personalization");
        self.load(&mut inner, &mut report);
        self.sweep_stale_artifacts(&inner, &mut report);
        self.registry.set_tag_active(&self.tag, true);
        inner.state = EngineState::Active;

        info!(
            overlays = inner.overlays.len(),
            configured = inner.configured.len(),
            written = report.written.len(),
            failures = report.failures.len(),
            "personalization active"
        );
        report
    }

    /// Delete all artifacts, drop every watch, clear the tag and all state.
    pub fn disable(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut inner = self.lock();
        if inner.state == EngineState::Disabled {
            debug!("disable ignored, controller already disabled");
            return report;
        }

        inner.state = EngineState::Unloading;
        info!("unloading personalization");
        self.unload_all(&mut inner, &mut report);
        inner.watches.unwatch_all();
        inner.waiting_for_root = false;
        inner.root_parent = None;
        self.registry.set_tag_active(&self.tag, false);
        inner.state = EngineState::Disabled;

        info!(removed = report.removed.len(), "personalization disabled");
        report
    }

    /// React to a filesystem notification for `path`.
    ///
    /// Control-file changes reconcile their category, data-file changes
    /// reconcile every category referencing them, and source-file changes
    /// rebuild that one rule set. Notifications that do not reflect a new
    /// modification time are dropped.
    pub fn handle_fs_event(&self, path: &Path) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut inner = self.lock();
        if inner.state != EngineState::Active {
            debug!(path = %path.display(), state = %inner.state, "ignoring filesystem event while not active");
            return report;
        }

        if inner.waiting_for_root {
            if !self.config_root().is_dir() {
                self.wait_for_root(&mut inner);
            }
            // Checked again: the root may appear while the ancestor watch moves.
            if self.config_root().is_dir() {
                self.resume(&mut inner, &mut report);
            }
            return report;
        }
        if !self.config_root().is_dir() {
            self.enter_waiting(&mut inner, &mut report);
            return report;
        }

        let mut kinds = BTreeSet::new();
        let mut ids = BTreeSet::new();
        for (_, target) in inner.watches.targets_for(path) {
            match target {
                WatchTarget::ConfigRoot => {
                    if path.extension().is_none() {
                        debug!(path = %path.display(), "ignoring directory event");
                        continue;
                    }
                    let affected: Vec<RuleSetKind> = match self.control_kind(path) {
                        Some(kind) => vec![kind],
                        None => match inner.data_files.get(path) {
                            Some(kinds) => kinds.iter().copied().collect(),
                            None => {
                                debug!(path = %path.display(), "ignoring unreferenced file");
                                continue;
                            }
                        },
                    };
                    if inner.watches.is_modified(path) {
                        kinds.extend(affected);
                    } else {
                        debug!(path = %path.display(), "modification time unchanged, skipping");
                    }
                }
                WatchTarget::SourceFile(id) => {
                    if inner.watches.is_modified(path) {
                        ids.insert(id);
                    } else {
                        debug!(path = %path.display(), "modification time unchanged, skipping");
                    }
                }
                WatchTarget::RootParent => {}
            }
        }

        for kind in RuleSetKind::ALL {
            if kinds.contains(&kind) {
                info!(kind = %kind, path = %path.display(), "directives changed, reconciling");
                self.reconcile_kind(&mut inner, kind, &mut report);
            }
        }
        for id in ids {
            let covered = inner.configured.get(&id).is_some_and(|kind| kinds.contains(kind));
            if !covered {
                info!(rule_set = %id, path = %path.display(), "source changed, rebuilding");
                self.rebuild(&mut inner, &id, &mut report);
            }
        }
        report
    }

    /// React to a rule set being added to or removed from the base registry.
    pub fn handle_registry_event(&self, event: &RegistryEvent) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut inner = self.lock();
        if inner.state != EngineState::Active {
            debug!(event = %event, state = %inner.state, "ignoring registry event while not active");
            return report;
        }

        let id = event.id();
        if id.starts_with(&self.generated_prefix) {
            debug!(event = %event, "ignoring registry event for generated artifact");
            return report;
        }
        if !inner.configured.contains_key(id) {
            debug!(event = %event, "ignoring registry event for unconfigured rule set");
            return report;
        }

        info!(event = %event, "configured rule set changed in registry, rebuilding");
        self.rebuild(&mut inner, id, &mut report);
        report
    }

    pub fn state(&self) -> EngineState {
        self.lock().state
    }

    pub fn is_waiting_for_root(&self) -> bool {
        self.lock().waiting_for_root
    }

    /// Current overlay of a rule set.
    pub fn overlay(&self, id: &str) -> Option<OverlayState> {
        self.lock().overlays.get(id).cloned()
    }

    /// Snapshot of the configured set with each identifier's category.
    pub fn configured(&self) -> BTreeMap<String, RuleSetKind> {
        self.lock().configured.clone()
    }

    pub fn config_root(&self) -> &Path {
        self.parser.config_root()
    }

    pub fn output_root(&self) -> &Path {
        self.writer.output_root()
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Where the artifact overriding `id` lives.
    pub fn artifact_path(&self, id: &str) -> Result<PathBuf> {
        Ok(self.mapper.artifact_path(self.writer.output_root(), id)?)
    }

    fn lock(&self) -> MutexGuard<'_, ControllerInner> {
        self.inner.lock().expect("controller lock poisoned")
    }

    fn control_path(&self, kind: RuleSetKind) -> &Path {
        match kind {
            RuleSetKind::List => &self.list_control,
            RuleSetKind::Command => &self.command_control,
        }
    }

    fn control_kind(&self, path: &Path) -> Option<RuleSetKind> {
        RuleSetKind::ALL
            .into_iter()
            .find(|kind| self.control_path(*kind) == path)
    }

    /// Watch the root and reconcile both categories, lists first.
    fn load(&self, inner: &mut ControllerInner, report: &mut ReconcileReport) {
        if !self.config_root().is_dir() {
            self.enter_waiting(inner, report);
            return;
        }
        if let Err(e) = inner.watches.watch(self.config_root(), WatchTarget::ConfigRoot) {
            warn!(path = %self.config_root().display(), error = %e, "failed to watch configuration root");
        }
        for kind in RuleSetKind::ALL {
            self.reconcile_kind(inner, kind, report);
        }
    }

    /// The root is gone: unload everything it configured and wait for it.
    fn enter_waiting(&self, inner: &mut ControllerInner, report: &mut ReconcileReport) {
        warn!(
            path = %self.config_root().display(),
            "configuration root missing, unloading overlays until it reappears"
        );
        self.unload_all(inner, report);
        inner.watches.unwatch_all();
        inner.root_parent = None;
        inner.waiting_for_root = true;
        self.wait_for_root(inner);
    }

    /// Watch the nearest existing ancestor of the root, moving the watch
    /// down as intermediate directories are recreated.
    fn wait_for_root(&self, inner: &mut ControllerInner) {
        let ancestor = self
            .config_root()
            .ancestors()
            .skip(1)
            .find(|dir| dir.is_dir())
            .map(Path::to_path_buf);
        if ancestor == inner.root_parent {
            return;
        }

        if let Some(previous) = inner.root_parent.take() {
            inner.watches.unwatch(&previous, &WatchTarget::RootParent);
        }
        let Some(ancestor) = ancestor else {
            warn!(path = %self.config_root().display(), "no existing ancestor to watch for the configuration root");
            return;
        };
        match inner.watches.watch(&ancestor, WatchTarget::RootParent) {
            Ok(()) => {
                info!(path = %ancestor.display(), "waiting for configuration root to reappear");
                inner.root_parent = Some(ancestor);
            }
            Err(e) => warn!(path = %ancestor.display(), error = %e, "failed to watch for configuration root"),
        }
    }

    fn resume(&self, inner: &mut ControllerInner, report: &mut ReconcileReport) {
        info!(path = %self.config_root().display(), "configuration root reappeared, reloading");
        if let Some(previous) = inner.root_parent.take() {
            inner.watches.unwatch(&previous, &WatchTarget::RootParent);
        }
        inner.waiting_for_root = false;
        self.load(inner, report);
    }

    /// Drop every overlay and its artifact, and forget what was configured.
    fn unload_all(&self, inner: &mut ControllerInner, report: &mut ReconcileReport) {
        let ids: Vec<String> = inner.overlays.ids().map(str::to_string).collect();
        inner.overlays.clear();
        for id in &ids {
            self.commit_artifact(inner, id, report);
        }
        inner.configured.clear();
        inner.data_files.clear();
    }
}
