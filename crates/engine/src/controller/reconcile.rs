//! Reconciliation passes: directives to overlays to artifacts.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use persona_core::RuleSetKind;
use tracing::{debug, error, warn};

use crate::artifact::{render_command_artifact, render_list_artifact, ArtifactContext, WriteOutcome};
use crate::directive::{Directive, DirectiveFailure, ParsedControl};
use crate::error::OverlayError;
use crate::overlay::{OverlayState, OverlayStore};
use crate::registry::talon::parse_talon_file;
use crate::watch::WatchTarget;

use super::{Controller, ControllerInner, ReconcileReport};

impl Controller {
    /// Rebuild every overlay of one category from its control file.
    ///
    /// Overlays are recomputed from scratch against the current registry,
    /// then only artifacts whose contents differ are rewritten. Rule sets
    /// that no longer have an overlay lose their artifact.
    pub(super) fn reconcile_kind(&self, inner: &mut ControllerInner, kind: RuleSetKind, report: &mut ReconcileReport) {
        let control = self.control_path(kind).to_path_buf();
        inner.watches.record(&control);
        let Some(parsed) = self.read_control(&control, kind, report) else {
            return;
        };

        for kinds in inner.data_files.values_mut() {
            kinds.remove(&kind);
        }
        inner.data_files.retain(|_, kinds| !kinds.is_empty());
        for path in &parsed.data_files {
            inner.data_files.entry(path.clone()).or_default().insert(kind);
            inner.watches.record(path);
        }

        let mut fresh = OverlayStore::new();
        for directive in &parsed.directives {
            self.apply_directive(&mut fresh, directive, &control, report);
        }
        report.failures.extend(parsed.failures);

        inner.configured.retain(|_, k| *k != kind);
        for directive in &parsed.directives {
            inner.configured.insert(directive.source.clone(), kind);
        }

        let previous = inner.overlays.clear_kind(kind);
        let current: Vec<String> = fresh.ids().map(str::to_string).collect();
        inner.overlays.merge(fresh);
        for id in previous.iter().filter(|id| !current.contains(id)) {
            self.commit_artifact(inner, id, report);
        }
        for id in &current {
            self.commit_artifact(inner, id, report);
        }

        self.sync_source_watches(inner);
    }

    /// Rebuild the overlay of a single configured rule set.
    pub(super) fn rebuild(&self, inner: &mut ControllerInner, id: &str, report: &mut ReconcileReport) {
        let Some(kind) = inner.configured.get(id).copied() else {
            return;
        };
        let control = self.control_path(kind).to_path_buf();
        let Some(parsed) = self.read_control(&control, kind, report) else {
            return;
        };

        let directives: Vec<&Directive> = parsed.directives.iter().filter(|d| d.source == id).collect();
        if directives.is_empty() {
            debug!(rule_set = %id, "no directives left for rule set");
            inner.configured.remove(id);
        }

        let mut fresh = OverlayStore::new();
        for directive in directives {
            self.apply_directive(&mut fresh, directive, &control, report);
        }
        inner.overlays.remove(id);
        inner.overlays.merge(fresh);
        self.commit_artifact(inner, id, report);
        self.sync_source_watches(inner);
    }

    /// Parse a control file. A missing file means no directives; any other
    /// failure keeps the current state and returns `None`.
    fn read_control(&self, control: &Path, kind: RuleSetKind, report: &mut ReconcileReport) -> Option<ParsedControl> {
        match self.parser.parse_control_file(control, kind) {
            Ok(parsed) => Some(parsed),
            Err(OverlayError::NotFound(path)) => {
                debug!(path = %path.display(), kind = %kind, "no control file");
                Some(ParsedControl::default())
            }
            Err(e) => {
                error!(path = %control.display(), kind = %kind, error = %e, "failed to read control file");
                report.errors.push(e);
                None
            }
        }
    }

    /// Load a directive's data file and apply it. Failures skip the
    /// directive and leave the store as it was.
    fn apply_directive(
        &self,
        store: &mut OverlayStore,
        directive: &Directive,
        control: &Path,
        report: &mut ReconcileReport,
    ) {
        let rows = match &directive.data_file {
            Some(path) => self.parser.parse_data_file(path, directive.expected_arity()),
            None => Ok(Vec::new()),
        };
        let result = rows.and_then(|rows| store.apply(directive, &rows, self.registry.as_ref()));
        if let Err(error) = result {
            warn!(
                control = %control.display(),
                line = directive.line,
                rule_set = %directive.source,
                action = %directive.action,
                error = %error,
                "skipping directive"
            );
            report.failures.push(DirectiveFailure {
                control_file: control.to_path_buf(),
                line: directive.line,
                error,
            });
        }
    }

    /// Bring the artifact of `id` in line with its overlay: write it when
    /// an overlay exists, delete it otherwise.
    pub(super) fn commit_artifact(&self, inner: &ControllerInner, id: &str, report: &mut ReconcileReport) {
        let path = match self.mapper.artifact_path(self.writer.output_root(), id) {
            Ok(path) => path,
            Err(e) => {
                warn!(rule_set = %id, error = %e, "no artifact location for rule set");
                report.errors.push(e.into());
                return;
            }
        };

        match inner.overlays.get(id) {
            Some(state) => {
                let contents = self.render(id, state);
                match self.writer.write(&path, &contents) {
                    Ok(WriteOutcome::Written) => report.written.push(path),
                    Ok(WriteOutcome::Unchanged) => report.unchanged.push(path),
                    Err(e) => {
                        error!(rule_set = %id, path = %path.display(), error = %e, "failed to write artifact");
                        report.errors.push(e);
                    }
                }
            }
            None => match self.writer.remove(&path) {
                Ok(true) => report.removed.push(path),
                Ok(false) => {}
                Err(e) => {
                    error!(rule_set = %id, path = %path.display(), error = %e, "failed to remove artifact");
                    report.errors.push(e);
                }
            },
        }
    }

    fn render(&self, id: &str, state: &OverlayState) -> String {
        let match_condition = self.registry.match_condition(id).unwrap_or_default();
        let ctx = ArtifactContext {
            source_id: id,
            match_condition: &match_condition,
            tag: &self.tag,
            config_dir: self.config_root(),
        };
        match state {
            OverlayState::List(overlay) => render_list_artifact(&ctx, overlay),
            OverlayState::Command(overlay) => render_command_artifact(&ctx, overlay, &self.source_tag_invocations(id)),
        }
    }

    /// `tag(): ...` lines of the rule file behind `id`.
    fn source_tag_invocations(&self, id: &str) -> Vec<String> {
        let rule_file = self.mapper.to_filesystem_paths(id).ok().and_then(|paths| {
            paths
                .into_iter()
                .find(|p| p.extension().and_then(|e| e.to_str()) == Some(self.mapper.rule_extension()))
        });
        let Some(rule_file) = rule_file else {
            return Vec::new();
        };
        match fs::read_to_string(&rule_file) {
            Ok(text) => parse_talon_file(&text).tag_invocations,
            Err(e) => {
                debug!(path = %rule_file.display(), error = %e, "cannot read source for tag invocations");
                Vec::new()
            }
        }
    }

    /// Watch exactly the source files of configured rule sets.
    fn sync_source_watches(&self, inner: &mut ControllerInner) {
        let mut watched = BTreeSet::new();
        for (path, targets) in inner.watches.subscriptions() {
            for target in targets {
                if let WatchTarget::SourceFile(id) = target {
                    watched.insert((path.to_path_buf(), id.clone()));
                }
            }
        }

        let mut desired: BTreeSet<(PathBuf, String)> = BTreeSet::new();
        for id in inner.configured.keys() {
            match self.mapper.to_filesystem_paths(id) {
                Ok(paths) => desired.extend(paths.into_iter().map(|p| (p, id.clone()))),
                Err(e) => debug!(rule_set = %id, error = %e, "no source files to watch"),
            }
        }

        for (path, id) in watched.difference(&desired) {
            inner.watches.unwatch(path, &WatchTarget::SourceFile(id.clone()));
        }
        for (path, id) in desired.difference(&watched) {
            if let Err(e) = inner.watches.watch(path, WatchTarget::SourceFile(id.clone())) {
                warn!(path = %path.display(), rule_set = %id, error = %e, "failed to watch source file");
            }
        }
    }

    /// Delete files under the output root that no current overlay produces,
    /// such as artifacts left by a run that never tore down.
    pub(super) fn sweep_stale_artifacts(&self, inner: &ControllerInner, report: &mut ReconcileReport) {
        let expected: BTreeSet<PathBuf> = inner
            .overlays
            .ids()
            .filter_map(|id| self.mapper.artifact_path(self.writer.output_root(), id).ok())
            .collect();

        for path in self.writer.existing() {
            if expected.contains(&path) {
                continue;
            }
            match self.writer.remove(&path) {
                Ok(true) => report.removed.push(path),
                Ok(false) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to remove stale artifact");
                    report.errors.push(e);
                }
            }
        }
    }
}
