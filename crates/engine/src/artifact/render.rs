//! Text rendering of list and command artifacts.

use std::fmt::Write;
use std::path::Path;

use crate::overlay::{CommandOverlay, ListOverlay};

/// First line of every generated artifact.
pub const PROVENANCE_MARKER: &str = "# Generated by persona-engine. DO NOT EDIT.";

/// Inputs shared by both artifact forms.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactContext<'a> {
    /// Identifier of the rule set being overridden.
    pub source_id: &'a str,
    /// Match condition of the source, one condition per line.
    pub match_condition: &'a str,
    /// Capability tag appended to the match condition.
    pub tag: &'a str,
    /// Directory holding the directives the artifact was built from.
    pub config_dir: &'a Path,
}

fn write_header(out: &mut String, ctx: &ArtifactContext<'_>) {
    let _ = writeln!(out, "{}", PROVENANCE_MARKER);
    let _ = writeln!(out, "# source: {}", ctx.source_id);
    let _ = writeln!(out, "# overrides: {}", ctx.config_dir.display());
    let _ = writeln!(out, "# Change the directives in that directory; this file is rewritten on every change.");
    out.push('\n');
}

/// Match lines of the source followed by the capability tag.
fn match_lines(ctx: &ArtifactContext<'_>) -> Vec<String> {
    let mut lines: Vec<String> = ctx
        .match_condition
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();
    lines.push(format!("tag: {}", ctx.tag));
    lines
}

fn quoted(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// Render a list overlay as a module declaring a context and its lists.
pub fn render_list_artifact(ctx: &ArtifactContext<'_>, overlay: &ListOverlay) -> String {
    let mut out = String::new();
    write_header(&mut out, ctx);

    out.push_str("from talon import Context\n\n");
    out.push_str("ctx = Context()\n");
    out.push_str("ctx.matches = r\"\"\"\n");
    for line in match_lines(ctx) {
        out.push_str(&line);
        out.push('\n');
    }
    out.push_str("\"\"\"\n");

    for (name, entries) in overlay.lists() {
        out.push('\n');
        if entries.is_empty() {
            let _ = writeln!(out, "ctx.lists[{}] = {{}}", quoted(name));
            continue;
        }
        let _ = writeln!(out, "ctx.lists[{}] = {{", quoted(name));
        for (key, value) in entries {
            let _ = writeln!(out, "    {}: {},", quoted(key), quoted(value));
        }
        out.push_str("}\n");
    }
    out
}

/// Render a command overlay as a rule file.
///
/// `tag_invocations` are the `tag(): ...` lines of the source file, copied
/// so the generated context enables the same capabilities.
pub fn render_command_artifact(ctx: &ArtifactContext<'_>, overlay: &CommandOverlay, tag_invocations: &[String]) -> String {
    let mut out = String::new();
    write_header(&mut out, ctx);

    for line in match_lines(ctx) {
        out.push_str(&line);
        out.push('\n');
    }
    out.push_str("-\n");

    for invocation in tag_invocations {
        out.push_str(invocation.trim());
        out.push('\n');
    }

    for (rule, body) in overlay.commands() {
        out.push('\n');
        let _ = writeln!(out, "{}:", rule);
        for line in body.lines() {
            if line.trim().is_empty() {
                out.push('\n');
            } else {
                let _ = writeln!(out, "    {}", line);
            }
        }
    }
    out
}
