//! List report: where a list is defined and which commands reference it.
//!
//! A read-only diagnostic over the base registry. Given a key phrase, every
//! list whose name contains it is reported with the rule sets defining it
//! and the captures and commands that use it as `{list}` or `<list>`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

use chrono::{DateTime, Utc};
use persona_core::PathMapper;
use serde::Serialize;

use crate::registry::RuleRegistry;

/// References to one list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListReferences {
    /// Rule sets that define or redefine the list.
    pub defined_in: Vec<String>,
    /// Rule set to the captures (name to rule) that reference the list.
    pub captures: BTreeMap<String, BTreeMap<String, String>>,
    /// Rule set to the rules that reference the list.
    pub commands: BTreeMap<String, BTreeSet<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListReport {
    pub key_phrase: String,
    pub generated_at: DateTime<Utc>,
    pub lists: BTreeMap<String, ListReferences>,
}

impl ListReport {
    /// Scan every rule set in the registry for lists matching `key_phrase`.
    pub fn discover(registry: &dyn RuleRegistry, key_phrase: &str) -> Self {
        let rule_sets = registry.rule_sets();

        let mut names = BTreeSet::new();
        for id in &rule_sets {
            if let Some(lists) = registry.lists(id) {
                names.extend(lists.into_keys().filter(|name| name.contains(key_phrase)));
            }
        }

        let mut lists: BTreeMap<String, ListReferences> =
            names.into_iter().map(|name| (name, ListReferences::default())).collect();

        for id in &rule_sets {
            if let Some(defined) = registry.lists(id) {
                for name in defined.keys() {
                    if let Some(refs) = lists.get_mut(name) {
                        refs.defined_in.push(id.clone());
                    }
                }
            }
            let captures = registry.captures(id).unwrap_or_default();
            let commands = registry.commands(id).unwrap_or_default();
            for (name, refs) in lists.iter_mut() {
                let capture_rules: BTreeMap<String, String> = captures
                    .iter()
                    .filter(|(_, rule)| contains_list_reference(name, rule))
                    .map(|(capture, rule)| (capture.clone(), rule.clone()))
                    .collect();
                if !capture_rules.is_empty() {
                    refs.captures.entry(id.clone()).or_default().extend(capture_rules);
                }

                let rules: BTreeSet<String> = commands
                    .keys()
                    .filter(|rule| contains_list_reference(name, rule))
                    .cloned()
                    .collect();
                if !rules.is_empty() {
                    refs.commands.entry(id.clone()).or_default().extend(rules);
                }
            }
        }

        Self {
            key_phrase: key_phrase.to_string(),
            generated_at: Utc::now(),
            lists,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    /// Plain-text rendering. Source files are resolved through `mapper`.
    pub fn render(&self, mapper: &PathMapper) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "# List report for \"{}\" ({})\n",
            self.key_phrase,
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );

        if self.lists.is_empty() {
            let _ = writeln!(out, "No lists found matching \"{}\".", self.key_phrase);
            return out;
        }

        for (index, (name, refs)) in self.lists.iter().enumerate() {
            if index > 0 {
                out.push_str("----\n\n");
            }
            let _ = writeln!(out, "List report for \"{}\"\n", name);

            // Names come from definitions, so every list has at least one.
            out.push_str("* Defined in:\n");
            for id in &refs.defined_in {
                let _ = writeln!(out, "    {} ({})", id, source_files(mapper, id));
            }
            out.push('\n');

            if !refs.captures.is_empty() {
                out.push_str("* Referenced by captures:\n");
                for (id, captures) in &refs.captures {
                    let _ = writeln!(out, "    Context: {} ({})", id, source_files(mapper, id));
                    for (capture, rule) in captures {
                        let _ = writeln!(out, "        {} ==> {}", capture, rule);
                    }
                }
                out.push('\n');
            }

            if !refs.commands.is_empty() {
                out.push_str("* Referenced by commands:\n");
                for (id, rules) in &refs.commands {
                    let _ = writeln!(out, "    Context: {} ({})", id, source_files(mapper, id));
                    for rule in rules {
                        let _ = writeln!(out, "        {}", rule);
                    }
                }
                out.push('\n');
            }
        }
        out
    }
}

fn source_files(mapper: &PathMapper, id: &str) -> String {
    mapper
        .to_filesystem_paths(id)
        .map(|paths| {
            paths
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(",")
        })
        .unwrap_or_default()
}

/// Whether `rule` references `list_name` as `{list}` or `<list>`.
///
/// `self.` prefixes in the rule count as `user.`.
pub fn contains_list_reference(list_name: &str, rule: &str) -> bool {
    let rule = qualify_self(rule);
    rule.contains(&format!("{{{}}}", list_name)) || rule.contains(&format!("<{}>", list_name))
}

/// Replace `self.` with `user.` wherever it starts a word.
fn qualify_self(rule: &str) -> String {
    let mut out = String::with_capacity(rule.len());
    let mut copied = 0;
    for (pos, prefix) in rule.match_indices("self.") {
        let at_word_start = rule[..pos]
            .chars()
            .next_back()
            .map_or(true, |c| !(c.is_alphanumeric() || c == '_'));
        if at_word_start {
            out.push_str(&rule[copied..pos]);
            out.push_str("user.");
            copied = pos + prefix.len();
        }
    }
    out.push_str(&rule[copied..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{MemoryRegistry, RuleSetDefinition};

    fn registry() -> MemoryRegistry {
        let registry = MemoryRegistry::new();
        registry.insert(
            "user.core.keys",
            RuleSetDefinition::default().with_list("user.letter", [("air", "a")]),
        );
        registry.insert(
            "user.core.letters_alt",
            RuleSetDefinition::default().with_list("user.letter", [("alpha", "a")]),
        );
        registry.insert(
            "user.core.symbols",
            RuleSetDefinition::default().with_list("user.symbol_key", [("dot", ".")]),
        );
        registry.insert(
            "user.core.letters",
            RuleSetDefinition::default()
                .with_capture("user.letters", "{user.letter}+")
                .with_capture("user.symbol", "{self.symbol_key}"),
        );
        registry.insert(
            "user.core.keys.talon",
            RuleSetDefinition::default()
                .with_command("press <user.letter>", "key(letter)")
                .with_command("spell {self.letter}+", "insert(letter_list)")
                .with_command("go home", "key(home)"),
        );
        registry
    }

    #[test]
    fn finds_definitions_and_references() {
        let report = ListReport::discover(&registry(), "letter");
        assert_eq!(report.lists.len(), 1);

        let refs = &report.lists["user.letter"];
        assert_eq!(refs.defined_in, vec!["user.core.keys", "user.core.letters_alt"]);
        let rules: Vec<&str> = refs.commands["user.core.keys.talon"].iter().map(String::as_str).collect();
        assert_eq!(rules, vec!["press <user.letter>", "spell {self.letter}+"]);
        assert_eq!(refs.captures.len(), 1);
        assert_eq!(refs.captures["user.core.letters"]["user.letters"], "{user.letter}+");
    }

    #[test]
    fn captures_are_reported_per_list() {
        let report = ListReport::discover(&registry(), "symbol");
        let refs = &report.lists["user.symbol_key"];
        assert_eq!(refs.defined_in, vec!["user.core.symbols"]);
        assert_eq!(refs.captures["user.core.letters"]["user.symbol"], "{self.symbol_key}");
        assert!(refs.commands.is_empty());
    }

    #[test]
    fn self_prefix_only_rewritten_at_word_start() {
        assert!(contains_list_reference("user.letter", "say {self.letter}"));
        assert!(!contains_list_reference("user.letter", "say {myself.letter}"));
        assert_eq!(qualify_self("myself.x self.y"), "myself.x user.y");
    }

    #[test]
    fn render_lists_sources_and_empty_lists() {
        let dir = tempfile::TempDir::new().unwrap();
        let mapper = PathMapper::new(dir.path(), "talon", vec!["py".to_string()]);
        let text = ListReport::discover(&registry(), "user.").render(&mapper);

        assert!(text.contains("List report for \"user.letter\""));
        assert!(text.contains("    user.core.keys ()\n"));
        assert!(text.contains("        press <user.letter>\n"));
        assert!(text.contains("* Referenced by captures:\n    Context: user.core.letters ()\n"));
        assert!(text.contains("        user.letters ==> {user.letter}+\n"));
        assert!(text.contains("----\n\n"));

        let empty = ListReport::discover(&MemoryRegistry::new(), "nothing").render(&mapper);
        assert!(empty.contains("No lists found matching \"nothing\"."));
    }
}
