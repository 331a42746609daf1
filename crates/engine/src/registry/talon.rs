//! Parsers for the native rule-file (`.talon`) and list-file (`.talon-list`) forms.
//!
//! Both forms share a header of match lines, a `-` separator line, and a body.

use super::{CommandTable, ListEntries};

/// Parsed rule file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TalonFile {
    /// Header match lines, trimmed, in file order.
    pub matches: Vec<String>,
    /// `tag(): ...` lines from the body, verbatim.
    pub tag_invocations: Vec<String>,
    pub commands: CommandTable,
}

/// Parsed list file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TalonList {
    pub name: String,
    pub matches: Vec<String>,
    pub entries: ListEntries,
}

/// Split into (header, body) at the first `-` line. Without a separator the
/// whole text is body.
fn split_header(text: &str) -> (Vec<&str>, Vec<&str>) {
    let lines: Vec<&str> = text.lines().collect();
    match lines.iter().position(|l| l.trim_end() == "-") {
        Some(sep) => (lines[..sep].to_vec(), lines[sep + 1..].to_vec()),
        None => (Vec::new(), lines),
    }
}

fn is_skippable(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

fn header_matches(header: &[&str]) -> Vec<String> {
    header
        .iter()
        .filter(|l| !is_skippable(l))
        .map(|l| l.trim().to_string())
        .collect()
}

/// Name of a `name(...)` declaration such as `tag()` or `settings()`.
fn declaration_name(line: &str) -> Option<&str> {
    let open = line.find('(')?;
    let name = &line[..open];
    (!name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')).then_some(name)
}

enum Block {
    None,
    Settings,
    Command(String, Vec<String>),
}

pub fn parse_talon_file(text: &str) -> TalonFile {
    let (header, body) = split_header(text);
    let mut file = TalonFile {
        matches: header_matches(&header),
        ..TalonFile::default()
    };

    let mut block = Block::None;
    for line in body {
        let indented = line.starts_with(|c: char| c.is_whitespace());
        if indented && !line.trim().is_empty() {
            if let Block::Command(_, lines) = &mut block {
                lines.push(line.to_string());
            }
            continue;
        }
        if is_skippable(line) {
            continue;
        }

        finish_block(&mut block, &mut file.commands);
        match declaration_name(line) {
            Some("tag") => file.tag_invocations.push(line.trim_end().to_string()),
            Some("settings") => block = Block::Settings,
            _ => {
                let Some((rule, rest)) = line.split_once(':') else {
                    continue;
                };
                let mut lines = Vec::new();
                if !rest.trim().is_empty() {
                    lines.push(rest.trim().to_string());
                }
                block = Block::Command(rule.trim().to_string(), lines);
            }
        }
    }
    finish_block(&mut block, &mut file.commands);
    file
}

fn finish_block(block: &mut Block, commands: &mut CommandTable) {
    if let Block::Command(rule, lines) = std::mem::replace(block, Block::None) {
        commands.insert(rule, dedent(&lines));
    }
}

/// Strip the common leading indentation and join with newlines.
fn dedent(lines: &[String]) -> String {
    let indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);
    lines
        .iter()
        .map(|l| l.get(indent..).unwrap_or_else(|| l.trim_start()).trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse a list file. Returns `None` when the header names no list.
pub fn parse_talon_list(text: &str) -> Option<TalonList> {
    let (header, body) = split_header(text);
    let mut name = None;
    let mut matches = Vec::new();
    for line in header_matches(&header) {
        match line.strip_prefix("list:") {
            Some(list_name) => name = Some(list_name.trim().to_string()),
            None => matches.push(line),
        }
    }

    let mut entries = ListEntries::new();
    for line in body.into_iter().filter(|l| !is_skippable(l)) {
        let (key, value) = match line.split_once(':') {
            Some((key, value)) => (key.trim(), unquote(value.trim())),
            None => (line.trim(), line.trim()),
        };
        entries.insert(key.to_string(), value.to_string());
    }

    Some(TalonList {
        name: name?,
        matches,
        entries,
    })
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value.strip_prefix(quote).and_then(|v| v.strip_suffix(quote)) {
            return inner;
        }
    }
    value
}
