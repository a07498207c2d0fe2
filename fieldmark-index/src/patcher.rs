//! Reading and rewriting field occurrences in note text.
//!
//! Routing rule for writes: a field goes to the header block when it already
//! exists there as a key, or when it is newly created without an anchor line
//! (or with an anchor inside the header). Otherwise it is rewritten inline at
//! every existing occurrence, or inserted as a new line at the anchor.

use fieldmark_fields::{kinds::value_to_text, FieldStyle, IndexedPath};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{IndexError, Result};
use crate::frontmatter::{self, HeaderBlock};
use crate::grammar::{self, InlineForm, NamedGrammar};
use crate::note::NotePath;

/// Where a field occurrence lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "in", rename_all = "kebab-case")]
pub enum FieldLocation {
    Header,
    Inline { line: usize, form: InlineForm },
}

/// One occurrence of a field in a note
#[derive(Debug, Clone, PartialEq)]
pub struct Occurrence {
    pub name: String,
    /// Structured for header values, the raw text for inline values
    pub value: Value,
    pub location: FieldLocation,
}

/// One step of a field address, by field name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStep {
    pub key: String,
    pub index: Option<usize>,
}

impl PathStep {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            index: None,
        }
    }

    pub fn at(key: impl Into<String>, index: usize) -> Self {
        Self {
            key: key.into(),
            index: Some(index),
        }
    }
}

/// A value to write at a field address
#[derive(Debug, Clone, PartialEq)]
pub struct FieldWrite {
    /// First step is the top-level field; further steps descend into objects
    pub steps: Vec<PathStep>,
    pub value: Value,
    /// Text written for inline occurrences; defaults to the value as text
    pub inline: Option<String>,
    /// Style override for the field name of inline occurrences
    pub style: Option<FieldStyle>,
    /// Address this write came from, for reporting
    pub indexed_path: Option<IndexedPath>,
}

impl FieldWrite {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self::nested(vec![PathStep::new(name)], value)
    }

    pub fn nested(steps: Vec<PathStep>, value: Value) -> Self {
        Self {
            steps,
            value,
            inline: None,
            style: None,
            indexed_path: None,
        }
    }

    pub fn with_inline_text(mut self, text: impl Into<String>) -> Self {
        self.inline = Some(text.into());
        self
    }

    pub fn with_style(mut self, style: Option<FieldStyle>) -> Self {
        self.style = style;
        self
    }

    pub fn with_indexed_path(mut self, path: IndexedPath) -> Self {
        self.indexed_path = Some(path);
        self
    }

    /// Name of the top-level field
    pub fn name(&self) -> &str {
        self.steps.first().map_or("", |s| s.key.as_str())
    }

    pub fn is_nested(&self) -> bool {
        self.steps.len() > 1 || self.steps.first().is_some_and(|s| s.index.is_some())
    }

    fn inline_text(&self) -> String {
        self.inline.clone().unwrap_or_else(|| value_to_text(&self.value))
    }

    fn label(&self) -> String {
        match &self.indexed_path {
            Some(path) => path.as_str().to_string(),
            None => self
                .steps
                .iter()
                .map(|s| match s.index {
                    Some(i) => format!("{}[{}]", s.key, i),
                    None => s.key.clone(),
                })
                .collect::<Vec<_>>()
                .join("."),
        }
    }
}

/// Placement of newly created inline fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertOptions {
    /// Line to insert at; `None` routes new fields to the header block
    pub anchor: Option<usize>,
    /// Insert below the anchor rather than above it
    pub insert_after: bool,
    /// Prefix new lines with a list marker
    pub as_list: bool,
    /// Wrap new lines in a blockquote
    pub as_comment: bool,
}

impl InsertOptions {
    pub fn at_line(line: usize) -> Self {
        Self {
            anchor: Some(line),
            ..Default::default()
        }
    }

    pub fn after(mut self) -> Self {
        self.insert_after = true;
        self
    }

    pub fn as_list(mut self) -> Self {
        self.as_list = true;
        self
    }

    pub fn as_comment(mut self) -> Self {
        self.as_comment = true;
        self
    }
}

/// Result of a patch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatchOutcome {
    pub content: String,
    pub changed: bool,
    /// Updates that found no occurrence
    pub missed: Vec<String>,
    pub header_keys: Vec<String>,
    pub inline_rewrites: usize,
    pub inserted: usize,
}

impl PatchOutcome {
    /// Fail with `PatchMissed` when an update found no occurrence
    pub fn ensure_applied(self, path: &NotePath) -> Result<Self> {
        if self.missed.is_empty() {
            Ok(self)
        } else {
            Err(IndexError::PatchMissed {
                path: path.to_string(),
                fields: self.missed,
            })
        }
    }
}

/// Lines outside the header block and fenced code, with their indices
fn body_lines<'a>(lines: &'a [&'a str], header: Option<&HeaderBlock>) -> impl Iterator<Item = (usize, &'a str)> + 'a {
    let start = header.map_or(0, HeaderBlock::body_start);
    let mut in_fence = false;
    lines
        .iter()
        .enumerate()
        .skip(start)
        .filter_map(move |(i, line)| {
            let trimmed = line.trim_start();
            if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
                in_fence = !in_fence;
                return None;
            }
            (!in_fence).then_some((i, *line))
        })
}

/// All occurrences of `name`: the header key if present, else every inline match
pub fn read(content: &str, name: &str) -> Vec<Occurrence> {
    let header = frontmatter::locate(content);
    if let Some(value) = header.as_ref().filter(|h| h.has_key(name)).and_then(|h| h.get(name)) {
        return vec![Occurrence {
            name: name.to_string(),
            value: value.clone(),
            location: FieldLocation::Header,
        }];
    }

    let grammar = NamedGrammar::new(name);
    let lines: Vec<&str> = content.split('\n').collect();
    body_lines(&lines, header.as_ref())
        .flat_map(|(i, line)| {
            grammar::find_field(line, &grammar)
                .into_iter()
                .map(move |m| Occurrence {
                    name: m.name,
                    value: Value::String(m.value.trim().to_string()),
                    location: FieldLocation::Inline { line: i, form: m.form },
                })
        })
        .collect()
}

/// Every field occurrence in the note: header keys first, then inline fields
pub fn read_all(content: &str) -> Vec<Occurrence> {
    let header = frontmatter::locate(content);
    let mut found = Vec::new();

    if let Some(map) = header.as_ref().and_then(|h| h.value.as_object()) {
        found.extend(map.iter().map(|(key, value)| Occurrence {
            name: key.clone(),
            value: value.clone(),
            location: FieldLocation::Header,
        }));
    }

    let lines: Vec<&str> = content.split('\n').collect();
    for (i, line) in body_lines(&lines, header.as_ref()) {
        found.extend(grammar::scan_line(line).into_iter().map(|m| Occurrence {
            name: m.name,
            value: Value::String(m.value.trim().to_string()),
            location: FieldLocation::Inline { line: i, form: m.form },
        }));
    }
    found
}

/// Body text with the header block removed
pub fn body(content: &str) -> String {
    match frontmatter::locate(content) {
        Some(header) => content
            .split('\n')
            .skip(header.body_start())
            .collect::<Vec<_>>()
            .join("\n"),
        None => content.to_string(),
    }
}

/// Assign `value` inside `target` following `index` then `rest`.
///
/// With `create`, missing objects along the way are created; list items are
/// never created.
fn assign(target: &mut Value, index: Option<usize>, rest: &[PathStep], value: Value, create: bool) -> Option<()> {
    let slot = match index {
        Some(i) => target.as_array_mut()?.get_mut(i)?,
        None => target,
    };
    let Some((next, rest)) = rest.split_first() else {
        *slot = value;
        return Some(());
    };
    if slot.is_null() && create {
        *slot = Value::Object(serde_json::Map::new());
    }
    let map = slot.as_object_mut()?;
    if !map.contains_key(&next.key) {
        if next.index.is_some() {
            return None;
        }
        map.insert(next.key.clone(), Value::Null);
    }
    assign(map.get_mut(&next.key)?, next.index, rest, value, create)
}

/// Create new fields and update existing ones in a note.
///
/// Never fails: updates without any occurrence are reported in
/// [`PatchOutcome::missed`] and leave the content untouched for that field.
pub fn create_or_update(
    content: &str,
    to_create: &[FieldWrite],
    to_update: &[FieldWrite],
    options: &InsertOptions,
) -> PatchOutcome {
    let header = frontmatter::locate(content);
    let header_has = |key: &str| header.as_ref().is_some_and(|h| h.has_key(key));

    let mut header_values: IndexMap<String, Value> = IndexMap::new();
    let mut inline_updates: Vec<&FieldWrite> = Vec::new();
    let mut inserts: Vec<&FieldWrite> = Vec::new();
    let mut missed: Vec<String> = Vec::new();

    let mut set_header = |write: &FieldWrite, create: bool, missed: &mut Vec<String>| {
        let key = write.name().to_string();
        let mut working = header_values
            .get(&key)
            .or_else(|| header.as_ref().and_then(|h| h.get(&key)))
            .cloned()
            .unwrap_or(Value::Null);
        let index = write.steps.first().and_then(|s| s.index);
        match assign(&mut working, index, &write.steps[1..], write.value.clone(), create) {
            Some(()) => {
                header_values.insert(key, working);
            }
            None => missed.push(write.label()),
        }
    };

    for write in to_update {
        if write.steps.is_empty() {
            continue;
        }
        if header_has(write.name()) {
            set_header(write, false, &mut missed);
        } else if write.is_nested() {
            missed.push(write.label());
        } else {
            inline_updates.push(write);
        }
    }

    let anchor_in_header = match (options.anchor, header.as_ref()) {
        (None, _) => true,
        (Some(line), Some(h)) => h.contains_line(line),
        (Some(_), None) => false,
    };
    for write in to_create {
        if write.steps.is_empty() {
            continue;
        }
        if header_has(write.name()) || anchor_in_header || write.is_nested() {
            set_header(write, true, &mut missed);
        } else {
            inserts.push(write);
        }
    }

    let mut lines: Vec<String> = content.split('\n').map(str::to_string).collect();
    let mut inline_rewrites = 0;
    let original: Vec<&str> = content.split('\n').collect();
    let targets: Vec<usize> = body_lines(&original, header.as_ref()).map(|(i, _)| i).collect();

    for write in &inline_updates {
        let grammar = NamedGrammar::new(write.name());
        let text = write.inline_text();
        let mut hits = 0;
        for &i in &targets {
            if let Some(rewritten) = grammar::replace_value(&lines[i], &grammar, &text, write.style.as_ref()) {
                trace!(field = write.name(), line = i, "rewrote inline occurrence");
                lines[i] = rewritten;
                hits += 1;
            }
        }
        if hits == 0 {
            missed.push(write.label());
        }
        inline_rewrites += hits;
    }

    let inserted = inserts.len();
    if let (Some(anchor), false) = (options.anchor, inserts.is_empty()) {
        let quote = if options.as_comment { "> " } else { "" };
        let new_lines: Vec<String> = inserts
            .iter()
            .map(|w| grammar::render_line(w.name(), &w.inline_text(), w.style.as_ref(), options.as_list, quote))
            .collect();
        let at = if options.insert_after { anchor + 1 } else { anchor };
        let at = at.min(lines.len());
        lines.splice(at..at, new_lines);
    }

    let mut patched = lines.join("\n");
    let header_keys: Vec<String> = header_values.keys().cloned().collect();
    if !header_values.is_empty() {
        let values: Vec<(String, Value)> = header_values.into_iter().collect();
        patched = frontmatter::set_values(&patched, &values);
    }

    debug!(
        header = header_keys.len(),
        inline = inline_rewrites,
        inserted,
        missed = missed.len(),
        "patched note"
    );

    PatchOutcome {
        changed: patched != content,
        content: patched,
        missed,
        header_keys,
        inline_rewrites,
        inserted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_read_prefers_header() {
        let content = "---\nstatus: draft\n---\nstatus:: ignored\n";
        let found = read(content, "status");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].value, json!("draft"));
        assert_eq!(found[0].location, FieldLocation::Header);
    }

    #[test]
    fn test_read_inline_repeats_and_skips_code() {
        let content = "tag:: a\n```\ntag:: hidden\n```\nsee [tag:: b]\n";
        let found = read(content, "tag");
        let values: Vec<&Value> = found.iter().map(|o| &o.value).collect();
        assert_eq!(values, vec![&json!("a"), &json!("b")]);
        assert_eq!(
            found[1].location,
            FieldLocation::Inline {
                line: 4,
                form: InlineForm::Bracket
            }
        );
    }

    #[test]
    fn test_read_all_lists_header_then_inline() {
        let content = "---\na: 1\n---\nb:: 2\n(c:: 3)\n";
        let names: Vec<String> = read_all(content).into_iter().map(|o| o.name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_update_header_key() {
        let content = "---\nstatus: draft\nowner: Bob\n---\nbody\n";
        let outcome = create_or_update(
            content,
            &[],
            &[FieldWrite::new("status", json!("done"))],
            &InsertOptions::default(),
        );
        assert_eq!(outcome.content, "---\nstatus: done\nowner: Bob\n---\nbody\n");
        assert!(outcome.changed);
        assert!(outcome.missed.is_empty());
    }

    #[test]
    fn test_update_inline_everywhere() {
        let content = "project:: Alpha\n- looked at [[Bob]] for [project:: Alpha]\n";
        let outcome = create_or_update(
            content,
            &[],
            &[FieldWrite::new("project", json!("Beta"))],
            &InsertOptions::default(),
        );
        assert_eq!(
            outcome.content,
            "project:: Beta\n- looked at [[Bob]] for [project:: Beta]\n"
        );
        assert_eq!(outcome.inline_rewrites, 2);
    }

    #[test]
    fn test_update_missing_is_reported() {
        let content = "nothing here\n";
        let outcome = create_or_update(
            content,
            &[],
            &[FieldWrite::new("status", json!("done"))],
            &InsertOptions::default(),
        );
        assert_eq!(outcome.content, content);
        assert!(!outcome.changed);
        assert_eq!(outcome.missed, vec!["status"]);
        assert!(matches!(
            outcome.ensure_applied(&NotePath::new("a.md")),
            Err(IndexError::PatchMissed { .. })
        ));
    }

    #[test]
    fn test_create_without_anchor_goes_to_header() {
        let outcome = create_or_update(
            "body\n",
            &[FieldWrite::new("status", json!("draft"))],
            &[],
            &InsertOptions::default(),
        );
        assert_eq!(outcome.content, "---\nstatus: draft\n---\nbody\n");
        assert_eq!(outcome.header_keys, vec!["status"]);
    }

    #[test]
    fn test_create_at_anchor_inline() {
        let content = "---\na: 1\n---\nfirst\nsecond\n";
        let options = InsertOptions::at_line(3).after().as_list();
        let outcome = create_or_update(
            content,
            &[FieldWrite::new("owner", json!(["[[Bob]]", "[[Ann]]"]))],
            &[],
            &options,
        );
        assert_eq!(
            outcome.content,
            "---\na: 1\n---\nfirst\n- owner:: [[Bob]], [[Ann]]\nsecond\n"
        );
        assert_eq!(outcome.inserted, 1);
    }

    #[test]
    fn test_create_anchor_inside_header_routes_to_header() {
        let content = "---\na: 1\n---\nbody\n";
        let outcome = create_or_update(
            content,
            &[FieldWrite::new("b", json!(2))],
            &[],
            &InsertOptions::at_line(1).as_comment(),
        );
        assert_eq!(outcome.content, "---\na: 1\nb: 2\n---\nbody\n");
    }

    #[test]
    fn test_nested_header_update_through_list_item() {
        let content = "---\ntasks:\n  - name: write\n    due: 2024-01-01\n  - name: ship\n---\n";
        let write = FieldWrite::nested(vec![PathStep::at("tasks", 1), PathStep::new("due")], json!("2024-02-01"));
        let outcome = create_or_update(content, &[], &[write], &InsertOptions::default());
        assert!(outcome.missed.is_empty());
        let header = frontmatter::locate(&outcome.content).unwrap();
        assert_eq!(header.get("tasks").unwrap()[1]["due"], "2024-02-01");
        assert_eq!(header.get("tasks").unwrap()[0]["due"], "2024-01-01");
    }

    #[test]
    fn test_nested_update_out_of_range_is_missed() {
        let content = "---\ntasks:\n  - name: write\n---\n";
        let write = FieldWrite::nested(vec![PathStep::at("tasks", 4), PathStep::new("due")], json!("x"));
        let outcome = create_or_update(content, &[], &[write], &InsertOptions::default());
        assert_eq!(outcome.content, content);
        assert_eq!(outcome.missed, vec!["tasks[4].due"]);
    }

    #[test]
    fn test_body_strips_header() {
        assert_eq!(body("---\na: 1\n---\nhello\n"), "hello\n");
        assert_eq!(body("hello"), "hello");
    }
}
