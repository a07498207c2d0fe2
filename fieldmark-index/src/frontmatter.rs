//! Structured header block (`---` delimited YAML at the top of a note).
//!
//! Reading parses the block with `serde_yaml_ng`. Writing is line-level: only
//! the lines belonging to the edited keys are replaced, every other line in the
//! block stays byte-for-byte as it was.

use serde_json::Value;
use std::collections::BTreeMap;

/// Location and parsed content of a header block
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderBlock {
    /// Line index of the opening `---`
    pub start: usize,
    /// Line index of the closing `---` (or `...`)
    pub end: usize,
    /// Parsed mapping, or `Null` when empty or unparseable
    pub value: Value,
    entries: Vec<HeaderEntry>,
}

/// Line span of one top-level key
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderEntry {
    pub key: String,
    pub first_line: usize,
    pub last_line: usize,
}

impl HeaderBlock {
    pub fn contains_line(&self, line: usize) -> bool {
        line >= self.start && line <= self.end
    }

    /// First line after the block
    pub fn body_start(&self) -> usize {
        self.end + 1
    }

    pub fn entries(&self) -> &[HeaderEntry] {
        &self.entries
    }

    pub fn entry(&self, key: &str) -> Option<&HeaderEntry> {
        self.entries.iter().find(|e| e.key == key)
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.entry(key).is_some()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.value.as_object().and_then(|map| map.get(key))
    }
}

fn is_delimiter(line: &str, closing: bool) -> bool {
    let line = line.trim_end();
    line == "---" || (closing && line == "...")
}

/// Find and parse the header block, if the note starts with one
pub fn locate(content: &str) -> Option<HeaderBlock> {
    let lines: Vec<&str> = content.split('\n').collect();
    if !lines.first().is_some_and(|l| is_delimiter(l, false)) {
        return None;
    }
    let end = lines
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, l)| is_delimiter(l, true))
        .map(|(i, _)| i)?;

    let raw = lines[1..end].join("\n");
    let value = if raw.trim().is_empty() {
        Value::Null
    } else {
        serde_yaml_ng::from_str::<Value>(&raw).unwrap_or(Value::Null)
    };

    Some(HeaderBlock {
        start: 0,
        end,
        value,
        entries: scan_entries(&lines, 1, end),
    })
}

fn key_of(line: &str) -> Option<String> {
    let first = line.chars().next()?;
    if first.is_whitespace() || matches!(first, '#' | '-') {
        return None;
    }
    let colon = line
        .find(": ")
        .or_else(|| line.trim_end().strip_suffix(':').map(|l| l.len()))?;
    let key = line[..colon].trim();
    let key = key
        .strip_prefix('"')
        .and_then(|k| k.strip_suffix('"'))
        .or_else(|| key.strip_prefix('\'').and_then(|k| k.strip_suffix('\'')))
        .unwrap_or(key);
    Some(key.to_string())
}

fn is_continuation(line: &str) -> bool {
    line.starts_with(' ') || line.starts_with('\t') || line.starts_with('-')
}

fn scan_entries(lines: &[&str], from: usize, to: usize) -> Vec<HeaderEntry> {
    let mut entries = Vec::new();
    let mut i = from;
    while i < to {
        match key_of(lines[i]) {
            Some(key) => {
                let first_line = i;
                let mut last_line = i;
                let mut j = i + 1;
                while j < to && (is_continuation(lines[j]) || lines[j].trim().is_empty()) {
                    if !lines[j].trim().is_empty() {
                        last_line = j;
                    }
                    j += 1;
                }
                entries.push(HeaderEntry {
                    key,
                    first_line,
                    last_line,
                });
                i = last_line + 1;
            }
            None => i += 1,
        }
    }
    entries
}

/// Whether a string survives a YAML round trip as a plain scalar
fn plain_is_safe(s: &str) -> bool {
    !s.is_empty()
        && !s.contains('\n')
        && s.trim() == s
        && serde_yaml_ng::from_str::<Value>(s).ok() == Some(Value::String(s.to_string()))
}

/// A string as a YAML scalar, double-quoted when a plain scalar would be misread
pub fn yaml_scalar(s: &str) -> String {
    if plain_is_safe(s) {
        s.to_string()
    } else {
        quoted(s)
    }
}

fn quoted(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s.replace('"', "\\\"")))
}

fn flow_item(value: &Value) -> String {
    match value {
        Value::String(s) if s.contains([',', '[', ']', '{', '}']) => quoted(s),
        Value::String(s) => yaml_scalar(s),
        Value::Null => "null".to_string(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

fn is_structured(value: &Value) -> bool {
    match value {
        Value::Object(_) => true,
        Value::Array(items) => items.iter().any(|i| i.is_object() || i.is_array()),
        _ => false,
    }
}

/// Render `key: value` as header lines. Lists of scalars use flow style (`[a, b]`).
pub fn render_entry(key: &str, value: &Value) -> Vec<String> {
    let key_text = yaml_scalar(key);
    match value {
        Value::Null => vec![format!("{key_text}:")],
        Value::Bool(_) | Value::Number(_) => vec![format!("{key_text}: {value}")],
        Value::String(s) => vec![format!("{key_text}: {}", yaml_scalar(s))],
        v if is_structured(v) => {
            let mut map = serde_json::Map::new();
            map.insert(key.to_string(), v.clone());
            match serde_yaml_ng::to_string(&Value::Object(map)) {
                Ok(yaml) => yaml.trim_end().lines().map(str::to_string).collect(),
                Err(_) => vec![format!("{key_text}: {}", serde_json::to_string(v).unwrap_or_default())],
            }
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(flow_item).collect();
            vec![format!("{key_text}: [{}]", items.join(", "))]
        }
        Value::Object(_) => vec![format!("{key_text}:")],
    }
}

/// Set top-level keys in the header block, creating the block if missing.
///
/// Existing keys are rewritten in place; new keys are appended before the
/// closing delimiter. Lines of untouched keys are kept exactly.
pub fn set_values(content: &str, values: &[(String, Value)]) -> String {
    if values.is_empty() {
        return content.to_string();
    }

    let Some(block) = locate(content) else {
        let mut out = String::from("---\n");
        for (key, value) in values {
            for line in render_entry(key, value) {
                out.push_str(&line);
                out.push('\n');
            }
        }
        out.push_str("---\n");
        out.push_str(content);
        return out;
    };

    let mut lines: Vec<String> = content.split('\n').map(str::to_string).collect();
    let mut replacements: BTreeMap<usize, (usize, Vec<String>)> = BTreeMap::new();
    let mut appended: Vec<String> = Vec::new();

    for (key, value) in values {
        let rendered = render_entry(key, value);
        match block.entry(key) {
            Some(entry) => {
                replacements.insert(entry.first_line, (entry.last_line, rendered));
            }
            None => appended.extend(rendered),
        }
    }

    if !appended.is_empty() {
        lines.splice(block.end..block.end, appended);
    }
    for (first, (last, rendered)) in replacements.into_iter().rev() {
        lines.splice(first..=last, rendered);
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_locate_and_entries() {
        let content = "---\nstatus: draft\ntags:\n  - a\n  - b\n# comment\nowner: Bob\n---\nbody\n";
        let block = locate(content).unwrap();
        assert_eq!(block.end, 7);
        assert_eq!(block.body_start(), 8);
        assert_eq!(block.get("status"), Some(&json!("draft")));
        assert_eq!(block.get("tags"), Some(&json!(["a", "b"])));
        let tags = block.entry("tags").unwrap();
        assert_eq!((tags.first_line, tags.last_line), (2, 4));
        assert!(block.contains_line(7));
        assert!(!block.contains_line(8));
    }

    #[test]
    fn test_no_header() {
        assert!(locate("just text\n---\n").is_none());
        assert!(locate("---\nnever closed\n").is_none());
    }

    #[test]
    fn test_set_existing_key_keeps_other_lines() {
        let content = "---\ntitle:   Spaced   \nstatus: draft\n# keep me\n---\nbody";
        let updated = set_values(content, &[("status".into(), json!("done"))]);
        assert_eq!(updated, "---\ntitle:   Spaced   \nstatus: done\n# keep me\n---\nbody");
    }

    #[test]
    fn test_append_and_create() {
        let content = "---\na: 1\n---\n";
        let updated = set_values(content, &[("b".into(), json!(["x", "y"]))]);
        assert_eq!(updated, "---\na: 1\nb: [x, y]\n---\n");

        let created = set_values("body\n", &[("status".into(), json!("draft"))]);
        assert_eq!(created, "---\nstatus: draft\n---\nbody\n");
    }

    #[test]
    fn test_multi_line_entry_replaced_whole() {
        let content = "---\ntags:\n  - a\n  - b\nnext: 1\n---\n";
        let updated = set_values(content, &[("tags".into(), json!(["c"]))]);
        assert_eq!(updated, "---\ntags: [c]\nnext: 1\n---\n");
    }

    #[test]
    fn test_scalar_quoting() {
        assert_eq!(yaml_scalar("done"), "done");
        assert_eq!(yaml_scalar("true"), "\"true\"");
        assert_eq!(yaml_scalar("12"), "\"12\"");
        assert_eq!(yaml_scalar("[[Bob]]"), "\"[[Bob]]\"");
        assert_eq!(yaml_scalar("a: b"), "\"a: b\"");
        assert_eq!(yaml_scalar(""), "\"\"");
        assert_eq!(
            render_entry("links", &json!(["[[A]]", "[[B]]"])),
            vec!["links: [\"[[A]]\", \"[[B]]\"]"]
        );
        assert_eq!(render_entry("n", &json!(null)), vec!["n:"]);
    }

    #[test]
    fn test_structured_value_renders_block() {
        let lines = render_entry("address", &json!({"city": "Paris"}));
        assert_eq!(lines, vec!["address:", "  city: Paris"]);
        let parsed: Value = serde_yaml_ng::from_str(&lines.join("\n")).unwrap();
        assert_eq!(parsed["address"]["city"], "Paris");
    }
}
