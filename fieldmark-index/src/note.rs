//! Note paths and link extraction

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Vault-relative path of a note, always `/`-separated (`Projects/Alpha.md`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotePath(String);

impl NotePath {
    pub fn new(path: impl Into<String>) -> Self {
        let path: String = path.into();
        Self(path.replace('\\', "/").trim_start_matches('/').to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name without folders or extension
    pub fn basename(&self) -> &str {
        let name = self.0.rsplit('/').next().unwrap_or(&self.0);
        name.strip_suffix(".md").unwrap_or(name)
    }

    /// Path without the `.md` extension
    pub fn stem_path(&self) -> &str {
        self.0.strip_suffix(".md").unwrap_or(&self.0)
    }

    /// True when the note lives under `prefix` (a folder or path prefix)
    pub fn is_under(&self, prefix: &str) -> bool {
        let prefix = prefix.trim_start_matches('/');
        if prefix.is_empty() {
            return true;
        }
        let folder = prefix.trim_end_matches('/');
        self.0.starts_with(prefix) && (prefix.ends_with('/') || self.0[folder.len()..].starts_with('/'))
    }

    /// `[[basename]]`
    pub fn wikilink(&self) -> String {
        format!("[[{}]]", self.basename())
    }

    /// Whether a link target (already stripped of brackets and aliases) names this note
    pub fn matches_target(&self, target: &str) -> bool {
        let target = target.trim_start_matches('/');
        let target = target.strip_suffix(".md").unwrap_or(target);
        target == self.stem_path() || target == self.basename()
    }
}

impl fmt::Display for NotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NotePath {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Compile a pattern known at build time
pub(crate) fn compile_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|err| panic!("invalid regex {pattern}: {err}"))
}

static WIKILINK: Lazy<Regex> = Lazy::new(|| compile_regex(r"!?\[\[([^\[\]]+)\]\]"));

static MARKDOWN_LINK: Lazy<Regex> = Lazy::new(|| compile_regex(r"!?\[[^\[\]]*\]\(([^()\s]+)\)"));

/// Normalize a raw link target: drop aliases, headings, block refs and `.md`
pub fn normalize_target(raw: &str) -> String {
    let target = raw.split('|').next().unwrap_or(raw);
    let target = target.split('#').next().unwrap_or(target);
    let target = target.split('^').next().unwrap_or(target);
    let target = target.trim().replace("%20", " ");
    target
        .strip_suffix(".md")
        .map(str::to_string)
        .unwrap_or(target)
}

/// All note link targets in a piece of text, wiki and markdown style, in order
pub fn extract_links(text: &str) -> Vec<String> {
    let mut found: Vec<(usize, String)> = WIKILINK
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| (m.start(), normalize_target(m.as_str()))))
        .collect();
    found.extend(MARKDOWN_LINK.captures_iter(text).filter_map(|c| {
        let m = c.get(1)?;
        let raw = m.as_str();
        if raw.contains("://") {
            return None;
        }
        Some((m.start(), normalize_target(raw)))
    }));
    found.sort_by_key(|(pos, _)| *pos);
    found
        .into_iter()
        .map(|(_, target)| target)
        .filter(|t| !t.is_empty())
        .collect()
}

/// Link targets inside a structured field value
pub fn links_in_value(value: &serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::String(s) => extract_links(s),
        serde_json::Value::Array(items) => items.iter().flat_map(links_in_value).collect(),
        serde_json::Value::Object(map) => map.values().flat_map(links_in_value).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_basename_and_stem() {
        let path = NotePath::new("Projects/Alpha.md");
        assert_eq!(path.basename(), "Alpha");
        assert_eq!(path.stem_path(), "Projects/Alpha");
        assert_eq!(path.wikilink(), "[[Alpha]]");
        assert!(path.matches_target("Alpha"));
        assert!(path.matches_target("Projects/Alpha"));
        assert!(!path.matches_target("Beta"));
    }

    #[test]
    fn test_is_under() {
        let path = NotePath::new("Projects/Alpha.md");
        assert!(path.is_under("Projects"));
        assert!(path.is_under("Projects/"));
        assert!(!path.is_under("Proj"));
        assert!(path.is_under(""));
    }

    #[test]
    fn test_extract_links_in_order() {
        let text = "see [Doc](Docs/Guide.md) and [[Bob|Robert]] then [[Alice#Intro]] and [x](https://example.com)";
        assert_eq!(extract_links(text), vec!["Docs/Guide", "Bob", "Alice"]);
    }

    #[test]
    fn test_links_in_value() {
        let value = json!(["[[A]]", "[[B]]", 3]);
        assert_eq!(links_in_value(&value), vec!["A", "B"]);
    }
}
