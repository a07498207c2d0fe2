//! Parse `#tag` tokens from note bodies and the header `tags` key.
//!
//! A tag is `#` followed by non-whitespace, non-`#` characters, at the start of
//! a line or after a non-word character. Tags in fenced code, inline code and
//! headings are ignored, as are purely numeric tokens (`#1` is an issue
//! reference, not a tag). Nested tags (`#project/alpha`) are kept whole.

use serde_json::Value;
use std::collections::BTreeSet;

const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')', ']', '"', '\''];

/// Extract unique tag names (without `#`) from body text, sorted.
pub fn parse_tags(text: &str) -> Vec<String> {
    let mut tags = BTreeSet::new();
    let mut in_fenced_block = false;

    for line in text.lines() {
        let trimmed = line.trim_start();

        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fenced_block = !in_fenced_block;
            continue;
        }
        if in_fenced_block {
            continue;
        }

        if trimmed.starts_with('#') && trimmed.chars().nth(1).is_none_or(|c| c == '#' || c == ' ') {
            continue;
        }

        let bytes = line.as_bytes();
        let len = bytes.len();
        let mut i = 0;

        while i < len {
            if bytes[i] == b'`' {
                i += 1;
                while i < len && bytes[i] != b'`' {
                    i += 1;
                }
                i += 1;
                continue;
            }

            if bytes[i] == b'#' {
                let preceded_ok = i == 0
                    || !(bytes[i - 1].is_ascii_alphanumeric()
                        || bytes[i - 1] == b'_'
                        || bytes[i - 1] == b'['
                        || bytes[i - 1] >= 0x80);
                if preceded_ok {
                    let start = i + 1;
                    let mut end = start;
                    while end < len && bytes[end] != b'#' && !bytes[end].is_ascii_whitespace() {
                        end += 1;
                    }
                    if let Some(tag) = clean_tag(&line[start..end]) {
                        tags.insert(tag);
                    }
                    i = end.max(start);
                    continue;
                }
            }

            i += 1;
        }
    }

    tags.into_iter().collect()
}

fn clean_tag(raw: &str) -> Option<String> {
    let tag = raw.trim_end_matches(TRAILING_PUNCTUATION);
    if tag.is_empty() || tag.chars().all(|c| c.is_ascii_digit()) {
        None
    } else {
        Some(tag.to_string())
    }
}

/// Tags declared in the header block: a list, or a comma/space separated string.
pub fn header_tags(value: &Value) -> Vec<String> {
    let raw: Vec<String> = match value {
        Value::String(s) => s
            .split([',', ' '])
            .map(str::to_string)
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    };
    raw.iter()
        .filter_map(|t| clean_tag(t.trim().trim_start_matches('#')))
        .collect()
}

/// True when `tags` contains `wanted` itself or a nested child of it
pub fn has_tag(tags: &[String], wanted: &str) -> bool {
    let wanted = wanted.trim_start_matches('#');
    tags.iter().any(|t| {
        t.eq_ignore_ascii_case(wanted)
            || (t.len() > wanted.len()
                && t[..wanted.len()].eq_ignore_ascii_case(wanted)
                && t.as_bytes()[wanted.len()] == b'/')
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_basic_tags() {
        assert_eq!(parse_tags("working on #project and #urgent."), vec!["project", "urgent"]);
    }

    #[test]
    fn test_skips_code_and_headings() {
        let text = "# Heading\n## Sub #nope\n```\n#incode\n```\nuse `#inline` but #real";
        assert_eq!(parse_tags(text), vec!["real"]);
    }

    #[test]
    fn test_numeric_and_link_anchors_are_not_tags() {
        assert!(parse_tags("fixes #12 see [[Note#Section]]").is_empty());
    }

    #[test]
    fn test_nested_tags() {
        let tags = parse_tags("#project/alpha");
        assert_eq!(tags, vec!["project/alpha"]);
        assert!(has_tag(&tags, "project"));
        assert!(has_tag(&tags, "#Project/Alpha"));
        assert!(!has_tag(&tags, "proj"));
    }

    #[test]
    fn test_header_tags() {
        assert_eq!(header_tags(&json!(["a", "#b"])), vec!["a", "b"]);
        assert_eq!(header_tags(&json!("a, b c")), vec!["a", "b", "c"]);
        assert!(header_tags(&json!(null)).is_empty());
    }
}
