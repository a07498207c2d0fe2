//! Inline field grammar
//!
//! Three forms are recognised on a single line:
//!
//! - full line: `- > **name**:: value` (list and quote markers optional)
//! - bracket, inside prose: `text [name:: value] text`
//! - paren, inside prose: `text (name:: value) text`
//!
//! Links (`[[...]]` and `[text](target)`) are swapped for private-use
//! placeholders before matching so that their brackets and colons never end a
//! value early, and swapped back afterwards.

use fieldmark_fields::FieldStyle;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;

use crate::note::compile_regex;

const OPEN: char = '\u{E000}';
const CLOSE: char = '\u{E001}';

/// Any field name: no markers, brackets, colons or placeholders
const ANY_NAME: &str = "[^\\s:*_~`\\[\\]()>\u{E000}\u{E001}][^:*_~`\\[\\]()\u{E000}\u{E001}]*?";

static LINKS: Lazy<Regex> = Lazy::new(|| {
    compile_regex(r"!?\[\[[^\[\]]*\]\]|!?\[[^\[\]]*\]\([^()]*\)")
});

static ANY_FULL_LINE: Lazy<Regex> = Lazy::new(|| compile_regex(&full_line_pattern(ANY_NAME)));
static ANY_BRACKET: Lazy<Regex> = Lazy::new(|| compile_regex(&embedded_pattern(ANY_NAME, '[', ']')));
static ANY_PAREN: Lazy<Regex> = Lazy::new(|| compile_regex(&embedded_pattern(ANY_NAME, '(', ')')));

/// How an inline field is written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InlineForm {
    FullLine,
    Bracket,
    Paren,
}

/// One inline field occurrence, with every span decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineMatch {
    pub form: InlineForm,
    pub name: String,
    pub value: String,
    pub list: String,
    pub quote: String,
    pub start_style: String,
    pub end_style: String,
}

fn full_line_pattern(name: &str) -> String {
    format!(
        r"^(?P<quote>(?:[ \t]*>)+[ \t]*)?(?P<list>[ \t]*(?:[-*+]|\d+[.)])[ \t]+(?:\[.\][ \t]+)?)?(?P<spacer>[ \t]*)(?P<start_style>[_*~`]*)(?P<name>{name})(?P<end_style>[_*~`]*)(?P<pre_sep>[ \t]*)::(?P<post_sep>[ \t]*)(?P<value>.*?)(?P<trail>[ \t\r]*)$"
    )
}

fn embedded_pattern(name: &str, open: char, close: char) -> String {
    let open = regex::escape(&open.to_string());
    let close_class = regex::escape(&close.to_string());
    format!(
        r"{open}(?P<spacer>[ \t]*)(?P<start_style>[_*~`]*)(?P<name>{name})(?P<end_style>[_*~`]*)(?P<pre_sep>[ \t]*)::(?P<post_sep>[ \t]*)(?P<value>[^{close_class}]*?)(?P<trail>[ \t]*){close_class}"
    )
}

/// Matchers for one specific field name
pub struct NamedGrammar {
    full_line: Regex,
    bracket: Regex,
    paren: Regex,
}

impl NamedGrammar {
    pub fn new(name: &str) -> Self {
        let name = regex::escape(name);
        Self {
            full_line: compile_regex(&full_line_pattern(&name)),
            bracket: compile_regex(&embedded_pattern(&name, '[', ']')),
            paren: compile_regex(&embedded_pattern(&name, '(', ')')),
        }
    }
}

/// Link placeholders for one line
struct Encoded {
    text: String,
    links: Vec<String>,
}

fn encode(line: &str) -> Encoded {
    let mut links = Vec::new();
    let text = LINKS
        .replace_all(line, |caps: &Captures| {
            links.push(caps[0].to_string());
            format!("{OPEN}{}{CLOSE}", links.len() - 1)
        })
        .into_owned();
    Encoded { text, links }
}

fn decode(text: &str, links: &[String]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != OPEN {
            out.push(c);
            continue;
        }
        let mut digits = String::new();
        for d in chars.by_ref() {
            if d == CLOSE {
                break;
            }
            digits.push(d);
        }
        match digits.parse::<usize>().ok().and_then(|i| links.get(i)) {
            Some(link) => out.push_str(link),
            None => {
                out.push(OPEN);
                out.push_str(&digits);
                out.push(CLOSE);
            }
        }
    }
    out
}

fn to_match(caps: &Captures, form: InlineForm, links: &[String]) -> InlineMatch {
    let get = |group: &str| caps.name(group).map(|m| decode(m.as_str(), links)).unwrap_or_default();
    InlineMatch {
        form,
        name: get("name").trim_end().to_string(),
        value: get("value"),
        list: get("list"),
        quote: get("quote"),
        start_style: get("start_style"),
        end_style: get("end_style"),
    }
}

fn find_with(encoded: &Encoded, full: &Regex, bracket: &Regex, paren: &Regex) -> Vec<InlineMatch> {
    if let Some(caps) = full.captures(&encoded.text) {
        return vec![to_match(&caps, InlineForm::FullLine, &encoded.links)];
    }
    let mut found: Vec<(usize, InlineMatch)> = bracket
        .captures_iter(&encoded.text)
        .map(|c| (c.get(0).map_or(0, |m| m.start()), to_match(&c, InlineForm::Bracket, &encoded.links)))
        .collect();
    found.extend(
        paren
            .captures_iter(&encoded.text)
            .map(|c| (c.get(0).map_or(0, |m| m.start()), to_match(&c, InlineForm::Paren, &encoded.links))),
    );
    found.sort_by_key(|(pos, _)| *pos);
    found.into_iter().map(|(_, m)| m).collect()
}

/// Every inline field on a line, whatever its name
pub fn scan_line(line: &str) -> Vec<InlineMatch> {
    let encoded = encode(line);
    find_with(&encoded, &ANY_FULL_LINE, &ANY_BRACKET, &ANY_PAREN)
}

/// Occurrences of one field on a line
pub fn find_field(line: &str, grammar: &NamedGrammar) -> Vec<InlineMatch> {
    let encoded = encode(line);
    find_with(&encoded, &grammar.full_line, &grammar.bracket, &grammar.paren)
}

/// Rewrite the value of every occurrence of a field on a line.
///
/// Forms are tried full line, then bracket, then paren; the first form that
/// matches is rewritten everywhere on the line. Everything outside the value
/// span is kept, except the style wrappers when `style` is given. Returns
/// `None` when the field does not occur on the line, or when the value would
/// not survive a read in the matched form (see [`fits`]).
pub fn replace_value(line: &str, grammar: &NamedGrammar, value: &str, style: Option<&FieldStyle>) -> Option<String> {
    let encoded = encode(line);
    let text = &encoded.text;

    let (form, all): (InlineForm, Vec<Captures>) = match grammar.full_line.captures(text) {
        Some(caps) => (InlineForm::FullLine, vec![caps]),
        None => {
            let brackets: Vec<Captures> = grammar.bracket.captures_iter(text).collect();
            if brackets.is_empty() {
                (InlineForm::Paren, grammar.paren.captures_iter(text).collect())
            } else {
                (InlineForm::Bracket, brackets)
            }
        }
    };
    if all.is_empty() || !fits(form, value) {
        return None;
    }

    let wrappers = style.map(FieldStyle::wrappers);
    let mut out = String::with_capacity(text.len() + value.len());
    let mut cursor = 0;
    for caps in &all {
        let (Some(start_style), Some(end_style), Some(value_span)) =
            (caps.name("start_style"), caps.name("end_style"), caps.name("value"))
        else {
            continue;
        };
        match &wrappers {
            Some((open, close)) => {
                out.push_str(&text[cursor..start_style.start()]);
                out.push_str(open);
                let name = caps.name("name").map_or("", |m| m.as_str());
                out.push_str(name);
                out.push_str(close);
                out.push_str(&text[end_style.end()..value_span.start()]);
            }
            None => out.push_str(&text[cursor..value_span.start()]),
        }
        let spaced = value_span.as_str().is_empty()
            && caps.name("post_sep").is_some_and(|m| m.as_str().is_empty())
            && !value.is_empty();
        if spaced {
            out.push(' ');
        }
        out.push_str(&value.replace(OPEN, "").replace(CLOSE, ""));
        cursor = value_span.end();
    }
    out.push_str(&text[cursor..]);
    Some(decode(&out, &encoded.links))
}

/// Whether `value` can be written in `form` and read back unchanged.
///
/// Embedded values end at the first closing delimiter outside a link, and no
/// form spans more than one line.
pub fn fits(form: InlineForm, value: &str) -> bool {
    if value.contains('\n') {
        return false;
    }
    let close = match form {
        InlineForm::FullLine => return true,
        InlineForm::Bracket => ']',
        InlineForm::Paren => ')',
    };
    !encode(value).text.contains(close)
}

/// A full-line field, as inserted on its own line
pub fn render_line(name: &str, value: &str, style: Option<&FieldStyle>, as_list: bool, quote: &str) -> String {
    let (open, close) = style.map(FieldStyle::wrappers).unwrap_or_default();
    let list = if as_list { "- " } else { "" };
    let separator = if value.is_empty() { "::" } else { ":: " };
    format!("{quote}{list}{open}{name}{close}{separator}{value}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_line_with_markers() {
        let found = scan_line("> - **status** :: in progress  ");
        assert_eq!(found.len(), 1);
        let m = &found[0];
        assert_eq!(m.form, InlineForm::FullLine);
        assert_eq!(m.name, "status");
        assert_eq!(m.value, "in progress");
        assert_eq!(m.start_style, "**");
        assert_eq!(m.list, "- ");
        assert_eq!(m.quote, "> ");
    }

    #[test]
    fn test_bracket_and_paren_in_prose() {
        let found = scan_line("met [[Bob]] for [project:: Alpha] and (hours:: 3) today");
        let names: Vec<&str> = found.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["project", "hours"]);
        assert_eq!(found[0].form, InlineForm::Bracket);
        assert_eq!(found[1].form, InlineForm::Paren);
        assert_eq!(found[1].value, "3");
    }

    #[test]
    fn test_link_values_survive() {
        let found = scan_line("owner:: [[People/Bob|Bob]], [x](y.md)");
        assert_eq!(found[0].value, "[[People/Bob|Bob]], [x](y.md)");

        let found = scan_line("see [owner:: [[Bob]]] here");
        assert_eq!(found[0].value, "[[Bob]]");
    }

    #[test]
    fn test_replace_bracket_keeps_prose() {
        let grammar = NamedGrammar::new("project");
        let line = "- looked at [[Bob]] for [project:: Alpha]";
        assert_eq!(
            replace_value(line, &grammar, "Beta", None).unwrap(),
            "- looked at [[Bob]] for [project:: Beta]"
        );
    }

    #[test]
    fn test_replace_full_line_keeps_trailing_space_and_style() {
        let grammar = NamedGrammar::new("status");
        let line = "* _status_ ::  draft \r";
        assert_eq!(
            replace_value(line, &grammar, "done", None).unwrap(),
            "* _status_ ::  done \r"
        );
        let bold = FieldStyle {
            bold: true,
            ..Default::default()
        };
        assert_eq!(
            replace_value(line, &grammar, "done", Some(&bold)).unwrap(),
            "* **status** ::  done \r"
        );
    }

    #[test]
    fn test_replace_every_bracket_occurrence() {
        let grammar = NamedGrammar::new("tag");
        let line = "[tag:: a] then [tag:: b] and [other:: c]";
        assert_eq!(
            replace_value(line, &grammar, "z", None).unwrap(),
            "[tag:: z] then [tag:: z] and [other:: c]"
        );
    }

    #[test]
    fn test_replace_with_link_value() {
        let grammar = NamedGrammar::new("owner");
        let line = "(owner:: [[Ann]]) wrote this";
        assert_eq!(
            replace_value(line, &grammar, "[[Bob]], [[Cid]]", None).unwrap(),
            "(owner:: [[Bob]], [[Cid]]) wrote this"
        );
    }

    #[test]
    fn test_embedded_value_with_closing_delimiter_is_refused() {
        let grammar = NamedGrammar::new("code");
        assert!(replace_value("see [code:: x] here", &grammar, "a]b", None).is_none());
        assert!(replace_value("see (code:: x) here", &grammar, "f(x)", None).is_none());
        assert_eq!(
            replace_value("see [code:: x] here", &grammar, "f(x)", None).unwrap(),
            "see [code:: f(x)] here"
        );
        assert_eq!(
            replace_value("code:: x", &grammar, "a]b", None).unwrap(),
            "code:: a]b"
        );
    }

    #[test]
    fn test_fits() {
        assert!(fits(InlineForm::FullLine, "a)b]c"));
        assert!(fits(InlineForm::Bracket, "[[Bob]], [x](y.md)"));
        assert!(!fits(InlineForm::Bracket, "a]b"));
        assert!(fits(InlineForm::Paren, "[x](y.md)"));
        assert!(!fits(InlineForm::Paren, "a)b"));
        assert!(!fits(InlineForm::FullLine, "two\nlines"));
    }

    #[test]
    fn test_filling_an_empty_value_adds_separator_space() {
        let grammar = NamedGrammar::new("links");
        assert_eq!(
            replace_value("links::", &grammar, "[[A]]", None).unwrap(),
            "links:: [[A]]"
        );
        assert_eq!(
            replace_value("see (links::)", &grammar, "[[A]]", None).unwrap(),
            "see (links:: [[A]])"
        );
    }

    #[test]
    fn test_no_match() {
        let grammar = NamedGrammar::new("status");
        assert!(replace_value("nothing here", &grammar, "x", None).is_none());
        assert!(scan_line("plain prose, with: one colon").is_empty());
        assert!(find_field("statusx:: 1", &grammar).is_empty());
    }

    #[test]
    fn test_render_line() {
        assert_eq!(render_line("status", "draft", None, true, ""), "- status:: draft");
        assert_eq!(render_line("status", "", None, false, "> "), "> status::");
    }
}
