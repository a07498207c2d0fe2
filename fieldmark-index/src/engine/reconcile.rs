//! Deciding whether a computed value is a real change

use fieldmark_fields::kinds::{split_list, value_to_text};
use serde_json::Value;

/// What to do with a freshly computed value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Same as before; nothing to write
    Unchanged,
    /// Update the cache and write the value into the note
    Write,
    /// Record the change for a manual refresh; do not write
    MarkChanged,
}

fn is_multi(value: &Value) -> bool {
    match value {
        Value::Array(_) => true,
        Value::String(s) => split_list(s).len() > 1,
        _ => false,
    }
}

fn sorted_items(text: &str) -> Vec<String> {
    let mut items: Vec<String> = split_list(text)
        .into_iter()
        .map(|i| i.trim().to_string())
        .filter(|i| !i.is_empty())
        .collect();
    items.sort();
    items
}

/// Equality of two field values as they read in a note.
///
/// Comma separated lists compare as sets, so reordering is not a change.
/// Anything else compares by its text.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    let (left, right) = (value_to_text(a), value_to_text(b));
    if left == right {
        return true;
    }
    (is_multi(a) || is_multi(b)) && sorted_items(&left) == sorted_items(&right)
}

pub fn decide(previous: &Value, next: &Value, mode_changed: bool, auto_update: bool, targeted: bool) -> Decision {
    if !mode_changed && values_equal(previous, next) {
        Decision::Unchanged
    } else if auto_update || targeted {
        Decision::Write
    } else {
        Decision::MarkChanged
    }
}
