//! Logging utilities for fieldmark
//!
//! This module provides utilities for formatting log output and for installing
//! a `tracing` subscriber in binaries and tests.

use serde::Serialize;
use std::fmt::Debug;
use std::sync::Once;
use tracing_subscriber::EnvFilter;

/// Wrapper for pretty-printing types in logs as YAML
///
/// Use this in tracing statements to format field values, schemas or patches
/// as YAML with a newline before the content:
///
/// ```ignore
/// use fieldmark_common::Pretty;
/// use tracing::debug;
///
/// debug!("resolved schema: {}", Pretty(&fields));
/// ```
///
/// Types must implement Serialize + Debug.
/// Debug is used as a fallback if YAML serialization fails.
pub struct Pretty<T>(pub T);

impl<T: Serialize + Debug> std::fmt::Display for Pretty<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match serde_yaml_ng::to_string(&self.0) {
            Ok(yaml) => write!(f, "\n{}", yaml),
            Err(_) => write!(f, "\n{:#?}", self.0),
        }
    }
}

impl<T: Serialize + Debug> std::fmt::Debug for Pretty<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match serde_yaml_ng::to_string(&self.0) {
            Ok(yaml) => write!(f, "\n{}", yaml),
            Err(_) => write!(f, "\n{:#?}", self.0),
        }
    }
}

static INIT: Once = Once::new();

/// Install a global `tracing` subscriber filtered by `RUST_LOG`.
///
/// Falls back to `default_directive` (e.g. `"fieldmark_index=info"`) when
/// `RUST_LOG` is unset. Safe to call more than once; only the first call
/// installs anything.
pub fn init_tracing(default_directive: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize)]
    struct Sample {
        name: String,
        values: Vec<u32>,
    }

    #[test]
    fn test_pretty_renders_yaml_with_leading_newline() {
        let sample = Sample {
            name: "status".into(),
            values: vec![1, 2],
        };
        let rendered = format!("{}", Pretty(&sample));
        assert!(rendered.starts_with('\n'));
        assert!(rendered.contains("name: status"));
        assert!(rendered.contains("- 1"));
    }

    #[test]
    fn test_pretty_debug_matches_display() {
        let value = serde_json::json!({"a": 1});
        assert_eq!(format!("{:?}", Pretty(&value)), format!("{}", Pretty(&value)));
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing("warn");
        init_tracing("debug");
    }
}
