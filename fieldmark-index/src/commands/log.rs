//! Audit entries for executed commands

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// ULID
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// Canonical op string, e.g. "update lookups"
    pub op: String,
    /// The command as JSON
    pub input: Value,
    /// Result value, or `{"error": ...}`
    pub output: Value,
    /// Who asked for the command: a plugin id, "watcher", a user
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    pub duration_ms: u64,
}

impl LogEntry {
    pub fn new(op: impl Into<String>, input: Value, output: Value, actor: Option<String>, duration_ms: u64) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            timestamp: Utc::now(),
            op: op.into(),
            input,
            output,
            actor,
            duration_ms,
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_actor_is_omitted_when_absent() {
        let entry = LogEntry::new("post values", json!({"path": "a.md"}), json!({}), None, 0);
        let encoded = serde_json::to_value(&entry).unwrap();
        assert!(encoded.get("actor").is_none());
        assert_eq!(encoded["op"], "post values");

        let entry = entry.with_actor("watcher");
        assert_eq!(serde_json::to_value(&entry).unwrap()["actor"], "watcher");
    }
}
