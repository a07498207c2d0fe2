//! Results of executing a command

use super::log::LogEntry;

/// Result of executing a command
///
/// Distinguishes between:
/// - Logged: commands that touched the vault or the index and should be audited
/// - Unlogged: read-only commands
/// - Failed: errors (optionally logged)
#[derive(Debug)]
pub enum ExecutionResult<T, E> {
    Logged { value: T, log_entry: LogEntry },
    Unlogged { value: T },
    Failed {
        error: E,
        log_entry: Option<LogEntry>,
    },
}

impl<T, E> ExecutionResult<T, E> {
    pub fn into_result(self) -> Result<T, E> {
        match self {
            Self::Logged { value, .. } | Self::Unlogged { value } => Ok(value),
            Self::Failed { error, .. } => Err(error),
        }
    }

    /// The outcome and its log entry, separately
    pub fn split(self) -> (Result<T, E>, Option<LogEntry>) {
        match self {
            Self::Logged { value, log_entry } => (Ok(value), Some(log_entry)),
            Self::Unlogged { value } => (Ok(value), None),
            Self::Failed { error, log_entry } => (Err(error), log_entry),
        }
    }

    pub fn should_log(&self) -> bool {
        matches!(
            self,
            Self::Logged { .. }
                | Self::Failed {
                    log_entry: Some(_),
                    ..
                }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_split_and_should_log() {
        let logged: ExecutionResult<Value, String> = ExecutionResult::Logged {
            value: json!(1),
            log_entry: LogEntry::new("force full index", json!({}), json!(1), None, 3),
        };
        assert!(logged.should_log());
        let (value, entry) = logged.split();
        assert_eq!(value.unwrap(), json!(1));
        assert_eq!(entry.unwrap().duration_ms, 3);

        let failed: ExecutionResult<Value, String> = ExecutionResult::Failed {
            error: "boom".into(),
            log_entry: None,
        };
        assert!(!failed.should_log());
        assert_eq!(failed.into_result().unwrap_err(), "boom");
    }
}
