//! Commands consumed from the host
//!
//! Each command is a struct whose fields are its parameters. Executing it
//! against a [`FieldmarkContext`](crate::FieldmarkContext) returns an
//! [`ExecutionResult`] carrying the JSON result and a [`LogEntry`] for auditing.

mod execution;
mod file_changed;
mod force_full_index;
mod insert_values;
mod log;
mod post_values;
mod update_formulas;
mod update_lookups;

pub use execution::ExecutionResult;
pub use file_changed::FileChanged;
pub use force_full_index::ForceFullIndex;
pub use insert_values::{InsertPlacement, InsertValues};
pub use log::LogEntry;
pub use post_values::{PostValues, PostedValue};
pub use update_formulas::UpdateFormulas;
pub use update_lookups::UpdateLookups;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Instant;

use crate::error::{IndexError, Result};

/// A named command
pub trait Operation {
    /// Canonical op string, e.g. "update lookups"
    fn op_string(&self) -> String;
}

#[async_trait]
pub trait Execute<C, E>: Operation + Send + Sync {
    async fn execute(&self, ctx: &C) -> ExecutionResult<Value, E>;
}

/// Wrap a command's outcome with its log entry
pub(crate) fn logged<C>(command: &C, start: Instant, result: Result<Value>) -> ExecutionResult<Value, IndexError>
where
    C: Operation + Serialize,
{
    let input = serde_json::to_value(command).unwrap_or(Value::Null);
    let duration_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(value) => ExecutionResult::Logged {
            value: value.clone(),
            log_entry: LogEntry::new(command.op_string(), input, value, None, duration_ms),
        },
        Err(error) => {
            let error_msg = error.to_string();
            ExecutionResult::Failed {
                error,
                log_entry: Some(LogEntry::new(
                    command.op_string(),
                    input,
                    json!({ "error": error_msg }),
                    None,
                    duration_ms,
                )),
            }
        }
    }
}
