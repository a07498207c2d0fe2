//! FileChanged command

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Instant;
use tracing::debug;

use super::{logged, Execute, ExecutionResult, Operation};
use crate::context::FieldmarkContext;
use crate::error::{IndexError, Result};
use crate::note::NotePath;

/// The host saw a note change on disk.
///
/// Changes the index wrote itself are recognised through the per-note
/// watermarks and skipped, so a computed write never recomputes itself.
/// A write to one note never hides an edit of another.
#[derive(Debug, Deserialize, Serialize)]
pub struct FileChanged {
    pub path: NotePath,
}

impl FileChanged {
    pub fn new(path: impl Into<NotePath>) -> Self {
        Self { path: path.into() }
    }
}

impl Operation for FileChanged {
    fn op_string(&self) -> String {
        "file changed".to_string()
    }
}

#[async_trait]
impl Execute<FieldmarkContext, IndexError> for FileChanged {
    async fn execute(&self, ctx: &FieldmarkContext) -> ExecutionResult<Value, IndexError> {
        let start = Instant::now();

        let result: Result<Value> = async {
            if ctx.vault().exists(&self.path).await {
                let modified = ctx.vault().modified(&self.path).await?;
                if ctx.index().is_accounted_for(&self.path, modified) {
                    debug!(path = %self.path, "change written by the index itself, skipped");
                    return Ok(json!({ "path": self.path, "skipped": true }));
                }
            }

            let report = ctx.refresh(&self.path).await?;
            Ok(json!({ "path": self.path, "skipped": false, "recompute": report }))
        }
        .await;

        logged(self, start, result)
    }
}
