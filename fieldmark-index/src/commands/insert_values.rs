//! InsertValues command

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Instant;

use super::{logged, Execute, ExecutionResult, Operation};
use crate::context::FieldmarkContext;
use crate::error::{IndexError, Result};
use crate::note::NotePath;
use crate::patcher::{FieldWrite, InsertOptions};
use crate::scheduler::PendingPatch;

/// How a newly created inline field is laid out at the anchor
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct InsertPlacement {
    pub insert_after: bool,
    pub as_list: bool,
    pub as_comment: bool,
}

/// Set one field of a note, creating it when the note does not have it yet.
///
/// Without an anchor a new field goes to the header block.
#[derive(Debug, Deserialize, Serialize)]
pub struct InsertValues {
    pub path: NotePath,
    pub field: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<usize>,
    #[serde(default)]
    pub options: InsertPlacement,
}

impl InsertValues {
    pub fn new(path: impl Into<NotePath>, field: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            field: field.into(),
            value,
            anchor: None,
            options: InsertPlacement::default(),
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.anchor = Some(line);
        self
    }

    pub fn with_placement(mut self, options: InsertPlacement) -> Self {
        self.options = options;
        self
    }

    fn insert_options(&self) -> InsertOptions {
        InsertOptions {
            anchor: self.anchor,
            insert_after: self.options.insert_after,
            as_list: self.options.as_list,
            as_comment: self.options.as_comment,
        }
    }
}

impl Operation for InsertValues {
    fn op_string(&self) -> String {
        "insert values".to_string()
    }
}

#[async_trait]
impl Execute<FieldmarkContext, IndexError> for InsertValues {
    async fn execute(&self, ctx: &FieldmarkContext) -> ExecutionResult<Value, IndexError> {
        let start = Instant::now();

        let result: Result<Value> = async {
            let entry = ctx.index().resolve_note(&self.path)?;
            let exists = entry.snapshot.values.contains_key(&self.field);

            let mut write = FieldWrite::new(self.field.as_str(), self.value.clone());
            if let Some(def) = entry.field(&self.field) {
                let kind = def.type_.kind();
                kind.validate(&self.value)
                    .map_err(|message| IndexError::invalid_value(self.field.as_str(), message))?;
                write = write.with_inline_text(kind.serialize(&self.value));
                if !exists {
                    write = write.with_style(def.style.clone());
                }
            }

            let patch = PendingPatch::new(self.path.clone()).with_options(self.insert_options());
            let patch = if exists { patch.update(write) } else { patch.create(write) };
            let outcome = ctx.scheduler().apply(patch).await?.ensure_applied(&self.path)?;
            let report = ctx.refresh(&self.path).await?;

            Ok(json!({
                "path": self.path,
                "field": self.field,
                "created": !exists,
                "changed": outcome.changed,
                "recompute": report,
            }))
        }
        .await;

        logged(self, start, result)
    }
}
