//! PostValues command

use async_trait::async_trait;
use fieldmark_fields::IndexedPath;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Instant;

use super::{logged, Execute, ExecutionResult, Operation};
use crate::context::FieldmarkContext;
use crate::error::{IndexError, Result};
use crate::index::NoteEntry;
use crate::note::NotePath;
use crate::patcher::FieldWrite;
use crate::scheduler::PendingPatch;

/// One value of a [`PostValues`] payload, addressed by indexed path or by
/// top-level field name
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PostedValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexed_path: Option<IndexedPath>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub value: Value,
}

impl PostedValue {
    pub fn named(name: impl Into<String>, value: Value) -> Self {
        Self {
            indexed_path: None,
            name: Some(name.into()),
            value,
        }
    }

    pub fn at(path: IndexedPath, value: Value) -> Self {
        Self {
            indexed_path: Some(path),
            name: None,
            value,
        }
    }
}

/// Write several values into one note in a single patch
#[derive(Debug, Deserialize, Serialize)]
pub struct PostValues {
    pub path: NotePath,
    pub payload: Vec<PostedValue>,
}

impl PostValues {
    pub fn new(path: impl Into<NotePath>, payload: Vec<PostedValue>) -> Self {
        Self {
            path: path.into(),
            payload,
        }
    }

    /// Turn one payload item into a write, and whether it updates an existing
    /// occurrence
    fn prepare(&self, entry: &NoteEntry, item: &PostedValue) -> Result<(FieldWrite, bool)> {
        let (write, def, exists) = match (&item.indexed_path, &item.name) {
            (Some(path), _) => {
                let steps = entry
                    .steps_for(path)
                    .ok_or_else(|| IndexError::field_not_found(self.path.as_str(), path.as_str()))?;
                let leaf = path.leaf_id();
                let def = entry.fields.iter().find(|f| f.id == leaf);
                let exists = entry.existing_at(path).is_some();
                let write = FieldWrite::nested(steps, item.value.clone()).with_indexed_path(path.clone());
                (write, def, exists)
            }
            (None, Some(name)) => {
                let exists = entry.snapshot.values.contains_key(name);
                (FieldWrite::new(name.as_str(), item.value.clone()), entry.field(name), exists)
            }
            (None, None) => {
                return Err(IndexError::invalid_value(
                    "payload",
                    "each value needs an indexed_path or a name",
                ))
            }
        };

        let Some(def) = def else {
            return Ok((write, exists));
        };
        let kind = def.type_.kind();
        kind.validate(&item.value)
            .map_err(|message| IndexError::invalid_value(def.name.as_str(), message))?;
        let mut write = write.with_inline_text(kind.serialize(&item.value));
        if !exists {
            write = write.with_style(def.style.clone());
        }
        Ok((write, exists))
    }
}

impl Operation for PostValues {
    fn op_string(&self) -> String {
        "post values".to_string()
    }
}

#[async_trait]
impl Execute<FieldmarkContext, IndexError> for PostValues {
    async fn execute(&self, ctx: &FieldmarkContext) -> ExecutionResult<Value, IndexError> {
        let start = Instant::now();

        let result: Result<Value> = async {
            let entry = ctx.index().resolve_note(&self.path)?;
            let mut patch = PendingPatch::new(self.path.clone());
            for item in &self.payload {
                let (write, exists) = self.prepare(&entry, item)?;
                patch = if exists { patch.update(write) } else { patch.create(write) };
            }
            if patch.is_empty() {
                return Ok(json!({ "path": self.path, "changed": false }));
            }

            let outcome = ctx.scheduler().apply(patch).await?.ensure_applied(&self.path)?;
            let report = ctx.refresh(&self.path).await?;
            Ok(json!({
                "path": self.path,
                "changed": outcome.changed,
                "header_keys": outcome.header_keys,
                "inline_rewrites": outcome.inline_rewrites,
                "recompute": report,
            }))
        }
        .await;

        logged(self, start, result)
    }
}
