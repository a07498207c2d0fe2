//! UpdateLookups command

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;

use super::{logged, Execute, ExecutionResult, Operation};
use crate::context::FieldmarkContext;
use crate::engine::RecomputeScope;
use crate::error::{IndexError, Result};
use crate::note::NotePath;

/// Recompute the lookup fields of one note, or one lookup field.
///
/// Naming a field counts as an explicit request: its value is written even if
/// the field does not update automatically.
#[derive(Debug, Deserialize, Serialize)]
pub struct UpdateLookups {
    pub path: NotePath,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl UpdateLookups {
    pub fn new(path: impl Into<NotePath>) -> Self {
        Self {
            path: path.into(),
            field: None,
        }
    }

    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

impl Operation for UpdateLookups {
    fn op_string(&self) -> String {
        "update lookups".to_string()
    }
}

#[async_trait]
impl Execute<FieldmarkContext, IndexError> for UpdateLookups {
    async fn execute(&self, ctx: &FieldmarkContext) -> ExecutionResult<Value, IndexError> {
        let start = Instant::now();

        let result: Result<Value> = async {
            let scope = RecomputeScope::for_request(self.path.clone(), self.field.clone());
            let report = ctx.lookups().recompute(&scope).await?;
            Ok(serde_json::to_value(report)?)
        }
        .await;

        logged(self, start, result)
    }
}
