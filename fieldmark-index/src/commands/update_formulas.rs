//! UpdateFormulas command

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;

use super::{logged, Execute, ExecutionResult, Operation};
use crate::context::FieldmarkContext;
use crate::engine::RecomputeScope;
use crate::error::{IndexError, Result};
use crate::note::NotePath;

/// Recompute the formula fields of one note, or one formula field
#[derive(Debug, Deserialize, Serialize)]
pub struct UpdateFormulas {
    pub path: NotePath,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl UpdateFormulas {
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

impl Operation for UpdateFormulas {
    fn op_string(&self) -> String {
        "update formulas".to_string()
    }
}

#[async_trait]
impl Execute<FieldmarkContext, IndexError> for UpdateFormulas {
    async fn execute(&self, ctx: &FieldmarkContext) -> ExecutionResult<Value, IndexError> {
        let start = Instant::now();

        let result: Result<Value> = async {
            let scope = RecomputeScope::for_request(self.path.clone(), self.field.clone());
            let report = ctx.formulas().recompute(&scope).await?;
            Ok(serde_json::to_value(report)?)
        }
        .await;

        logged(self, start, result)
    }
}
