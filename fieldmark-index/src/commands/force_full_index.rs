//! ForceFullIndex command

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Instant;

use super::{logged, Execute, ExecutionResult, Operation};
use crate::context::FieldmarkContext;
use crate::error::{IndexError, Result};

/// Rebuild the whole index, then recompute every computed field
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ForceFullIndex {}

impl ForceFullIndex {
    pub fn new() -> Self {
        Self {}
    }
}

impl Operation for ForceFullIndex {
    fn op_string(&self) -> String {
        "force full index".to_string()
    }
}

#[async_trait]
impl Execute<FieldmarkContext, IndexError> for ForceFullIndex {
    async fn execute(&self, ctx: &FieldmarkContext) -> ExecutionResult<Value, IndexError> {
        let start = Instant::now();

        let result: Result<Value> = async {
            let invalidated = ctx.rebuild().await?;
            let report = ctx.recompute_all().await?;
            let state = ctx.snapshot();
            Ok(json!({
                "notes": state.notes.len(),
                "classes": state.registry.len(),
                "invalid_classes": state.invalid_classes,
                "invalidated": invalidated,
                "recompute": report,
            }))
        }
        .await;

        logged(self, start, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexSettings;
    use crate::events::IndexEvent;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_force_full_index_picks_up_new_notes() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.md"), "x:: 1\n").unwrap();
        let ctx = FieldmarkContext::open(temp.path())
            .with_settings(IndexSettings::default())
            .build()
            .await
            .unwrap();
        let mut events = ctx.subscribe();

        fs::write(temp.path().join("b.md"), "y:: 2\n").unwrap();
        let result = ForceFullIndex::new().execute(&ctx).await.into_result().unwrap();

        assert_eq!(result["notes"], 2);
        assert!(matches!(events.recv().await.unwrap(), IndexEvent::IndexRebuilt { notes: 2, .. }));
    }

    #[tokio::test]
    async fn test_force_full_index_is_logged() {
        let temp = TempDir::new().unwrap();
        let ctx = FieldmarkContext::open(temp.path())
            .with_settings(IndexSettings::default())
            .build()
            .await
            .unwrap();

        let outcome = ForceFullIndex::new().execute(&ctx).await;
        assert!(outcome.should_log());
        let (_, entry) = outcome.split();
        assert_eq!(entry.unwrap().op, "force full index");
    }
}
