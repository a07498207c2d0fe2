//! Formula fields: expressions over the note's own values
//!
//! Besides `current`, a formula sees `pages` (every indexed note) and `linked`
//! (the notes `current` links to), each bound the same way as `current`.

use fieldmark_cel::{Bindings, ExpressionSandbox};
use fieldmark_fields::kinds::value_to_text;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use super::cache::{CacheEntry, ComputeCache, ComputeStatus, FormulaKey};
use super::{collect_jobs, settle, write_back, Job, PendingWrites, Policy, RecomputeReport, RecomputeScope};
use crate::error::{IndexError, Result};
use crate::index::{FieldIndex, IndexState, NoteEntry};
use crate::note::NotePath;
use crate::scheduler::WriteScheduler;

pub struct FormulaEngine {
    index: Arc<FieldIndex>,
    scheduler: Arc<WriteScheduler>,
    sandbox: Arc<dyn ExpressionSandbox>,
    cache: ComputeCache<FormulaKey>,
}

impl FormulaEngine {
    pub fn new(index: Arc<FieldIndex>, scheduler: Arc<WriteScheduler>, sandbox: Arc<dyn ExpressionSandbox>) -> Self {
        Self {
            index,
            scheduler,
            sandbox,
            cache: ComputeCache::new(),
        }
    }

    pub async fn recompute(&self, scope: &RecomputeScope) -> Result<RecomputeReport> {
        let state = self.index.snapshot();
        let jobs = collect_jobs(&state, scope, |f| f.type_.as_formula().is_some())?;

        let pages: Vec<Value> = if jobs.is_empty() {
            Vec::new()
        } else {
            state.notes.values().map(NoteEntry::binding).collect()
        };

        let mut report = RecomputeReport::default();
        let mut pending = PendingWrites::<FormulaKey>::default();
        for job in &jobs {
            let Some(options) = job.field().type_.as_formula() else {
                continue;
            };
            let result = self.evaluate(&state, &pages, job, &options.formula);
            let policy = Policy {
                mode: None,
                auto_update: options.auto_update,
            };
            let key = FormulaKey::new(&job.path, job.field());
            settle(&self.cache, key, job, result, policy, &mut pending, &mut report);
        }
        write_back(&self.index, &self.scheduler, &self.cache, pending, &mut report).await;

        info!(
            written = report.written.len(),
            changed = report.changed.len(),
            errors = report.errors.len(),
            "formulas recomputed"
        );
        Ok(report)
    }

    pub fn status(&self, path: &NotePath, field: &str) -> Option<ComputeStatus> {
        self.entry(path, field).map(|e| e.status)
    }

    pub fn entry(&self, path: &NotePath, field: &str) -> Option<CacheEntry> {
        let state = self.index.snapshot();
        let def = state.note(path)?.field(field)?;
        self.cache.get(&FormulaKey::new(path, def))
    }

    pub fn invalidate(&self) -> usize {
        let dropped = self.cache.invalidate(&self.index.snapshot());
        debug!(dropped, "formula cache invalidated");
        dropped
    }

    fn evaluate(&self, state: &IndexState, pages: &[Value], job: &Job, formula: &str) -> Result<Value> {
        let note = state
            .note(&job.path)
            .ok_or_else(|| IndexError::note_not_found(job.path.as_str()))?;
        let bindings = Bindings::new()
            .with_current(note.binding())
            .with_pages(pages.to_vec())
            .with_var("linked", Value::Array(linked(state, note)));
        let value = self.sandbox.evaluate(formula, &bindings)?;
        Ok(stringify(value))
    }
}

/// Bindings of the notes `note` links to, in index order
fn linked(state: &IndexState, note: &NoteEntry) -> Vec<Value> {
    state
        .notes
        .values()
        .filter(|candidate| {
            candidate.path() != note.path()
                && note.snapshot.links.iter().any(|link| candidate.path().matches_target(link))
        })
        .map(NoteEntry::binding)
        .collect()
}

/// Formula results are always written as text
fn stringify(value: Value) -> Value {
    match value {
        Value::String(_) => value,
        other => Value::String(value_to_text(&other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stringify() {
        assert_eq!(stringify(json!(12)), json!("12"));
        assert_eq!(stringify(json!(true)), json!("true"));
        assert_eq!(stringify(json!("x")), json!("x"));
        assert_eq!(stringify(Value::Null), json!(""));
        assert_eq!(stringify(json!(["a", "b"])), json!("a, b"));
    }
}
