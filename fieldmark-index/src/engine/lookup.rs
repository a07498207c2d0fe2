//! Lookup fields: values aggregated from related notes

use fieldmark_cel::{Bindings, ExpressionSandbox};
use fieldmark_fields::kinds::value_to_text;
use fieldmark_fields::{LookupOptions, LookupOutput, SummarizingFunction};
use futures::future::join_all;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use super::cache::{CacheEntry, ComputeCache, ComputeStatus, LookupKey};
use super::{collect_jobs, settle, write_back, Job, PendingWrites, Policy, RecomputeReport, RecomputeScope};
use crate::error::{IndexError, Result};
use crate::index::{FieldIndex, IndexState};
use crate::note::NotePath;
use crate::scheduler::WriteScheduler;
use crate::selector::{RelatedNote, Selector, SelectorRequest};

pub struct LookupEngine {
    index: Arc<FieldIndex>,
    scheduler: Arc<WriteScheduler>,
    selector: Arc<dyn Selector>,
    sandbox: Arc<dyn ExpressionSandbox>,
    cache: ComputeCache<LookupKey>,
}

impl LookupEngine {
    pub fn new(
        index: Arc<FieldIndex>,
        scheduler: Arc<WriteScheduler>,
        selector: Arc<dyn Selector>,
        sandbox: Arc<dyn ExpressionSandbox>,
    ) -> Self {
        Self {
            index,
            scheduler,
            selector,
            sandbox,
            cache: ComputeCache::new(),
        }
    }

    /// Recompute every lookup occurrence in `scope`
    pub async fn recompute(&self, scope: &RecomputeScope) -> Result<RecomputeReport> {
        let state = self.index.snapshot();
        let jobs = collect_jobs(&state, scope, |f| f.type_.as_lookup().is_some())?;
        let results = join_all(jobs.iter().map(|job| self.evaluate(&state, job))).await;

        let mut report = RecomputeReport::default();
        let mut pending = PendingWrites::<LookupKey>::default();
        for (job, result) in jobs.iter().zip(results) {
            let Some(options) = job.field().type_.as_lookup() else {
                continue;
            };
            let policy = Policy {
                mode: Some(options.output.mode_name()),
                auto_update: options.auto_update,
            };
            let key = LookupKey::new(&job.path, job.field());
            settle(&self.cache, key, job, result, policy, &mut pending, &mut report);
        }
        write_back(&self.index, &self.scheduler, &self.cache, pending, &mut report).await;

        info!(
            written = report.written.len(),
            changed = report.changed.len(),
            errors = report.errors.len(),
            "lookups recomputed"
        );
        Ok(report)
    }

    /// Status of a top-level lookup field of a note
    pub fn status(&self, path: &NotePath, field: &str) -> Option<ComputeStatus> {
        self.entry(path, field).map(|e| e.status)
    }

    pub fn entry(&self, path: &NotePath, field: &str) -> Option<CacheEntry> {
        let state = self.index.snapshot();
        let def = state.note(path)?.field(field)?;
        self.cache.get(&LookupKey::new(path, def))
    }

    /// Drop cache entries invalidated by a structural reindex
    pub fn invalidate(&self) -> usize {
        let dropped = self.cache.invalidate(&self.index.snapshot());
        debug!(dropped, "lookup cache invalidated");
        dropped
    }

    async fn evaluate(&self, state: &IndexState, job: &Job) -> Result<Value> {
        let options = job
            .field()
            .type_
            .as_lookup()
            .ok_or_else(|| IndexError::invalid_value(&job.field().name, "not a lookup field"))?;
        let current = state
            .note(&job.path)
            .map(|n| n.binding())
            .ok_or_else(|| IndexError::note_not_found(job.path.as_str()))?;

        let request = SelectorRequest {
            origin: job.path.clone(),
            relation: options.relation.clone(),
            query: options.query.clone(),
        };
        let related = self.selector.select(&request).await?;
        render(self.sandbox.as_ref(), options, &current, &related)
    }
}

/// Render related notes according to the lookup's output mode
pub fn render(
    sandbox: &dyn ExpressionSandbox,
    options: &LookupOptions,
    current: &Value,
    related: &[RelatedNote],
) -> Result<Value> {
    match &options.output {
        LookupOutput::LinksList => Ok(Value::String(links(related).join(", "))),
        LookupOutput::LinksBulletList => Ok(Value::Array(links(related).into_iter().map(Value::String).collect())),
        LookupOutput::CustomList { expression } => {
            let mut items = Vec::with_capacity(related.len());
            for note in related {
                let bindings = Bindings::new()
                    .with_current(current.clone())
                    .with_page(note.binding.clone());
                let item = value_to_text(&sandbox.evaluate(expression, &bindings)?);
                if !item.is_empty() {
                    items.push(item);
                }
            }
            Ok(Value::String(items.join(", ")))
        }
        LookupOutput::CustomSummarizing { expression } => {
            let bindings = Bindings::new()
                .with_current(current.clone())
                .with_pages(related.iter().map(|n| n.binding.clone()).collect());
            Ok(sandbox.evaluate(expression, &bindings)?)
        }
        LookupOutput::BuiltinSummarizing { function, field } => {
            let values: Vec<&Value> = related
                .iter()
                .map(|n| n.binding.get(field).unwrap_or(&Value::Null))
                .collect();
            Ok(summarize(*function, &values))
        }
    }
}

fn links(related: &[RelatedNote]) -> Vec<String> {
    related.iter().map(|n| n.path.wikilink()).collect()
}

fn number_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Whole numbers come back as integers so `3` is not written as `3.0`
fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        json!(n as i64)
    } else {
        json!(n)
    }
}

fn summarize(function: SummarizingFunction, values: &[&Value]) -> Value {
    let numbers = || values.iter().filter_map(|v| number_value(v));
    match function {
        SummarizingFunction::Count => json!(values.iter().filter(|v| !is_empty(v)).count()),
        SummarizingFunction::CountAll => json!(values.len()),
        SummarizingFunction::Sum => number(numbers().sum()),
        SummarizingFunction::Average => {
            let (sum, count) = numbers().fold((0.0, 0usize), |(s, c), n| (s + n, c + 1));
            if count == 0 {
                json!(0)
            } else {
                number(sum / count as f64)
            }
        }
        SummarizingFunction::Min => numbers().reduce(f64::min).map_or(Value::Null, number),
        SummarizingFunction::Max => numbers().reduce(f64::max).map_or(Value::Null, number),
    }
}
