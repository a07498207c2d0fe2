//! Computed field engines
//!
//! Lookup and formula fields are recomputed in two phases. *Evaluate* produces
//! a fresh value per occurrence, concurrently and independently. *Reconcile*
//! compares it with the engine's cache and decides between doing nothing,
//! writing the value, or marking the field as changed for a manual refresh.
//!
//! The cache is updated before a value is handed to the [`WriteScheduler`], so
//! the engine's own write never looks like a change on the next pass. Every run
//! returns a [`RecomputeReport`]; callers await it instead of polling the note.

pub mod cache;
pub mod formula;
pub mod lookup;
pub mod reconcile;

use fieldmark_fields::{FieldDef, IndexedPath};
use futures::future::join_all;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{IndexError, Result};
use crate::events::IndexEvent;
use crate::index::{ExistingField, FieldIndex, IndexState};
use crate::note::NotePath;
use crate::patcher::{FieldWrite, PathStep};
use crate::scheduler::{PendingPatch, WriteScheduler};

pub use cache::{CacheEntry, CacheKey, ComputeCache, ComputeStatus, FormulaKey, LookupKey};
pub use formula::FormulaEngine;
pub use lookup::LookupEngine;
pub use reconcile::{decide, values_equal, Decision};

/// Which computed fields a run covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecomputeScope {
    /// Every note
    All,
    /// Every computed field of one note
    Note(NotePath),
    /// One field of one note. Counts as an explicit request, so the value is
    /// written even when the field does not update automatically.
    Field { path: NotePath, field: String },
}

impl RecomputeScope {
    pub fn note(path: impl Into<NotePath>) -> Self {
        Self::Note(path.into())
    }

    pub fn field(path: impl Into<NotePath>, field: impl Into<String>) -> Self {
        Self::Field {
            path: path.into(),
            field: field.into(),
        }
    }

    /// Scope of a command that names a note and optionally one field
    pub fn for_request(path: NotePath, field: Option<String>) -> Self {
        match field {
            Some(field) => Self::Field { path, field },
            None => Self::Note(path),
        }
    }

    fn targets(&self, field: &str) -> bool {
        matches!(self, Self::Field { field: name, .. } if name == field)
    }
}

/// Address of one computed occurrence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldRef {
    pub path: NotePath,
    pub field: String,
    pub indexed_path: IndexedPath,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldFailure {
    pub path: NotePath,
    pub field: String,
    pub message: String,
}

/// What a recompute run did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecomputeReport {
    /// Occurrences whose new value was written
    pub written: Vec<FieldRef>,
    /// Occurrences with a newer value waiting for a manual refresh
    pub changed: Vec<FieldRef>,
    pub errors: Vec<FieldFailure>,
    pub up_to_date: usize,
}

impl RecomputeReport {
    pub fn merge(&mut self, other: RecomputeReport) {
        self.written.extend(other.written);
        self.changed.extend(other.changed);
        self.errors.extend(other.errors);
        self.up_to_date += other.up_to_date;
    }

    pub fn write_count(&self) -> usize {
        self.written.len()
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// One computed occurrence to evaluate
#[derive(Debug, Clone)]
pub(crate) struct Job {
    pub path: NotePath,
    pub existing: ExistingField,
    pub steps: Vec<PathStep>,
    pub targeted: bool,
}

impl Job {
    pub fn field(&self) -> &FieldDef {
        &self.existing.field
    }

    pub fn field_ref(&self) -> FieldRef {
        FieldRef {
            path: self.path.clone(),
            field: self.existing.field.name.clone(),
            indexed_path: self.existing.indexed_path.clone(),
        }
    }

    fn failure(&self, message: impl Into<String>) -> FieldFailure {
        FieldFailure {
            path: self.path.clone(),
            field: self.existing.field.name.clone(),
            message: message.into(),
        }
    }

    fn write(&self, value: Value) -> FieldWrite {
        FieldWrite::nested(self.steps.clone(), value).with_indexed_path(self.existing.indexed_path.clone())
    }
}

/// Existing occurrences in scope whose field passes `wanted`.
///
/// Only occurrences already present in a note are recomputed; a computed field
/// the note does not mention yet is left for an explicit insert.
pub(crate) fn collect_jobs(state: &IndexState, scope: &RecomputeScope, wanted: impl Fn(&FieldDef) -> bool) -> Result<Vec<Job>> {
    let notes: Vec<_> = match scope {
        RecomputeScope::All => state.notes.values().collect(),
        RecomputeScope::Note(path) | RecomputeScope::Field { path, .. } => {
            vec![state
                .note(path)
                .ok_or_else(|| IndexError::note_not_found(path.as_str()))?]
        }
    };

    if let RecomputeScope::Field { path, field } = scope {
        let declared = notes
            .iter()
            .flat_map(|n| n.fields.iter())
            .any(|f| &f.name == field && wanted(f));
        if !declared {
            return Err(IndexError::field_not_found(path.as_str(), field.as_str()));
        }
    }

    let mut jobs = Vec::new();
    for note in notes {
        for existing in note.existing.iter().filter(|e| wanted(&e.field)) {
            if let RecomputeScope::Field { field, .. } = scope {
                if &existing.field.name != field {
                    continue;
                }
            }
            let Some(steps) = note.steps_for(&existing.indexed_path) else {
                debug!(path = %note.path(), indexed_path = %existing.indexed_path.as_str(), "no patch address for occurrence");
                continue;
            };
            jobs.push(Job {
                path: note.path().clone(),
                existing: existing.clone(),
                steps,
                targeted: scope.targets(&existing.field.name),
            });
        }
    }
    Ok(jobs)
}

/// Per-field settings that drive reconciliation
#[derive(Debug, Clone, Copy)]
pub(crate) struct Policy<'a> {
    pub mode: Option<&'a str>,
    pub auto_update: bool,
}

/// A value handed to the scheduler, with the cache entry it replaced
#[derive(Debug, Clone)]
pub(crate) struct PendingWrite<K> {
    key: K,
    field: FieldRef,
    write: FieldWrite,
    prior: CacheEntry,
}

/// Writes collected during one run, grouped by note
pub(crate) type PendingWrites<K> = IndexMap<NotePath, Vec<PendingWrite<K>>>;

/// Reconcile one evaluated occurrence against the cache. A write decision
/// lands in `pending`; the cache already holds the new value by then.
pub(crate) fn settle<K: CacheKey>(
    cache: &ComputeCache<K>,
    key: K,
    job: &Job,
    result: Result<Value>,
    policy: Policy<'_>,
    pending: &mut PendingWrites<K>,
    report: &mut RecomputeReport,
) {
    let signature = job.field().type_signature();
    let value = match result {
        Ok(value) => value,
        Err(err) => {
            warn!(path = %job.path, field = %job.field().name, error = %err, "computed field failed");
            let message = err.to_string();
            cache.mark(key, ComputeStatus::Error, job.existing.value.clone(), signature, Some(message.clone()));
            report.errors.push(job.failure(message));
            return;
        }
    };

    let cached = cache.get(&key);
    let previous = cached.as_ref().map_or(&job.existing.value, |c| &c.value);
    let mode_changed = match (cached.as_ref().and_then(|c| c.mode.as_deref()), policy.mode) {
        (Some(old), Some(new)) => old != new,
        _ => false,
    };

    match decide(previous, &value, mode_changed, policy.auto_update, job.targeted) {
        Decision::Unchanged => {
            cache.insert(key, CacheEntry::up_to_date(value, policy.mode, signature));
            report.up_to_date += 1;
        }
        Decision::MarkChanged => {
            debug!(path = %job.path, field = %job.field().name, "computed value changed, waiting for refresh");
            cache.mark(key, ComputeStatus::Changed, previous.clone(), signature, None);
            report.changed.push(job.field_ref());
        }
        Decision::Write => {
            let prior = cached.unwrap_or_else(|| CacheEntry {
                value: job.existing.value.clone(),
                mode: None,
                status: ComputeStatus::UpToDate,
                signature: signature.clone(),
                error: None,
            });
            cache.insert(key.clone(), CacheEntry::up_to_date(value.clone(), policy.mode, signature));
            pending.entry(job.path.clone()).or_default().push(PendingWrite {
                key,
                field: job.field_ref(),
                write: job.write(value),
                prior,
            });
        }
    }
}

/// Funnel pending writes through the scheduler, one patch per note, then
/// refresh the index for every note that changed.
///
/// A failed note does not stop the others. Its fields are reported and their
/// cache entries go back to the value the note still holds, marked as errors.
pub(crate) async fn write_back<K: CacheKey>(
    index: &FieldIndex,
    scheduler: &WriteScheduler,
    cache: &ComputeCache<K>,
    pending: PendingWrites<K>,
    report: &mut RecomputeReport,
) {
    let applied = join_all(pending.into_iter().map(|(path, writes)| async move {
        let patch = writes
            .iter()
            .fold(PendingPatch::new(path.clone()), |patch, pending| patch.update(pending.write.clone()));
        let outcome = scheduler.apply(patch).await;
        (path, writes, outcome)
    }))
    .await;

    for (path, writes, outcome) in applied {
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(path = %path, error = %err, "computed values could not be written");
                for pending in writes {
                    fail(cache, pending, err.to_string(), report);
                }
                continue;
            }
        };

        for pending in writes {
            if outcome.missed.iter().any(|m| m == pending.field.indexed_path.as_str()) {
                fail(cache, pending, "no occurrence left to rewrite".to_string(), report);
            } else {
                report.written.push(pending.field);
            }
        }

        if outcome.changed {
            if let Err(err) = index.update(&path).await {
                warn!(path = %path, error = %err, "reindex after computed write failed");
            }
            index.emit(IndexEvent::ComputedFieldsUpdated { path });
        }
    }
}

/// The unwritten value must not stay cached, or the next pass would see no
/// change and never write it.
fn fail<K: CacheKey>(cache: &ComputeCache<K>, pending: PendingWrite<K>, message: String, report: &mut RecomputeReport) {
    let PendingWrite { key, field, prior, .. } = pending;
    cache.insert(
        key,
        CacheEntry {
            status: ComputeStatus::Error,
            error: Some(message.clone()),
            ..prior
        },
    );
    report.errors.push(FieldFailure {
        path: field.path,
        field: field.field,
        message,
    });
}
