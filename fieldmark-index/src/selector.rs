//! Finding the notes related to a note
//!
//! Lookups ask a [`Selector`] for related notes. [`IndexSelector`] answers from
//! index snapshots: link relations use the links recorded per field, label and
//! color relations use tags and the `color` header key, predicates go through
//! the expression sandbox.

use async_trait::async_trait;
use fieldmark_cel::{Bindings, ExpressionSandbox};
use fieldmark_fields::RelationMatch;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::trace;

use crate::error::{IndexError, Result};
use crate::index::{FieldIndex, NoteEntry};
use crate::note::NotePath;
use crate::tag_parser::has_tag;

#[derive(Debug, Clone, PartialEq)]
pub struct SelectorRequest {
    /// The note whose lookup is being computed
    pub origin: NotePath,
    pub relation: RelationMatch,
    /// Boolean pre-filter over `page` (the candidate) and `current` (the origin)
    pub query: Option<String>,
}

/// A note matched by a selector, with the values expressions see for it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelatedNote {
    pub path: NotePath,
    pub binding: Value,
}

#[async_trait]
pub trait Selector: Send + Sync {
    async fn select(&self, request: &SelectorRequest) -> Result<Vec<RelatedNote>>;
}

pub struct IndexSelector {
    index: Arc<FieldIndex>,
    sandbox: Arc<dyn ExpressionSandbox>,
}

impl IndexSelector {
    pub fn new(index: Arc<FieldIndex>, sandbox: Arc<dyn ExpressionSandbox>) -> Self {
        Self { index, sandbox }
    }

    fn field_links_to(entry: &NoteEntry, field: &str, target: &NotePath) -> bool {
        entry
            .snapshot
            .field_links
            .get(field)
            .is_some_and(|links| links.iter().any(|l| target.matches_target(l)))
    }

    fn matches(&self, origin: &NoteEntry, candidate: &NoteEntry, relation: &RelationMatch, bindings: &Bindings) -> Result<bool> {
        Ok(match relation {
            RelationMatch::LinksTo { field } => Self::field_links_to(candidate, field, origin.path()),
            RelationMatch::LinkedFrom { field } => Self::field_links_to(origin, field, candidate.path()),
            RelationMatch::Label { label } => has_tag(&candidate.snapshot.tags, label),
            RelationMatch::Color { color } => candidate
                .snapshot
                .header
                .get("color")
                .and_then(Value::as_str)
                .is_some_and(|c| c.eq_ignore_ascii_case(color)),
            RelationMatch::Predicate { expression } => self.sandbox.evaluate_bool(expression, bindings)?,
        })
    }
}

#[async_trait]
impl Selector for IndexSelector {
    async fn select(&self, request: &SelectorRequest) -> Result<Vec<RelatedNote>> {
        let state = self.index.snapshot();
        let origin = state
            .note(&request.origin)
            .ok_or_else(|| IndexError::note_not_found(request.origin.as_str()))?;
        let current = origin.binding();

        let mut related = Vec::new();
        for candidate in state.notes.values().filter(|n| n.path() != origin.path()) {
            let page = candidate.binding();
            let bindings = Bindings::new().with_current(current.clone()).with_page(page.clone());
            if let Some(query) = &request.query {
                if !self.sandbox.evaluate_bool(query, &bindings)? {
                    continue;
                }
            }
            if self.matches(origin, candidate, &request.relation, &bindings)? {
                related.push(RelatedNote {
                    path: candidate.path().clone(),
                    binding: page,
                });
            }
        }

        trace!(origin = %request.origin, related = related.len(), "selected related notes");
        Ok(related)
    }
}
