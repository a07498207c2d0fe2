//! Last computed value per computed field occurrence

use dashmap::DashMap;
use fieldmark_fields::{FieldDef, FieldId};
use serde::Serialize;
use serde_json::Value;
use std::hash::Hash;

use crate::index::IndexState;
use crate::note::NotePath;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComputeStatus {
    /// The note holds the last computed value
    UpToDate,
    /// A newer value was computed but not written (manual refresh pending)
    Changed,
    /// The last evaluation failed; the cached value is the one before it
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    pub value: Value,
    /// Lookup output mode the value was rendered with
    pub mode: Option<String>,
    pub status: ComputeStatus,
    /// Type signature of the field when the entry was written
    pub signature: String,
    pub error: Option<String>,
}

impl CacheEntry {
    pub fn up_to_date(value: Value, mode: Option<&str>, signature: String) -> Self {
        Self {
            value,
            mode: mode.map(str::to_string),
            status: ComputeStatus::UpToDate,
            signature,
            error: None,
        }
    }
}

/// A cache key that can tell whether its field still exists unchanged
pub trait CacheKey: Eq + Hash + Clone {
    fn path(&self) -> &NotePath;

    /// The field this key was computed for, if the note still declares it
    fn field<'a>(&self, state: &'a IndexState) -> Option<&'a FieldDef>;
}

/// Lookup cache key: note, field id and defining class
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct LookupKey {
    pub path: NotePath,
    pub field: FieldId,
    pub class: Option<String>,
}

impl LookupKey {
    pub fn new(path: &NotePath, field: &FieldDef) -> Self {
        Self {
            path: path.clone(),
            field: field.id.clone(),
            class: field.origin.class_name().map(str::to_string),
        }
    }
}

impl CacheKey for LookupKey {
    fn path(&self) -> &NotePath {
        &self.path
    }

    fn field<'a>(&self, state: &'a IndexState) -> Option<&'a FieldDef> {
        state
            .note(&self.path)?
            .fields
            .iter()
            .find(|f| f.id == self.field && f.origin.class_name() == self.class.as_deref())
    }
}

/// Formula cache key: note, defining class and field name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FormulaKey {
    pub path: NotePath,
    pub class: Option<String>,
    pub name: String,
}

impl FormulaKey {
    pub fn new(path: &NotePath, field: &FieldDef) -> Self {
        Self {
            path: path.clone(),
            class: field.origin.class_name().map(str::to_string),
            name: field.name.clone(),
        }
    }
}

impl CacheKey for FormulaKey {
    fn path(&self) -> &NotePath {
        &self.path
    }

    fn field<'a>(&self, state: &'a IndexState) -> Option<&'a FieldDef> {
        state
            .note(&self.path)?
            .fields
            .iter()
            .find(|f| f.name == self.name && f.origin.class_name() == self.class.as_deref())
    }
}

/// Concurrent map of cache entries, owned by one engine
#[derive(Debug)]
pub struct ComputeCache<K: CacheKey> {
    entries: DashMap<K, CacheEntry>,
}

impl<K: CacheKey> Default for ComputeCache<K> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<K: CacheKey> ComputeCache<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<CacheEntry> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    pub fn status(&self, key: &K) -> Option<ComputeStatus> {
        self.entries.get(key).map(|e| e.status)
    }

    pub fn insert(&self, key: K, entry: CacheEntry) {
        self.entries.insert(key, entry);
    }

    /// Set the status of an entry without touching its value. A missing
    /// entry is created holding `fallback`.
    pub fn mark(&self, key: K, status: ComputeStatus, fallback: Value, signature: String, error: Option<String>) {
        self.entries
            .entry(key)
            .and_modify(|e| {
                e.status = status;
                e.error = error.clone();
            })
            .or_insert_with(|| CacheEntry {
                value: fallback,
                mode: None,
                status,
                signature,
                error,
            });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Drop entries whose field disappeared or whose type signature changed.
    /// Returns how many were dropped.
    pub fn invalidate(&self, state: &IndexState) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, entry| {
            key.field(state)
                .is_some_and(|field| field.type_signature() == entry.signature)
        });
        before - self.entries.len()
    }
}
