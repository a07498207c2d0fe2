//! Notifications emitted by the index and the engines

use fieldmark_fields::IndexedPath;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::note::NotePath;

/// Capacity of the event channel; slow subscribers see `Lagged` past this
pub const EVENT_CAPACITY: usize = 256;

/// One field value in a [`IndexEvent::FileFieldsChanged`] notification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangedField {
    pub indexed_path: IndexedPath,
    pub name: String,
    /// Item index when the field lives inside an object list
    pub list_index: Option<usize>,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum IndexEvent {
    /// A full reindex finished
    IndexRebuilt { notes: usize, classes: usize },
    /// A note's existing field values changed
    FileFieldsChanged {
        path: NotePath,
        fields: Vec<ChangedField>,
    },
    /// A class definition file was edited and every note reindexed
    ClassReindexed { class: String },
    /// An engine wrote computed values into a note
    ComputedFieldsUpdated { path: NotePath },
}

impl IndexEvent {
    /// Note concerned by the event, if any
    pub fn path(&self) -> Option<&NotePath> {
        match self {
            Self::FileFieldsChanged { path, .. } | Self::ComputedFieldsUpdated { path } => Some(path),
            _ => None,
        }
    }
}

pub(crate) fn channel() -> broadcast::Sender<IndexEvent> {
    broadcast::channel(EVENT_CAPACITY).0
}
