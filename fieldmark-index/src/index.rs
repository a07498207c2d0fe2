//! The field index
//!
//! For every note the index keeps the classes bound to it, the merged field
//! schema (preset, class and ad hoc fields) and the observed value of each
//! field. The whole state is an immutable [`IndexState`] behind an `Arc`;
//! [`FieldIndex::rebuild`] and [`FieldIndex::update`] build a new state and swap
//! it in, so readers holding a snapshot never see a note half indexed.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use fieldmark_cel::{Bindings, ExpressionSandbox};
use fieldmark_common::Pretty;
use fieldmark_fields::path::PATH_SEPARATOR;
use fieldmark_fields::{ClassDef, ClassRegistry, FieldDef, IndexedPath, SchemaResolution};
use futures::future::join_all;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use crate::config::IndexSettings;
use crate::error::{IndexError, Result};
use crate::events::{self, ChangedField, IndexEvent};
use crate::frontmatter;
use crate::note::{extract_links, links_in_value, NotePath};
use crate::patcher::{self, FieldLocation, PathStep};
use crate::tag_parser::{has_tag, header_tags, parse_tags};
use crate::vault::Vault;

/// What a note's text says, before any schema is applied
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoteSnapshot {
    pub path: NotePath,
    /// Parsed header block, `Null` when absent
    pub header: Value,
    /// Observed values by field name; header values win over inline ones and
    /// repeated inline fields collect into a list
    pub values: IndexMap<String, Value>,
    pub locations: IndexMap<String, FieldLocation>,
    pub tags: Vec<String>,
    /// Every link target in the note, in order of appearance
    pub links: Vec<String>,
    /// Link targets found in each field's value
    pub field_links: IndexMap<String, Vec<String>>,
}

fn push_unique(items: &mut Vec<String>, item: &str) {
    if !items.iter().any(|i| i == item) {
        items.push(item.to_string());
    }
}

impl NoteSnapshot {
    pub fn parse(path: NotePath, content: &str) -> Self {
        let header = frontmatter::locate(content).map_or(Value::Null, |h| h.value);

        let mut values: IndexMap<String, Value> = IndexMap::new();
        let mut locations = IndexMap::new();
        let mut header_keys = BTreeSet::new();
        for occurrence in patcher::read_all(content) {
            let name = occurrence.name;
            if occurrence.location == FieldLocation::Header {
                header_keys.insert(name.clone());
            } else if header_keys.contains(&name) {
                continue;
            }
            match values.get_mut(&name) {
                Some(Value::Array(items)) if occurrence.location != FieldLocation::Header => {
                    items.push(occurrence.value)
                }
                Some(existing) if occurrence.location != FieldLocation::Header => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, occurrence.value]);
                }
                _ => {
                    locations.insert(name.clone(), occurrence.location);
                    values.insert(name, occurrence.value);
                }
            }
        }

        let mut tags = Vec::new();
        if let Some(declared) = header.get("tags") {
            for tag in header_tags(declared) {
                push_unique(&mut tags, &tag);
            }
        }
        for tag in parse_tags(&patcher::body(content)) {
            push_unique(&mut tags, &tag);
        }

        let mut links = Vec::new();
        for link in extract_links(content) {
            push_unique(&mut links, &link);
        }

        let field_links = values
            .iter()
            .map(|(name, value)| (name.clone(), links_in_value(value)))
            .filter(|(_, links)| !links.is_empty())
            .collect();

        Self {
            path,
            header,
            values,
            locations,
            tags,
            links,
            field_links,
        }
    }

    /// Raw values plus a `file` object, as bound to expressions
    pub fn binding(&self) -> Value {
        let mut map: serde_json::Map<String, Value> = self
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        map.insert(
            "file".to_string(),
            json!({
                "path": self.path.as_str(),
                "name": self.path.basename(),
                "tags": self.tags,
                "links": self.links,
            }),
        );
        Value::Object(map)
    }
}

/// One note's value for one field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExistingField {
    pub indexed_path: IndexedPath,
    pub field: FieldDef,
    pub value: Value,
    pub location: FieldLocation,
    /// Item index of the enclosing object list entry
    pub list_index: Option<usize>,
}

/// Everything the index knows about one note
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoteEntry {
    pub snapshot: NoteSnapshot,
    /// Bound classes, identity-key classes first
    pub classes: Vec<String>,
    /// Merged schema
    pub fields: Vec<FieldDef>,
    pub existing: Vec<ExistingField>,
    /// Top-level fields of the schema with no value in the note
    pub missing: Vec<FieldDef>,
}

impl NoteEntry {
    pub fn path(&self) -> &NotePath {
        &self.snapshot.path
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.is_top_level() && f.name == name)
    }

    pub fn existing_field(&self, name: &str) -> Option<&ExistingField> {
        self.existing
            .iter()
            .find(|e| e.indexed_path.is_top_level() && e.field.name == name)
    }

    pub fn existing_at(&self, path: &IndexedPath) -> Option<&ExistingField> {
        self.existing.iter().find(|e| &e.indexed_path == path)
    }

    /// Translate an indexed path into the field-name steps used for patching
    pub fn steps_for(&self, path: &IndexedPath) -> Option<Vec<PathStep>> {
        path.segments()
            .into_iter()
            .map(|segment| {
                let field = self.fields.iter().find(|f| f.id == segment.id)?;
                Some(PathStep {
                    key: field.name.clone(),
                    index: segment.index,
                })
            })
            .collect()
    }

    /// Values as bound to expressions: raw values, typed through the schema
    /// where a field is known, plus a `file` object
    pub fn binding(&self) -> Value {
        let mut binding = self.snapshot.binding();
        if let Value::Object(map) = &mut binding {
            for existing in self.existing.iter().filter(|e| e.indexed_path.is_top_level()) {
                if let Value::String(raw) = &existing.value {
                    if existing.location != FieldLocation::Header {
                        map.insert(existing.field.name.clone(), existing.field.type_.kind().deserialize(raw));
                    }
                }
            }
        }
        binding
    }

    pub fn changed_fields(&self) -> Vec<ChangedField> {
        self.existing
            .iter()
            .map(|e| ChangedField {
                indexed_path: e.indexed_path.clone(),
                name: e.field.name.clone(),
                list_index: e.list_index,
                value: e.value.clone(),
            })
            .collect()
    }
}

/// An immutable view of the whole index
#[derive(Debug, Clone, Default)]
pub struct IndexState {
    pub registry: ClassRegistry,
    pub schema: SchemaResolution,
    /// Class name to its definition file
    pub class_files: BTreeMap<String, NotePath>,
    /// Classes whose definition file could not be read, with the reason
    pub invalid_classes: BTreeMap<String, String>,
    pub notes: BTreeMap<NotePath, NoteEntry>,
    /// Class name to the notes bound to it
    pub class_notes: BTreeMap<String, BTreeSet<NotePath>>,
}

impl IndexState {
    pub fn note(&self, path: &NotePath) -> Option<&NoteEntry> {
        self.notes.get(path)
    }

    pub fn fields_of(&self, path: &NotePath) -> Option<&[FieldDef]> {
        self.notes.get(path).map(|n| n.fields.as_slice())
    }

    pub fn classes_of(&self, path: &NotePath) -> Option<&[String]> {
        self.notes.get(path).map(|n| n.classes.as_slice())
    }

    /// Resolved fields of a class, inheritance applied
    pub fn class_fields(&self, class: &str) -> Option<&[FieldDef]> {
        self.schema.get(class).map(|c| c.fields.as_slice())
    }

    /// Parent chain of a class, nearest first
    pub fn ancestors(&self, class: &str) -> Option<&[String]> {
        self.schema.get(class).map(|c| c.ancestors.as_slice())
    }

    pub fn notes_of_class(&self, class: &str) -> impl Iterator<Item = &NotePath> {
        self.class_notes.get(class).into_iter().flatten()
    }

    pub fn note_paths(&self) -> impl Iterator<Item = &NotePath> {
        self.notes.keys()
    }

    fn index_class_notes(&mut self) {
        self.class_notes.clear();
        for (path, entry) in &self.notes {
            for class in &entry.classes {
                self.class_notes
                    .entry(class.clone())
                    .or_default()
                    .insert(path.clone());
            }
        }
    }
}

/// Window around the index's own last write to one note
#[derive(Debug, Clone, Copy, Default)]
struct Watermarks {
    resolution_started: Option<DateTime<Utc>>,
    last_self_write: Option<DateTime<Utc>>,
    /// Modification time the vault reported right after that write
    written_mtime: Option<DateTime<Utc>>,
}

impl Watermarks {
    fn covers(&self, modified: DateTime<Utc>) -> bool {
        if self.written_mtime == Some(modified) {
            return true;
        }
        match (self.resolution_started, self.last_self_write) {
            (Some(started), Some(written)) => started < modified && modified < written,
            _ => false,
        }
    }
}

/// Incrementally maintained index of every note's fields
pub struct FieldIndex {
    vault: Arc<dyn Vault>,
    sandbox: Arc<dyn ExpressionSandbox>,
    settings: RwLock<Arc<IndexSettings>>,
    state: RwLock<Arc<IndexState>>,
    /// Serializes state builders so incremental updates are never lost
    publish: tokio::sync::Mutex<()>,
    events: broadcast::Sender<IndexEvent>,
    watermarks: DashMap<NotePath, Watermarks>,
}

impl std::fmt::Debug for FieldIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldIndex")
            .field("notes", &self.snapshot().notes.len())
            .finish_non_exhaustive()
    }
}

impl FieldIndex {
    pub fn new(vault: Arc<dyn Vault>, sandbox: Arc<dyn ExpressionSandbox>, settings: IndexSettings) -> Self {
        Self {
            vault,
            sandbox,
            settings: RwLock::new(Arc::new(settings)),
            state: RwLock::new(Arc::new(IndexState::default())),
            publish: tokio::sync::Mutex::new(()),
            events: events::channel(),
            watermarks: DashMap::new(),
        }
    }

    pub fn settings(&self) -> Arc<IndexSettings> {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the settings and rebuild everything
    pub async fn apply_settings(&self, settings: IndexSettings) -> Result<()> {
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(settings);
        self.rebuild().await
    }

    /// The current state; stays valid and unchanged while held
    pub fn snapshot(&self) -> Arc<IndexState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IndexEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: IndexEvent) {
        trace!(?event, "emitting index event");
        // No subscribers is not an error
        let _ = self.events.send(event);
    }

    /// The indexed entry of a note, or `NoteNotFound`
    pub fn resolve_note(&self, path: &NotePath) -> Result<NoteEntry> {
        self.snapshot()
            .note(path)
            .cloned()
            .ok_or_else(|| IndexError::note_not_found(path.as_str()))
    }

    /// Record that the index's own writer is about to write `path`
    pub fn begin_self_write(&self, path: &NotePath) {
        self.watermarks.insert(
            path.clone(),
            Watermarks {
                resolution_started: Some(Utc::now()),
                ..Default::default()
            },
        );
    }

    /// Record that the index's own writer just wrote `path`, with the
    /// modification time the vault reports for it when known
    pub fn mark_self_write(&self, path: &NotePath, written_mtime: Option<DateTime<Utc>>) {
        let mut marks = self.watermarks.entry(path.clone()).or_default();
        marks.last_self_write = Some(Utc::now());
        marks.written_mtime = written_mtime;
    }

    /// True when `path`, modified at `modified`, was last written by the index
    /// itself: the time is the one recorded after that write, or lies strictly
    /// inside the write's window. Writes to other notes never count.
    pub fn is_accounted_for(&self, path: &NotePath, modified: DateTime<Utc>) -> bool {
        self.watermarks.get(path).is_some_and(|marks| marks.covers(modified))
    }

    fn publish_state(&self, state: IndexState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(state);
    }

    /// Reindex every class and every note
    pub async fn rebuild(&self) -> Result<()> {
        let _guard = self.publish.lock().await;
        let settings = self.settings();

        let (class_paths, note_paths): (Vec<NotePath>, Vec<NotePath>) = self
            .vault
            .list()
            .await?
            .into_iter()
            .filter(|p| !settings.is_ignored_path(p))
            .partition(|p| settings.class_file_name(p).is_some());

        let mut state = IndexState::default();
        for path in class_paths {
            let Some(name) = settings.class_file_name(&path).map(str::to_string) else {
                continue;
            };
            let class = match self.read_class(&name, &path).await {
                Ok(class) => class,
                Err(err) => {
                    warn!(class = %name, path = %path, error = %err, "invalid class file, indexing it as an empty class");
                    state.invalid_classes.insert(name.clone(), err.to_string());
                    ClassDef::new(name.as_str())
                }
            };
            state.registry.insert(class);
            state.class_files.insert(name, path);
        }

        state.schema = state.registry.resolve_all();
        for err in &state.schema.errors {
            warn!(class = err.class().unwrap_or_default(), error = %err, "class resolution failed");
        }
        debug!("resolved classes: {}", Pretty(&state.registry.names().collect::<Vec<_>>()));

        let contents = join_all(note_paths.iter().map(|p| self.vault.read(p))).await;
        for (path, content) in note_paths.into_iter().zip(contents) {
            let entry = match content {
                Ok(content) => self.build_entry(&settings, &state, path.clone(), &content).await,
                Err(err) => Err(err),
            };
            match entry {
                Ok(entry) => {
                    state.notes.insert(path, entry);
                }
                Err(err) => warn!(path = %path, error = %err, "note could not be indexed, skipping it"),
            }
        }
        state.index_class_notes();

        let notes = state.notes.len();
        let classes = state.registry.len();
        info!(notes, classes, "index rebuilt");
        self.publish_state(state);
        self.emit(IndexEvent::IndexRebuilt { notes, classes });
        Ok(())
    }

    /// Re-resolve one note after its content changed.
    ///
    /// A class definition file triggers a full rebuild. A vanished note is
    /// removed. Returns whether the note's field values changed;
    /// `FileFieldsChanged` is emitted only in that case.
    pub async fn update(&self, path: &NotePath) -> Result<bool> {
        let settings = self.settings();
        if let Some(class) = settings.class_file_name(path).map(str::to_string) {
            debug!(class = %class, "class definition changed");
            self.rebuild().await?;
            self.emit(IndexEvent::ClassReindexed { class });
            return Ok(true);
        }
        if settings.is_ignored_path(path) {
            return Ok(false);
        }

        let guard = self.publish.lock().await;
        let content = match self.vault.read(path).await {
            Ok(content) => content,
            Err(IndexError::NoteNotFound { .. }) => return Ok(self.remove_locked(path)),
            Err(err) => return Err(err),
        };

        let current = self.snapshot();
        let entry = self.build_entry(&settings, &current, path.clone(), &content).await?;
        let fields = entry.changed_fields();
        let changed = current
            .note(path)
            .is_none_or(|previous| previous.changed_fields() != fields);

        let mut next = (*current).clone();
        next.notes.insert(path.clone(), entry);
        next.index_class_notes();
        self.publish_state(next);
        drop(guard);

        if changed {
            debug!(path = %path, fields = fields.len(), "note fields changed");
            self.emit(IndexEvent::FileFieldsChanged {
                path: path.clone(),
                fields,
            });
        }
        Ok(changed)
    }

    /// Drop a deleted note. Returns whether it was indexed.
    pub async fn remove(&self, path: &NotePath) -> bool {
        let _guard = self.publish.lock().await;
        self.remove_locked(path)
    }

    fn remove_locked(&self, path: &NotePath) -> bool {
        let current = self.snapshot();
        if current.note(path).is_none() {
            return false;
        }
        let mut next = (*current).clone();
        next.notes.remove(path);
        next.index_class_notes();
        self.publish_state(next);
        debug!(path = %path, "note removed from index");
        true
    }

    async fn read_class(&self, name: &str, path: &NotePath) -> Result<ClassDef> {
        let content = self.vault.read(path).await?;
        let header = frontmatter::locate(&content).map_or(Value::Null, |h| h.value);
        Ok(ClassDef::from_header(name, &header)?)
    }

    async fn build_entry(
        &self,
        settings: &IndexSettings,
        state: &IndexState,
        path: NotePath,
        content: &str,
    ) -> Result<NoteEntry> {
        let snapshot = NoteSnapshot::parse(path, content);
        let bookmarks = self.vault.bookmark_groups(&snapshot.path).await?;
        let classes = bind_classes(settings, &state.registry, self.sandbox.as_ref(), &snapshot, &bookmarks);
        let fields = merge_schema(settings, &state.schema, &classes, &snapshot);
        let (existing, missing) = pair_fields(&fields, &snapshot);
        trace!(path = %snapshot.path, classes = ?classes, "note schema: {}", Pretty(&fields));
        Ok(NoteEntry {
            snapshot,
            classes,
            fields,
            existing,
            missing,
        })
    }
}

/// Classes bound to a note, in binding order
fn bind_classes(
    settings: &IndexSettings,
    registry: &ClassRegistry,
    sandbox: &dyn ExpressionSandbox,
    snapshot: &NoteSnapshot,
    bookmarks: &[String],
) -> Vec<String> {
    let mut classes = Vec::new();

    let declared: Vec<String> = match snapshot.values.get(&settings.class_alias) {
        Some(Value::String(s)) => s.split(',').map(|c| c.trim().to_string()).collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|c| c.trim().to_string())
            .collect(),
        _ => Vec::new(),
    };
    for name in declared.iter().filter(|n| !n.is_empty()) {
        if registry.contains(name) {
            push_unique(&mut classes, name);
        } else {
            debug!(path = %snapshot.path, class = %name, "note names an unknown class");
        }
    }

    for class in registry.iter() {
        let rules = &class.bindings;
        let tagged = rules.tags.iter().any(|t| has_tag(&snapshot.tags, t))
            || (rules.map_with_tag && has_tag(&snapshot.tags, &class.name));
        let in_folder = rules.files_paths.iter().any(|p| snapshot.path.is_under(p));
        let bookmarked = rules.bookmarks_groups.iter().any(|g| bookmarks.contains(g));
        if tagged || in_folder || bookmarked {
            push_unique(&mut classes, &class.name);
        }
    }

    if !settings.class_queries.is_empty() {
        let bindings = Bindings::new().with_current(snapshot.binding());
        for query in settings.class_queries.iter().filter(|q| registry.contains(&q.class)) {
            match sandbox.evaluate_bool(&query.expression, &bindings) {
                Ok(true) => push_unique(&mut classes, &query.class),
                Ok(false) => {}
                Err(err) => {
                    warn!(path = %snapshot.path, class = %query.class, error = %err, "class query failed")
                }
            }
        }
    }

    if classes.is_empty() {
        if let Some(global) = settings.global_class.as_deref().filter(|g| registry.contains(g)) {
            classes.push(global.to_string());
        }
    }
    classes
}

/// Preset fields, then class fields, then ad hoc fields found in the note.
///
/// A class field replaces a preset field of the same name; between classes,
/// the first bound class wins.
fn merge_schema(
    settings: &IndexSettings,
    schema: &SchemaResolution,
    classes: &[String],
    snapshot: &NoteSnapshot,
) -> Vec<FieldDef> {
    let mut fields: Vec<FieldDef> = settings
        .preset_fields
        .iter()
        .filter(|f| !settings.is_ignored_field(&f.name))
        .cloned()
        .collect();

    let mut from_classes: BTreeSet<(String, String)> = BTreeSet::new();
    for resolved in classes.iter().filter_map(|c| schema.get(c)) {
        for field in resolved.fields.iter().filter(|f| !settings.is_ignored_field(&f.name)) {
            if !from_classes.insert((field.path.clone(), field.name.clone())) {
                continue;
            }
            match fields
                .iter()
                .position(|f| f.path == field.path && f.name == field.name)
            {
                Some(i) => fields[i] = field.clone(),
                None => fields.push(field.clone()),
            }
        }
    }

    for name in snapshot.values.keys() {
        if name == &settings.class_alias || settings.is_ignored_field(name) {
            continue;
        }
        if !fields.iter().any(|f| f.is_top_level() && &f.name == name) {
            fields.push(FieldDef::ad_hoc(name));
        }
    }
    fields
}

/// Definition path of the children of `field`
fn children_path(field: &FieldDef) -> String {
    if field.path.is_empty() {
        field.id.as_str().to_string()
    } else {
        format!("{}{}{}", field.path, PATH_SEPARATOR, field.id)
    }
}

fn pair_fields(fields: &[FieldDef], snapshot: &NoteSnapshot) -> (Vec<ExistingField>, Vec<FieldDef>) {
    let mut existing = Vec::new();
    let mut missing = Vec::new();
    for field in fields.iter().filter(|f| f.is_top_level()) {
        match (snapshot.values.get(&field.name), snapshot.locations.get(&field.name)) {
            (Some(value), Some(location)) => {
                let path = field.root_path();
                existing.push(ExistingField {
                    indexed_path: path.clone(),
                    field: field.clone(),
                    value: value.clone(),
                    location: *location,
                    list_index: None,
                });
                if field.type_.is_container() {
                    pair_children(fields, field, &path, value, *location, &mut existing);
                }
            }
            _ => missing.push(field.clone()),
        }
    }
    (existing, missing)
}

/// Pair the children of an Object or ObjectList occurrence through its value
fn pair_children(
    fields: &[FieldDef],
    parent: &FieldDef,
    parent_path: &IndexedPath,
    value: &Value,
    location: FieldLocation,
    existing: &mut Vec<ExistingField>,
) {
    let definition_path = children_path(parent);
    let children: Vec<&FieldDef> = fields.iter().filter(|f| f.path == definition_path).collect();
    if children.is_empty() {
        return;
    }

    let structured = match value {
        Value::String(raw) => parent.type_.kind().deserialize(raw),
        other => other.clone(),
    };
    let items: Vec<(Option<usize>, &serde_json::Map<String, Value>)> = match &structured {
        Value::Object(map) => vec![(None, map)],
        Value::Array(items) => items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| item.as_object().map(|m| (Some(i), m)))
            .collect(),
        _ => Vec::new(),
    };

    for (index, map) in items {
        for child in &children {
            let Some(child_value) = map.get(&child.name) else {
                continue;
            };
            let path = parent_path.child(index, &child.id);
            existing.push(ExistingField {
                indexed_path: path.clone(),
                field: (*child).clone(),
                value: child_value.clone(),
                location,
                list_index: index,
            });
            if child.type_.is_container() {
                pair_children(fields, child, &path, child_value, location, existing);
            }
        }
    }
}
