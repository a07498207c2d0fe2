//! Core field and class types.
//!
//! All types serialize to/from YAML via serde. Field definitions describe
//! named, typed attributes. Class definitions group field definitions, may
//! extend a parent class and carry the rules that bind them to notes.

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

use crate::error::{FieldsError, Result};
use crate::kinds::FieldType;
use crate::path::{IndexedPath, PATH_SEPARATOR};

/// Stable identifier of a field definition.
///
/// Ids are written into class files and survive renames. Fields declared
/// without an id get a deterministic one derived from their class and name so
/// that repeated reindexes produce the same value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldId(String);

impl FieldId {
    /// A fresh random id
    pub fn new() -> Self {
        Self(Ulid::new().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Deterministic id for a field declared without one
    pub fn derived(owner: &str, name: &str) -> Self {
        Self(format!("{owner}.{name}"))
    }

    /// Deterministic id for a field found in a note but declared nowhere
    pub fn ad_hoc(name: &str) -> Self {
        Self(format!("adhoc.{name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for FieldId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Where a field definition came from
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldOrigin {
    /// Global preset from settings
    #[default]
    Preset,
    /// Declared by (or inherited from) the named class
    Class(String),
    /// Found in a note's text without any declaration
    AdHoc,
}

impl FieldOrigin {
    pub fn class_name(&self) -> Option<&str> {
        match self {
            Self::Class(name) => Some(name),
            _ => None,
        }
    }
}

/// Inline style wrapped around a field name (`**name**:: value`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldStyle {
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub strikethrough: bool,
    #[serde(default)]
    pub code: bool,
}

impl FieldStyle {
    /// Opening and closing wrappers, closing mirrored from opening
    pub fn wrappers(&self) -> (String, String) {
        let mut open = String::new();
        if self.bold {
            open.push_str("**");
        }
        if self.italic {
            open.push('_');
        }
        if self.strikethrough {
            open.push_str("~~");
        }
        if self.code {
            open.push('`');
        }
        let close: String = open.chars().rev().collect();
        (open, close)
    }
}

/// Optional command-palette binding for a field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCommand {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hotkey: Option<String>,
}

/// A field definition: the complete schema for a single named attribute.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldDef {
    #[serde(default, skip_serializing_if = "FieldId::is_empty")]
    pub id: FieldId,
    pub name: String,
    #[serde(rename = "type")]
    pub type_: FieldType,
    /// Ids of the enclosing Object/ObjectList fields, `____`-separated
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<FieldStyle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<FieldCommand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip)]
    pub origin: FieldOrigin,
}

impl FieldDef {
    pub fn new(id: impl Into<FieldId>, name: impl Into<String>, type_: FieldType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            type_,
            path: String::new(),
            style: None,
            command: None,
            description: None,
            origin: FieldOrigin::Preset,
        }
    }

    /// An ad hoc Input field discovered in a note
    pub fn ad_hoc(name: &str) -> Self {
        Self {
            origin: FieldOrigin::AdHoc,
            ..Self::new(FieldId::ad_hoc(name), name, FieldType::input())
        }
    }

    /// Nest this field under the given parent definition path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_origin(mut self, origin: FieldOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_style(mut self, style: FieldStyle) -> Self {
        self.style = Some(style);
        self
    }

    pub fn is_top_level(&self) -> bool {
        self.path.is_empty()
    }

    /// True when this field sits (directly or transitively) under `ancestor`
    pub fn is_nested_under(&self, ancestor: &FieldId) -> bool {
        !self.path.is_empty()
            && self
                .path
                .split(PATH_SEPARATOR)
                .any(|segment| segment == ancestor.as_str())
    }

    /// Id of the direct parent field, if nested
    pub fn parent_id(&self) -> Option<FieldId> {
        if self.path.is_empty() {
            return None;
        }
        self.path.rsplit(PATH_SEPARATOR).next().map(FieldId::from)
    }

    /// Indexed path of a top-level occurrence
    pub fn root_path(&self) -> IndexedPath {
        IndexedPath::root(&self.id)
    }

    /// Stable description of the type, used to invalidate computed-value caches
    pub fn type_signature(&self) -> String {
        serde_json::to_string(&self.type_).unwrap_or_else(|_| self.type_.name().to_string())
    }
}

/// Rules binding a class to notes, in addition to the identity key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassBindings {
    /// Tag names (without `#`) that bind a note to the class
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Bind notes tagged with the class name itself
    #[serde(default)]
    pub map_with_tag: bool,
    /// Path prefixes (folders) whose notes are bound to the class
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_paths: Vec<String>,
    /// Bookmark groups whose members are bound to the class
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bookmarks_groups: Vec<String>,
}

impl ClassBindings {
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
            && !self.map_with_tag
            && self.files_paths.is_empty()
            && self.bookmarks_groups.is_empty()
    }
}

/// A class definition: a named, possibly inherited set of fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassDef {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excludes: Vec<String>,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields_order: Vec<FieldId>,
    #[serde(flatten)]
    pub bindings: ClassBindings,
}

impl ClassDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extends: None,
            excludes: Vec::new(),
            fields: Vec::new(),
            fields_order: Vec::new(),
            bindings: ClassBindings::default(),
        }
    }

    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.extends = Some(parent.into());
        self
    }

    pub fn excluding(mut self, names: &[&str]) -> Self {
        self.excludes = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_bindings(mut self, bindings: ClassBindings) -> Self {
        self.bindings = bindings;
        self
    }

    /// Build a class from the parsed header block of its definition file.
    ///
    /// Fields get their origin set to this class; fields declared without an id
    /// get a deterministic one. Duplicate names within one class are rejected.
    pub fn from_header(name: &str, header: &serde_json::Value) -> Result<Self> {
        let mut def: ClassDef = if header.is_null() {
            ClassDef::new(name)
        } else {
            serde_json::from_value(header.clone()).map_err(|e| {
                FieldsError::InvalidClassDefinition {
                    class: name.to_string(),
                    message: e.to_string(),
                }
            })?
        };
        def.name = name.to_string();

        let mut seen = std::collections::HashSet::new();
        for field in &mut def.fields {
            if !seen.insert((field.path.clone(), field.name.clone())) {
                return Err(FieldsError::DuplicateFieldName {
                    class: name.to_string(),
                    name: field.name.clone(),
                });
            }
            if field.id.is_empty() {
                field.id = FieldId::derived(name, &field.name);
            }
            field.origin = FieldOrigin::Class(name.to_string());
        }
        Ok(def)
    }

    /// Names of the fields declared directly by this class
    pub fn own_field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}
