//! Class inheritance resolution.
//!
//! A class's resolved field list is its parent's resolved list, minus the
//! class's `excludes`, minus any field it redeclares, followed by its own
//! fields. Broken classes (a missing parent or a cyclic chain) keep their own
//! fields and carry the error; resolution of every other class continues.

use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

use crate::error::FieldsError;
use crate::types::{ClassDef, FieldDef, FieldId};

/// A class after inheritance has been applied
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedClass {
    pub name: String,
    /// Ordered, merged field list. Each field's origin names its defining class.
    pub fields: Vec<FieldDef>,
    /// Parent chain, nearest first
    pub ancestors: Vec<String>,
    /// Set when resolution of this class was cut short
    pub error: Option<FieldsError>,
}

impl ResolvedClass {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields
            .iter()
            .find(|f| f.is_top_level() && f.name == name)
    }

    pub fn field_by_id(&self, id: &FieldId) -> Option<&FieldDef> {
        self.fields.iter().find(|f| &f.id == id)
    }

    pub fn top_level_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.is_top_level())
    }

    /// Direct children of a container field
    pub fn children_of<'a>(&'a self, parent: &'a FieldDef) -> impl Iterator<Item = &'a FieldDef> {
        let path = if parent.path.is_empty() {
            parent.id.as_str().to_string()
        } else {
            format!("{}{}{}", parent.path, crate::path::PATH_SEPARATOR, parent.id)
        };
        self.fields.iter().filter(move |f| f.path == path)
    }

    pub fn inherits_from(&self, class: &str) -> bool {
        self.ancestors.iter().any(|a| a == class)
    }
}

/// Outcome of resolving every registered class
#[derive(Debug, Clone, Default)]
pub struct SchemaResolution {
    pub classes: BTreeMap<String, ResolvedClass>,
    pub errors: Vec<FieldsError>,
}

impl SchemaResolution {
    pub fn get(&self, name: &str) -> Option<&ResolvedClass> {
        self.classes.get(name)
    }
}

/// All known class definitions, keyed by name
#[derive(Debug, Clone, Default)]
pub struct ClassRegistry {
    classes: BTreeMap<String, ClassDef>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a class definition. Returns the previous definition.
    pub fn insert(&mut self, class: ClassDef) -> Option<ClassDef> {
        self.classes.insert(class.name.clone(), class)
    }

    pub fn remove(&mut self, name: &str) -> Option<ClassDef> {
        self.classes.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&ClassDef> {
        self.classes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassDef> {
        self.classes.values()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Resolve a single class. Returns `None` if the class is not registered.
    pub fn resolve(&self, name: &str) -> Option<ResolvedClass> {
        let mut memo = BTreeMap::new();
        self.visit(name, &mut Vec::new(), &mut memo)
    }

    /// Resolve every class, in name order.
    pub fn resolve_all(&self) -> SchemaResolution {
        let mut memo = BTreeMap::new();
        for name in self.classes.keys() {
            self.visit(name, &mut Vec::new(), &mut memo);
        }
        let errors: Vec<FieldsError> = memo.values().filter_map(|c| c.error.clone()).collect();
        for error in &errors {
            warn!(class = error.class().unwrap_or_default(), %error, "class resolution degraded");
        }
        debug!(classes = memo.len(), errors = errors.len(), "resolved class schemas");
        SchemaResolution {
            classes: memo,
            errors,
        }
    }

    fn visit(
        &self,
        name: &str,
        resolving: &mut Vec<String>,
        memo: &mut BTreeMap<String, ResolvedClass>,
    ) -> Option<ResolvedClass> {
        if let Some(done) = memo.get(name) {
            return Some(done.clone());
        }
        let def = self.classes.get(name)?;

        resolving.push(name.to_string());
        let (inherited, ancestors, error) = match &def.extends {
            None => (Vec::new(), Vec::new(), None),
            Some(parent) if resolving.iter().any(|c| c == parent) => {
                let start = resolving.iter().position(|c| c == parent).unwrap_or(0);
                let mut chain = resolving[start..].to_vec();
                chain.push(parent.clone());
                let error = FieldsError::InheritanceCycle {
                    class: name.to_string(),
                    chain,
                };
                (Vec::new(), Vec::new(), Some(error))
            }
            Some(parent) => match self.visit(parent, resolving, memo) {
                Some(resolved) => {
                    let mut ancestors = vec![parent.clone()];
                    ancestors.extend(resolved.ancestors);
                    (resolved.fields, ancestors, None)
                }
                None => {
                    let error = FieldsError::ClassNotFound {
                        name: parent.clone(),
                        referenced_by: name.to_string(),
                    };
                    (Vec::new(), Vec::new(), Some(error))
                }
            },
        };
        resolving.pop();

        let mut fields = merge(inherited, def);
        apply_order(&mut fields, &def.fields_order);

        let resolved = ResolvedClass {
            name: name.to_string(),
            fields,
            ancestors,
            error,
        };
        memo.insert(name.to_string(), resolved.clone());
        Some(resolved)
    }

    /// Classes whose parent chain runs through `class` (not including itself)
    pub fn descendants(&self, class: &str) -> Vec<String> {
        let resolution = self.resolve_all();
        resolution
            .classes
            .values()
            .filter(|c| c.inherits_from(class))
            .map(|c| c.name.clone())
            .collect()
    }
}

fn merge(inherited: Vec<FieldDef>, def: &ClassDef) -> Vec<FieldDef> {
    let own_keys: HashSet<(&str, &str)> = def
        .fields
        .iter()
        .map(|f| (f.path.as_str(), f.name.as_str()))
        .collect();

    let mut dropped: HashSet<FieldId> = HashSet::new();
    for field in &inherited {
        if def.excludes.iter().any(|x| x == &field.name)
            || own_keys.contains(&(field.path.as_str(), field.name.as_str()))
        {
            dropped.insert(field.id.clone());
        }
    }

    let mut merged: Vec<FieldDef> = inherited
        .into_iter()
        .filter(|f| !dropped.contains(&f.id) && !dropped.iter().any(|id| f.is_nested_under(id)))
        .collect();
    merged.extend(def.fields.iter().cloned());
    merged
}

fn apply_order(fields: &mut [FieldDef], order: &[FieldId]) {
    if order.is_empty() {
        return;
    }
    fields.sort_by_key(|f| order.iter().position(|id| id == &f.id).unwrap_or(order.len()));
}
