//! Indexed paths: structural addresses of field occurrences.
//!
//! A top-level field is addressed by its id alone. Children of an Object field
//! append `____<childId>`; children of an ObjectList item carry the item index
//! on the parent segment: `<listId>[2]____<childId>`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::FieldId;

/// Separator between segments of an indexed path
pub const PATH_SEPARATOR: &str = "____";

/// One segment of an indexed path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    pub id: FieldId,
    pub index: Option<usize>,
}

/// Structural address of a field occurrence, stable across field renames
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexedPath(String);

impl IndexedPath {
    /// Path of a top-level field
    pub fn root(id: &FieldId) -> Self {
        Self(id.as_str().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Address a child field. `index` selects an item when `self` is an ObjectList.
    pub fn child(&self, index: Option<usize>, child: &FieldId) -> Self {
        match index {
            Some(i) => Self(format!("{}[{}]{}{}", self.0, i, PATH_SEPARATOR, child)),
            None => Self(format!("{}{}{}", self.0, PATH_SEPARATOR, child)),
        }
    }

    /// Address one item of an ObjectList
    pub fn item(&self, index: usize) -> Self {
        Self(format!("{}[{}]", self.0, index))
    }

    pub fn segments(&self) -> Vec<PathSegment> {
        self.0
            .split(PATH_SEPARATOR)
            .map(|raw| match raw.strip_suffix(']').and_then(|s| s.rsplit_once('[')) {
                Some((id, idx)) => match idx.parse::<usize>() {
                    Ok(i) => PathSegment {
                        id: FieldId::from_string(id),
                        index: Some(i),
                    },
                    Err(_) => PathSegment {
                        id: FieldId::from_string(raw),
                        index: None,
                    },
                },
                None => PathSegment {
                    id: FieldId::from_string(raw),
                    index: None,
                },
            })
            .collect()
    }

    /// Id of the field this path ends on
    pub fn leaf_id(&self) -> FieldId {
        self.segments()
            .pop()
            .map(|s| s.id)
            .unwrap_or_else(|| FieldId::from_string(self.0.clone()))
    }

    pub fn is_top_level(&self) -> bool {
        !self.0.contains(PATH_SEPARATOR)
    }

    /// The enclosing occurrence, or `None` for a top-level path
    pub fn parent(&self) -> Option<IndexedPath> {
        self.0
            .rsplit_once(PATH_SEPARATOR)
            .map(|(parent, _)| Self(parent.to_string()))
    }

    /// Field-definition path of the parents (ids only, no item indices).
    ///
    /// This is what `FieldDef::path` holds for a field living at this address.
    pub fn definition_path(&self) -> String {
        let mut segments = self.segments();
        segments.pop();
        segments
            .iter()
            .map(|s| s.id.as_str())
            .collect::<Vec<_>>()
            .join(PATH_SEPARATOR)
    }
}

impl fmt::Display for IndexedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for IndexedPath {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_path_is_the_id() {
        let id = FieldId::from_string("abc");
        let path = IndexedPath::root(&id);
        assert_eq!(path.as_str(), "abc");
        assert!(path.is_top_level());
        assert_eq!(path.parent(), None);
        assert_eq!(path.definition_path(), "");
    }

    #[test]
    fn test_object_list_child_carries_item_index() {
        let list = IndexedPath::root(&FieldId::from_string("tasks"));
        let child = list.child(Some(2), &FieldId::from_string("due"));
        assert_eq!(child.as_str(), "tasks[2]____due");
        assert_eq!(child.leaf_id().as_str(), "due");
        assert_eq!(child.parent().unwrap().as_str(), "tasks[2]");
        assert_eq!(child.definition_path(), "tasks");

        let segments = child.segments();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].index, Some(2));
        assert_eq!(segments[1].index, None);
    }

    #[test]
    fn test_nested_object_path() {
        let addr = IndexedPath::root(&FieldId::from_string("addr"));
        let geo = addr.child(None, &FieldId::from_string("geo"));
        let lat = geo.child(None, &FieldId::from_string("lat"));
        assert_eq!(lat.as_str(), "addr____geo____lat");
        assert_eq!(lat.definition_path(), "addr____geo");
    }
}
