//! Field definitions and class schemas
//!
//! `fieldmark-fields` is a schema-only crate. It knows how fields are typed and
//! how classes inherit from one another, but nothing about where notes live or
//! how values are written back into them.
//!
//! # Architecture
//!
//! - **Closed field types**: `FieldType` is a tagged enum; every variant wraps an
//!   options struct implementing the `FieldKind` capability trait
//! - **Stable ids**: `FieldId` survives renames, so anything keyed by an
//!   `IndexedPath` keeps working when a field is renamed
//! - **Classes**: `ClassDef` declares fields, a parent, exclusions and binding
//!   rules; `ClassRegistry` resolves inheritance and reports cycles as errors

pub mod error;
pub mod kinds;
pub mod path;
pub mod schema;
pub mod types;

pub use error::{FieldsError, Result};
pub use kinds::{
    BooleanOptions, CanvasOptions, CycleOptions, DateOptions, DateTimeOptions, FieldKind,
    FieldType, FileOptions, FormulaOptions, InputOptions, LookupOptions, LookupOutput,
    MultiFileOptions, MultiOptions, NumberOptions, ObjectListOptions, ObjectOptions,
    RawOptions, RelationMatch, SelectOption, SelectOptions, SummarizingFunction, TimeOptions,
};
pub use path::{IndexedPath, PathSegment};
pub use schema::{ClassRegistry, ResolvedClass, SchemaResolution};
pub use types::{ClassBindings, ClassDef, FieldCommand, FieldDef, FieldId, FieldOrigin, FieldStyle};
