//! Error types for field schemas and class resolution

use thiserror::Error;

/// Result type for schema operations
pub type Result<T> = std::result::Result<T, FieldsError>;

/// Errors that can occur while loading or resolving schemas
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FieldsError {
    /// Field not found by name
    #[error("field not found: {name}")]
    FieldNotFound { name: String },

    /// A class (or a parent it extends) does not exist
    #[error("class not found: {name} (referenced by {referenced_by})")]
    ClassNotFound { name: String, referenced_by: String },

    /// The parent chain of a class loops back on itself
    #[error("inheritance cycle in class '{class}': {}", chain.join(" -> "))]
    InheritanceCycle { class: String, chain: Vec<String> },

    /// A class definition file could not be understood
    #[error("invalid class definition '{class}': {message}")]
    InvalidClassDefinition { class: String, message: String },

    /// Duplicate field name within one class
    #[error("duplicate field name '{name}' in class '{class}'")]
    DuplicateFieldName { class: String, name: String },

    /// A value does not satisfy its field type
    #[error("validation error on field '{field}': {message}")]
    ValidationFailed { field: String, message: String },
}

impl FieldsError {
    /// The class this error is attributed to, if any
    pub fn class(&self) -> Option<&str> {
        match self {
            Self::ClassNotFound { referenced_by, .. } => Some(referenced_by),
            Self::InheritanceCycle { class, .. }
            | Self::InvalidClassDefinition { class, .. }
            | Self::DuplicateFieldName { class, .. } => Some(class),
            Self::FieldNotFound { .. } | Self::ValidationFailed { .. } => None,
        }
    }

    /// Schema errors degrade a class instead of failing the index
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            Self::ClassNotFound { .. }
                | Self::InheritanceCycle { .. }
                | Self::InvalidClassDefinition { .. }
                | Self::DuplicateFieldName { .. }
        )
    }
}
