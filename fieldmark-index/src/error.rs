//! Error types for the field index

use fieldmark_cel::EvaluationError;
use fieldmark_fields::FieldsError;
use thiserror::Error;

/// Result type for index operations
pub type Result<T> = std::result::Result<T, IndexError>;

/// Errors that can occur while indexing, computing or patching fields
#[derive(Debug, Error)]
pub enum IndexError {
    /// A supplied path does not resolve to a note
    #[error("note not found: {path}")]
    NoteNotFound { path: String },

    /// A field name does not exist on the note's schema
    #[error("field '{field}' not found on {path}")]
    FieldNotFound { path: String, field: String },

    /// An update had no occurrence to rewrite
    #[error("no occurrence of {} in {path}", fields.join(", "))]
    PatchMissed { path: String, fields: Vec<String> },

    /// Invalid field value
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    /// The related-note selector failed
    #[error("selector error: {message}")]
    Selector { message: String },

    /// Expression evaluation failed
    #[error(transparent)]
    Expression(#[from] EvaluationError),

    /// Class schema error
    #[error(transparent)]
    Schema(#[from] FieldsError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Settings could not be loaded
    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),
}

impl IndexError {
    pub fn note_not_found(path: impl Into<String>) -> Self {
        Self::NoteNotFound { path: path.into() }
    }

    pub fn field_not_found(path: impl Into<String>, field: impl Into<String>) -> Self {
        Self::FieldNotFound {
            path: path.into(),
            field: field.into(),
        }
    }

    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn selector(message: impl Into<String>) -> Self {
        Self::Selector {
            message: message.into(),
        }
    }

    /// Errors scoped to a single field never abort sibling work
    pub fn is_field_scoped(&self) -> bool {
        matches!(
            self,
            Self::Expression(_) | Self::Selector { .. } | Self::InvalidValue { .. }
        )
    }
}

impl From<figment::Error> for IndexError {
    fn from(e: figment::Error) -> Self {
        Self::Config(Box::new(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IndexError::note_not_found("Projects/Alpha.md");
        assert_eq!(err.to_string(), "note not found: Projects/Alpha.md");
    }

    #[test]
    fn test_patch_missed_lists_fields() {
        let err = IndexError::PatchMissed {
            path: "a.md".into(),
            fields: vec!["status".into(), "owner".into()],
        };
        assert_eq!(err.to_string(), "no occurrence of status, owner in a.md");
    }

    #[test]
    fn test_field_scoped() {
        assert!(IndexError::from(EvaluationError::Disabled).is_field_scoped());
        assert!(!IndexError::note_not_found("x").is_field_scoped());
    }
}
