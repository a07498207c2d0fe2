use thiserror::Error;

pub type Result<T> = std::result::Result<T, EvaluationError>;

/// Failure to evaluate an expression
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvaluationError {
    #[error("failed to compile '{expression}': {message}")]
    Compile { expression: String, message: String },

    #[error("failed to execute '{expression}': {message}")]
    Execution { expression: String, message: String },

    #[error("failed to bind variable '{name}': {message}")]
    Binding { name: String, message: String },

    #[error("'{expression}' evaluated to {found}, expected {expected}")]
    TypeMismatch {
        expression: String,
        expected: &'static str,
        found: String,
    },

    #[error("expression evaluation is disabled")]
    Disabled,
}

impl EvaluationError {
    pub fn compile(expression: &str, message: impl ToString) -> Self {
        Self::Compile {
            expression: expression.to_string(),
            message: message.to_string(),
        }
    }

    pub fn execution(expression: &str, message: impl ToString) -> Self {
        Self::Execution {
            expression: expression.to_string(),
            message: message.to_string(),
        }
    }
}
