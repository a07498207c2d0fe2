use cel_interpreter::{Context, Program};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::trace;

use crate::convert::{cel_value_to_json, json_to_cel_value};
use crate::error::{EvaluationError, Result};

/// Variables visible to an expression.
///
/// The engines bind `current` (the note being computed), `pages` (related
/// notes for a lookup, every note for a formula) and `page` (one related
/// note, for per-item renderers). Formulas also get `linked`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    vars: BTreeMap<String, Value>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_current(self, current: Value) -> Self {
        self.with_var("current", current)
    }

    pub fn with_pages(self, pages: Vec<Value>) -> Self {
        self.with_var("pages", Value::Array(pages))
    }

    pub fn with_page(self, page: Value) -> Self {
        self.with_var("page", page)
    }

    pub fn with_var(mut self, name: impl Into<String>, value: Value) -> Self {
        self.vars.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.vars.iter()
    }
}

/// The single boundary through which user expressions are evaluated
pub trait ExpressionSandbox: Send + Sync {
    fn evaluate(&self, expression: &str, bindings: &Bindings) -> Result<Value>;

    /// Evaluate an expression that must produce a boolean
    fn evaluate_bool(&self, expression: &str, bindings: &Bindings) -> Result<bool> {
        match self.evaluate(expression, bindings)? {
            Value::Bool(b) => Ok(b),
            other => Err(EvaluationError::TypeMismatch {
                expression: expression.to_string(),
                expected: "bool",
                found: other.to_string(),
            }),
        }
    }
}

/// Sandbox backed by the Common Expression Language.
///
/// Each evaluation builds a fresh context, so expressions cannot leak state
/// into one another.
#[derive(Debug, Clone, Default)]
pub struct CelSandbox;

impl CelSandbox {
    pub fn new() -> Self {
        Self
    }
}

impl ExpressionSandbox for CelSandbox {
    fn evaluate(&self, expression: &str, bindings: &Bindings) -> Result<Value> {
        let program =
            Program::compile(expression).map_err(|e| EvaluationError::compile(expression, e))?;

        let mut context = Context::default();
        for (name, value) in bindings.iter() {
            context
                .add_variable(name.as_str(), json_to_cel_value(value))
                .map_err(|e| EvaluationError::Binding {
                    name: name.clone(),
                    message: e.to_string(),
                })?;
        }

        let value = program
            .execute(&context)
            .map_err(|e| EvaluationError::execution(expression, e))?;
        let value = cel_value_to_json(&value);
        trace!(expression, %value, "evaluated expression");
        Ok(value)
    }
}

/// Sandbox that refuses every expression
#[derive(Debug, Clone, Default)]
pub struct DisabledSandbox;

impl ExpressionSandbox for DisabledSandbox {
    fn evaluate(&self, _expression: &str, _bindings: &Bindings) -> Result<Value> {
        Err(EvaluationError::Disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_formula_over_current() {
        let sandbox = CelSandbox::new();
        let bindings = Bindings::new().with_current(json!({"hours": 3, "rate": 40}));
        let value = sandbox
            .evaluate("current.hours * current.rate", &bindings)
            .unwrap();
        assert_eq!(value, json!(120));
    }

    #[test]
    fn test_aggregate_over_pages() {
        let sandbox = CelSandbox::new();
        let bindings = Bindings::new().with_pages(vec![
            json!({"name": "A", "done": true}),
            json!({"name": "B", "done": false}),
            json!({"name": "C", "done": true}),
        ]);
        let value = sandbox
            .evaluate("size(pages.filter(p, p.done))", &bindings)
            .unwrap();
        assert_eq!(value, json!(2));
    }

    #[test]
    fn test_per_item_string() {
        let sandbox = CelSandbox::new();
        let bindings = Bindings::new().with_page(json!({"name": "Bob"}));
        let value = sandbox.evaluate("'@' + page.name", &bindings).unwrap();
        assert_eq!(value, json!("@Bob"));
    }

    #[test]
    fn test_predicate() {
        let sandbox = CelSandbox::new();
        let bindings = Bindings::new().with_current(json!({"status": "done"}));
        assert!(sandbox
            .evaluate_bool("current.status == 'done'", &bindings)
            .unwrap());
        let err = sandbox.evaluate_bool("1 + 1", &bindings).unwrap_err();
        assert!(matches!(err, EvaluationError::TypeMismatch { .. }));
    }

    #[test]
    fn test_compile_error() {
        let sandbox = CelSandbox::new();
        let err = sandbox.evaluate("2 +", &Bindings::new()).unwrap_err();
        assert!(matches!(err, EvaluationError::Compile { .. }));
    }

    #[test]
    fn test_unbound_variable_is_execution_error() {
        let sandbox = CelSandbox::new();
        let err = sandbox.evaluate("missing + 1", &Bindings::new()).unwrap_err();
        assert!(matches!(err, EvaluationError::Execution { .. }));
    }

    #[test]
    fn test_disabled_sandbox() {
        let err = DisabledSandbox
            .evaluate("1", &Bindings::new())
            .unwrap_err();
        assert_eq!(err, EvaluationError::Disabled);
    }
}
