//! Expression sandbox for fieldmark
//!
//! Every user-authored expression (formula fields, custom lookup renderers,
//! predicate relations and class queries) is evaluated through the
//! [`ExpressionSandbox`] trait and nothing else.
//!
//! # Example
//!
//! ```rust
//! use fieldmark_cel::{Bindings, CelSandbox, ExpressionSandbox};
//! use serde_json::json;
//!
//! let sandbox = CelSandbox::new();
//! let bindings = Bindings::new().with_current(json!({"hours": 3, "rate": 40}));
//! let value = sandbox.evaluate("current.hours * current.rate", &bindings).unwrap();
//! assert_eq!(value, json!(120));
//! ```

mod convert;
mod error;
mod sandbox;

pub use convert::{cel_value_to_json, json_to_cel_value};
pub use error::{EvaluationError, Result};
pub use sandbox::{Bindings, CelSandbox, DisabledSandbox, ExpressionSandbox};
