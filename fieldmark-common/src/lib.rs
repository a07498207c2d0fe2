//! # Fieldmark Common
//!
//! Small utilities shared by every fieldmark crate. Kept deliberately thin:
//! the schema, sandbox and index crates own their own error types.
//!
//! - [`logging`] - `Pretty` wrapper and tracing subscriber setup

pub mod logging;

pub use logging::{init_tracing, Pretty};
