//! Typed fields over plain-text notes
//!
//! `fieldmark-index` keeps an index of every note's fields, recomputes lookup
//! and formula fields, and writes values back into notes without disturbing
//! the text around them.
//!
//! ## Overview
//!
//! - **Notes stay plain text** - values live in the `---` header block or
//!   inline as `name:: value`, on their own line or inside `[...]` / `(...)`
//! - **Classes** - `classes/<Name>.md` files declare fields; notes bind to them
//!   by header key, tag, folder, bookmark group or query
//! - **Snapshots** - the index publishes immutable [`IndexState`] snapshots, so a
//!   reader never sees a note half indexed
//! - **One writer per note** - every write goes through the [`WriteScheduler`]
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use fieldmark_index::{Execute, FieldmarkContext, InsertValues, UpdateLookups};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let ctx = FieldmarkContext::open("/path/to/vault").build().await?;
//!
//! InsertValues::new("Projects/Alpha.md", "status", json!("done"))
//!     .execute(&ctx)
//!     .await
//!     .into_result()?;
//!
//! let report = UpdateLookups::new("Projects/Alpha.md")
//!     .execute(&ctx)
//!     .await
//!     .into_result()?;
//! println!("written: {}", report["written"]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Vault layout
//!
//! ```text
//! vault/
//! ├── fieldmark.yaml        # Optional settings
//! ├── classes/
//! │   └── Project.md        # Class definition (header block only)
//! └── Projects/
//!     └── Alpha.md          # fileClass: Project
//! ```

pub mod commands;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod events;
pub mod frontmatter;
pub mod grammar;
pub mod index;
pub mod note;
pub mod patcher;
pub mod scheduler;
pub mod selector;
pub mod tag_parser;
pub mod vault;

pub use commands::{
    Execute, ExecutionResult, FileChanged, ForceFullIndex, InsertPlacement, InsertValues, LogEntry, Operation,
    PostValues, PostedValue, UpdateFormulas, UpdateLookups,
};
pub use config::{ClassQuery, IndexSettings};
pub use context::{ContextBuilder, FieldmarkContext};
pub use engine::{
    ComputeStatus, FieldFailure, FieldRef, FormulaEngine, LookupEngine, RecomputeReport, RecomputeScope,
};
pub use error::{IndexError, Result};
pub use events::{ChangedField, IndexEvent};
pub use index::{ExistingField, FieldIndex, IndexState, NoteEntry, NoteSnapshot};
pub use note::NotePath;
pub use patcher::{FieldLocation, FieldWrite, InsertOptions, PatchOutcome, PathStep};
pub use scheduler::{PendingPatch, WriteScheduler};
pub use selector::{IndexSelector, RelatedNote, Selector, SelectorRequest};
pub use vault::{FsVault, Vault};
