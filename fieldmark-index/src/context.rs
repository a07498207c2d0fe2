//! FieldmarkContext - the wiring every command runs against
//!
//! The context owns one vault, one index, one write scheduler and the two
//! computed-field engines. It is built once at startup and dropped at
//! shutdown; nothing in the crate keeps process-wide state.

use fieldmark_cel::{CelSandbox, ExpressionSandbox};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::IndexSettings;
use crate::engine::{FormulaEngine, LookupEngine, RecomputeReport, RecomputeScope};
use crate::error::Result;
use crate::events::IndexEvent;
use crate::index::{FieldIndex, IndexState};
use crate::note::NotePath;
use crate::scheduler::WriteScheduler;
use crate::selector::{IndexSelector, Selector};
use crate::vault::{FsVault, Vault};

/// Context passed to every command
pub struct FieldmarkContext {
    root: PathBuf,
    vault: Arc<dyn Vault>,
    index: Arc<FieldIndex>,
    scheduler: Arc<WriteScheduler>,
    lookups: LookupEngine,
    formulas: FormulaEngine,
}

impl std::fmt::Debug for FieldmarkContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldmarkContext")
            .field("root", &self.root)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

/// Builder for [`FieldmarkContext`]. Anything not supplied gets the default:
/// an `FsVault` over the root, settings loaded from the root, the CEL sandbox
/// and a selector over the index.
pub struct ContextBuilder {
    root: PathBuf,
    vault: Option<Arc<dyn Vault>>,
    settings: Option<IndexSettings>,
    sandbox: Option<Arc<dyn ExpressionSandbox>>,
    selector: Option<Arc<dyn Selector>>,
}

impl ContextBuilder {
    pub fn with_vault(mut self, vault: Arc<dyn Vault>) -> Self {
        self.vault = Some(vault);
        self
    }

    pub fn with_settings(mut self, settings: IndexSettings) -> Self {
        self.settings = Some(settings.normalized());
        self
    }

    pub fn with_sandbox(mut self, sandbox: Arc<dyn ExpressionSandbox>) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    pub fn with_selector(mut self, selector: Arc<dyn Selector>) -> Self {
        self.selector = Some(selector);
        self
    }

    /// Wire everything together and build the index
    pub async fn build(self) -> Result<FieldmarkContext> {
        let settings = match self.settings {
            Some(settings) => settings,
            None => IndexSettings::load(&self.root)?,
        };
        let vault = self
            .vault
            .unwrap_or_else(|| Arc::new(FsVault::new(self.root.clone())) as Arc<dyn Vault>);
        let sandbox = self
            .sandbox
            .unwrap_or_else(|| Arc::new(CelSandbox::new()) as Arc<dyn ExpressionSandbox>);

        let index = Arc::new(FieldIndex::new(vault.clone(), sandbox.clone(), settings));
        let scheduler = Arc::new(WriteScheduler::new(vault.clone(), index.clone()));
        let selector = self
            .selector
            .unwrap_or_else(|| Arc::new(IndexSelector::new(index.clone(), sandbox.clone())) as Arc<dyn Selector>);

        let context = FieldmarkContext {
            lookups: LookupEngine::new(index.clone(), scheduler.clone(), selector, sandbox.clone()),
            formulas: FormulaEngine::new(index.clone(), scheduler.clone(), sandbox),
            root: self.root,
            vault,
            index,
            scheduler,
        };
        context.index.rebuild().await?;
        info!(root = %context.root.display(), "fieldmark context ready");
        Ok(context)
    }
}

impl FieldmarkContext {
    /// Start building a context for the vault at `root`
    pub fn open(root: impl Into<PathBuf>) -> ContextBuilder {
        ContextBuilder {
            root: root.into(),
            vault: None,
            settings: None,
            sandbox: None,
            selector: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn vault(&self) -> &Arc<dyn Vault> {
        &self.vault
    }

    pub fn index(&self) -> &Arc<FieldIndex> {
        &self.index
    }

    pub fn scheduler(&self) -> &Arc<WriteScheduler> {
        &self.scheduler
    }

    pub fn lookups(&self) -> &LookupEngine {
        &self.lookups
    }

    pub fn formulas(&self) -> &FormulaEngine {
        &self.formulas
    }

    pub fn snapshot(&self) -> Arc<IndexState> {
        self.index.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IndexEvent> {
        self.index.subscribe()
    }

    /// Rebuild the index and drop cache entries the rebuild made stale.
    /// Returns how many cache entries were dropped.
    pub async fn rebuild(&self) -> Result<usize> {
        self.index.rebuild().await?;
        Ok(self.invalidate_caches())
    }

    pub fn invalidate_caches(&self) -> usize {
        self.lookups.invalidate() + self.formulas.invalidate()
    }

    /// Recompute every computed field of every note
    pub async fn recompute_all(&self) -> Result<RecomputeReport> {
        let mut report = self.formulas.recompute(&RecomputeScope::All).await?;
        report.merge(self.lookups.recompute(&RecomputeScope::All).await?);
        Ok(report)
    }

    /// Bring the index and computed fields up to date after `path` changed.
    ///
    /// The note's own formulas are recomputed; lookups are recomputed
    /// everywhere since any note may be related to the changed one.
    pub async fn refresh(&self, path: &NotePath) -> Result<RecomputeReport> {
        if self.index.settings().class_file_name(path).is_some() {
            self.index.update(path).await?;
            let dropped = self.invalidate_caches();
            debug!(path = %path, dropped, "class file changed");
            return self.recompute_all().await;
        }

        self.index.update(path).await?;
        let mut report = if self.index.snapshot().note(path).is_some() {
            self.formulas.recompute(&RecomputeScope::Note(path.clone())).await?
        } else {
            RecomputeReport::default()
        };
        report.merge(self.lookups.recompute(&RecomputeScope::All).await?);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    #[serial]
    async fn test_open_loads_settings_from_root() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("fieldmark.yaml"), "class_files_path: types\n").unwrap();
        fs::create_dir_all(temp.path().join("types")).unwrap();
        fs::write(temp.path().join("types/Book.md"), "---\nfields:\n  - name: pages\n    type: { kind: number }\n---\n").unwrap();
        fs::write(temp.path().join("a.md"), "---\nfileClass: Book\n---\n").unwrap();

        let ctx = FieldmarkContext::open(temp.path()).build().await.unwrap();
        assert_eq!(ctx.index().settings().class_files_path, "types");
        let state = ctx.snapshot();
        assert_eq!(state.classes_of(&NotePath::new("a.md")).unwrap(), ["Book".to_string()]);
        assert!(state.note(&NotePath::new("types/Book.md")).is_none());
    }

    #[tokio::test]
    async fn test_rebuild_with_empty_caches() {
        let temp = TempDir::new().unwrap();
        let ctx = FieldmarkContext::open(temp.path())
            .with_settings(IndexSettings::default())
            .build()
            .await
            .unwrap();
        assert_eq!(ctx.rebuild().await.unwrap(), 0);
        assert!(ctx.recompute_all().await.unwrap().written.is_empty());
    }
}
