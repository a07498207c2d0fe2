//! Per-note write serialization
//!
//! Every mutation of a note goes through [`WriteScheduler::modify`], which
//! holds that note's lock for the whole read-modify-write cycle. Tokio's mutex
//! is FIFO-fair, so queued writes to one note run in submission order while
//! writes to different notes proceed independently.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::error::Result;
use crate::index::FieldIndex;
use crate::note::NotePath;
use crate::patcher::{self, FieldWrite, InsertOptions, PatchOutcome};
use crate::vault::Vault;

/// Field writes destined for one note
#[derive(Debug, Clone, PartialEq)]
pub struct PendingPatch {
    pub path: NotePath,
    pub creates: Vec<FieldWrite>,
    pub updates: Vec<FieldWrite>,
    pub options: InsertOptions,
}

impl PendingPatch {
    pub fn new(path: NotePath) -> Self {
        Self {
            path,
            creates: Vec::new(),
            updates: Vec::new(),
            options: InsertOptions::default(),
        }
    }

    pub fn create(mut self, write: FieldWrite) -> Self {
        self.creates.push(write);
        self
    }

    pub fn update(mut self, write: FieldWrite) -> Self {
        self.updates.push(write);
        self
    }

    pub fn with_options(mut self, options: InsertOptions) -> Self {
        self.options = options;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty()
    }
}

pub struct WriteScheduler {
    vault: Arc<dyn Vault>,
    index: Arc<FieldIndex>,
    locks: DashMap<NotePath, Arc<Mutex<()>>>,
}

impl WriteScheduler {
    pub fn new(vault: Arc<dyn Vault>, index: Arc<FieldIndex>) -> Self {
        Self {
            vault,
            index,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, path: &NotePath) -> Arc<Mutex<()>> {
        self.locks.entry(path.clone()).or_default().clone()
    }

    /// Run a read-modify-write cycle on one note.
    ///
    /// `edit` receives the current content and returns the new content (or
    /// `None` to leave the note alone) plus a result passed back to the
    /// caller. The note is written only when the content actually changed.
    pub async fn modify<T, F>(&self, path: &NotePath, edit: F) -> Result<T>
    where
        F: FnOnce(&str) -> Result<(Option<String>, T)> + Send,
    {
        let lock = self.lock_for(path);
        let result = {
            let _guard = lock.lock().await;
            trace!(path = %path, "write slot acquired");
            self.read_modify_write(path, edit).await
        };
        drop(lock);
        self.release(path);
        result
    }

    async fn read_modify_write<T, F>(&self, path: &NotePath, edit: F) -> Result<T>
    where
        F: FnOnce(&str) -> Result<(Option<String>, T)> + Send,
    {
        let content = self.vault.read(path).await?;
        let (next, output) = edit(&content)?;
        if let Some(next) = next.filter(|n| n != &content) {
            self.index.begin_self_write(path);
            self.vault.write(path, &next).await?;
            let written = self.vault.modified(path).await.ok();
            self.index.mark_self_write(path, written);
            debug!(path = %path, bytes = next.len(), "note written");
        }
        Ok(output)
    }

    /// Forget the lock of a note nobody is waiting on
    fn release(&self, path: &NotePath) {
        self.locks.remove_if(path, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Notes with a live write slot
    pub fn active_slots(&self) -> usize {
        self.locks.len()
    }

    /// Apply a patch through the inline field patcher
    pub async fn apply(&self, patch: PendingPatch) -> Result<PatchOutcome> {
        let PendingPatch {
            path,
            creates,
            updates,
            options,
        } = patch;
        self.modify(&path, move |content| {
            let outcome = patcher::create_or_update(content, &creates, &updates, &options);
            let next = outcome.changed.then(|| outcome.content.clone());
            Ok((next, outcome))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexSettings;
    use crate::vault::FsVault;
    use fieldmark_cel::CelSandbox;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<dyn Vault>, WriteScheduler) {
        let temp = TempDir::new().unwrap();
        let vault: Arc<dyn Vault> = Arc::new(FsVault::new(temp.path()));
        let index = Arc::new(FieldIndex::new(
            vault.clone(),
            Arc::new(CelSandbox::new()),
            IndexSettings::default(),
        ));
        let scheduler = WriteScheduler::new(vault.clone(), index);
        (temp, vault, scheduler)
    }

    #[tokio::test]
    async fn test_apply_writes_and_marks() {
        let (_temp, vault, scheduler) = setup();
        let path = NotePath::new("a.md");
        vault.write(&path, "---\nstatus: draft\n---\n").await.unwrap();

        let patch = PendingPatch::new(path.clone()).update(FieldWrite::new("status", json!("done")));
        let outcome = scheduler.apply(patch).await.unwrap();
        assert!(outcome.changed);
        assert_eq!(vault.read(&path).await.unwrap(), "---\nstatus: done\n---\n");
    }

    #[tokio::test]
    async fn test_unchanged_content_is_not_written() {
        let (_temp, vault, scheduler) = setup();
        let path = NotePath::new("a.md");
        vault.write(&path, "x").await.unwrap();
        let before = vault.modified(&path).await.unwrap();

        let seen = scheduler
            .modify(&path, |content| Ok((Some(content.to_string()), content.len())))
            .await
            .unwrap();
        assert_eq!(seen, 1);
        assert_eq!(vault.modified(&path).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_write_slots_are_released() {
        let (_temp, vault, scheduler) = setup();
        for name in ["a.md", "b.md", "c.md"] {
            let path = NotePath::new(name);
            vault.write(&path, "x:: 1\n").await.unwrap();
            scheduler
                .modify(&path, |content| Ok((Some(content.replace('1', "2")), ())))
                .await
                .unwrap();
        }
        assert_eq!(scheduler.active_slots(), 0);

        let failed = scheduler.modify(&NotePath::new("nope.md"), |_| Ok((None, ()))).await;
        assert!(failed.is_err());
        assert_eq!(scheduler.active_slots(), 0);
    }

    #[tokio::test]
    async fn test_own_write_is_recorded_for_that_note_only() {
        let (_temp, vault, scheduler) = setup();
        let a = NotePath::new("a.md");
        let b = NotePath::new("b.md");
        vault.write(&a, "x:: 1\n").await.unwrap();
        vault.write(&b, "x:: 1\n").await.unwrap();

        scheduler
            .modify(&a, |_| Ok((Some("x:: 2\n".to_string()), ())))
            .await
            .unwrap();
        let index = &scheduler.index;
        assert!(index.is_accounted_for(&a, vault.modified(&a).await.unwrap()));
        assert!(!index.is_accounted_for(&b, vault.modified(&b).await.unwrap()));
    }

    #[tokio::test]
    async fn test_missing_note() {
        let (_temp, _vault, scheduler) = setup();
        let result = scheduler
            .modify(&NotePath::new("nope.md"), |_| Ok((None, ())))
            .await;
        assert!(result.is_err());
    }
}
