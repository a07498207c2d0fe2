//! Note storage
//!
//! The index never touches the filesystem directly; it goes through [`Vault`].
//! [`FsVault`] stores notes as `.md` files under a root directory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{IndexError, Result};
use crate::note::NotePath;

/// Storage for notes
#[async_trait]
pub trait Vault: Send + Sync {
    /// Every note in the vault, sorted
    async fn list(&self) -> Result<Vec<NotePath>>;

    async fn read(&self, path: &NotePath) -> Result<String>;

    async fn write(&self, path: &NotePath, content: &str) -> Result<()>;

    async fn exists(&self, path: &NotePath) -> bool;

    /// Last modification time
    async fn modified(&self, path: &NotePath) -> Result<DateTime<Utc>>;

    /// Names of the bookmark groups containing the note
    async fn bookmark_groups(&self, _path: &NotePath) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Vault backed by a directory of markdown files
#[derive(Debug, Clone)]
pub struct FsVault {
    root: PathBuf,
    bookmarks: BTreeMap<String, Vec<NotePath>>,
}

impl FsVault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            bookmarks: BTreeMap::new(),
        }
    }

    /// Register a bookmark group and its member notes
    pub fn with_bookmark_group(mut self, group: impl Into<String>, notes: Vec<NotePath>) -> Self {
        self.bookmarks.insert(group.into(), notes);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a note
    pub fn note_path(&self, path: &NotePath) -> PathBuf {
        self.root.join(path.as_str())
    }
}

#[async_trait]
impl Vault for FsVault {
    async fn list(&self) -> Result<Vec<NotePath>> {
        let mut notes = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let name = entry.file_name();
                if name.to_string_lossy().starts_with('.') {
                    continue;
                }
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else if path.extension().is_some_and(|ext| ext == "md") {
                    if let Ok(relative) = path.strip_prefix(&self.root) {
                        notes.push(NotePath::new(relative.to_string_lossy()));
                    }
                }
            }
        }

        notes.sort();
        Ok(notes)
    }

    async fn read(&self, path: &NotePath) -> Result<String> {
        let full = self.note_path(path);
        if !full.is_file() {
            return Err(IndexError::note_not_found(path.as_str()));
        }
        Ok(fs::read_to_string(&full).await?)
    }

    async fn write(&self, path: &NotePath, content: &str) -> Result<()> {
        atomic_write(&self.note_path(path), content.as_bytes()).await
    }

    async fn exists(&self, path: &NotePath) -> bool {
        self.note_path(path).is_file()
    }

    async fn modified(&self, path: &NotePath) -> Result<DateTime<Utc>> {
        let metadata = fs::metadata(self.note_path(path)).await?;
        Ok(DateTime::<Utc>::from(metadata.modified()?))
    }

    async fn bookmark_groups(&self, path: &NotePath) -> Result<Vec<String>> {
        Ok(self
            .bookmarks
            .iter()
            .filter(|(_, notes)| notes.contains(path))
            .map(|(group, _)| group.clone())
            .collect())
    }
}

/// Write content to a file atomically (temp file in the same directory, then rename)
async fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let temp_path = path.with_extension(format!("{}.tmp", ulid::Ulid::new()));
    fs::write(&temp_path, content).await?;
    fs::rename(&temp_path, path).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, FsVault) {
        let temp = TempDir::new().unwrap();
        let vault = FsVault::new(temp.path());
        (temp, vault)
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let (_temp, vault) = setup().await;
        let path = NotePath::new("Projects/Alpha.md");
        vault.write(&path, "status:: draft\n").await.unwrap();
        assert!(vault.exists(&path).await);
        assert_eq!(vault.read(&path).await.unwrap(), "status:: draft\n");
        assert!(vault.modified(&path).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_skips_hidden_and_non_markdown() {
        let (temp, vault) = setup().await;
        std::fs::create_dir_all(temp.path().join(".obsidian")).unwrap();
        std::fs::write(temp.path().join(".obsidian/x.md"), "").unwrap();
        std::fs::write(temp.path().join("image.png"), "").unwrap();
        std::fs::create_dir_all(temp.path().join("b")).unwrap();
        std::fs::write(temp.path().join("b/Two.md"), "").unwrap();
        std::fs::write(temp.path().join("One.md"), "").unwrap();

        let notes = vault.list().await.unwrap();
        assert_eq!(notes, vec![NotePath::new("One.md"), NotePath::new("b/Two.md")]);
    }

    #[tokio::test]
    async fn test_read_missing_note() {
        let (_temp, vault) = setup().await;
        let err = vault.read(&NotePath::new("nope.md")).await.unwrap_err();
        assert!(matches!(err, IndexError::NoteNotFound { .. }));
    }

    #[tokio::test]
    async fn test_bookmark_groups() {
        let (_temp, vault) = setup().await;
        let path = NotePath::new("a.md");
        let vault = vault.with_bookmark_group("Reading", vec![path.clone()]);
        assert_eq!(vault.bookmark_groups(&path).await.unwrap(), vec!["Reading"]);
        assert!(vault
            .bookmark_groups(&NotePath::new("b.md"))
            .await
            .unwrap()
            .is_empty());
    }
}
