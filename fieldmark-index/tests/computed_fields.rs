use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fieldmark_index::{
    ComputeStatus, Execute, FieldmarkContext, FileChanged, FsVault, IndexError, IndexEvent, IndexSettings, NotePath,
    RecomputeScope, Result, UpdateLookups, Vault,
};
use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const HUB: &str = r#"---
fields:
  - name: backlinks
    type:
      kind: lookup
      relation: { by: links-to, field: related }
      auto_update: false
---
"#;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn read(root: &Path, rel: &str) -> String {
    fs::read_to_string(root.join(rel)).unwrap()
}

async fn open(root: &Path) -> FieldmarkContext {
    fieldmark_common::init_tracing("fieldmark_index=debug");
    FieldmarkContext::open(root)
        .with_settings(IndexSettings::default())
        .build()
        .await
        .unwrap()
}

/// mtime resolution differs between filesystems
async fn tick() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn manual_lookup_waits_for_an_explicit_refresh() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(root, "classes/Hub.md", HUB);
    write(root, "X.md", "---\nfileClass: Hub\n---\nbacklinks:: \n");
    write(root, "A.md", "related:: [[X]]\n");
    write(root, "B.md", "related:: [[X]]\n");
    let ctx = open(root).await;
    let x = NotePath::new("X.md");

    let report = ctx.lookups().recompute(&RecomputeScope::All).await.unwrap();
    assert_eq!(report.changed.len(), 1);
    assert!(report.written.is_empty());
    assert_eq!(ctx.lookups().status(&x, "backlinks"), Some(ComputeStatus::Changed));
    assert_eq!(read(root, "X.md"), "---\nfileClass: Hub\n---\nbacklinks:: \n");

    let mut events = ctx.subscribe();
    UpdateLookups::new("X.md")
        .field("backlinks")
        .execute(&ctx)
        .await
        .into_result()
        .unwrap();
    assert_eq!(read(root, "X.md"), "---\nfileClass: Hub\n---\nbacklinks:: [[A]], [[B]]\n");
    assert_eq!(ctx.lookups().status(&x, "backlinks"), Some(ComputeStatus::UpToDate));

    let mut announced = false;
    while let Ok(event) = events.try_recv() {
        if let IndexEvent::ComputedFieldsUpdated { path } = event {
            announced |= path == x;
        }
    }
    assert!(announced);

    tick().await;
    write(root, "B.md", "nothing to see\n");
    let result = FileChanged::new("B.md").execute(&ctx).await.into_result().unwrap();
    assert_eq!(result["skipped"], false);
    assert_eq!(ctx.lookups().status(&x, "backlinks"), Some(ComputeStatus::Changed));
    assert_eq!(read(root, "X.md"), "---\nfileClass: Hub\n---\nbacklinks:: [[A]], [[B]]\n");

    UpdateLookups::new("X.md")
        .field("backlinks")
        .execute(&ctx)
        .await
        .into_result()
        .unwrap();
    assert_eq!(read(root, "X.md"), "---\nfileClass: Hub\n---\nbacklinks:: [[A]]\n");
    assert_eq!(ctx.lookups().status(&x, "backlinks"), Some(ComputeStatus::UpToDate));
}

#[tokio::test]
async fn second_pass_writes_nothing() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(root, "classes/Hub.md", &HUB.replace("auto_update: false", "auto_update: true"));
    write(root, "X.md", "---\nfileClass: Hub\n---\nbacklinks:: \n");
    write(root, "A.md", "related:: [[X]]\n");
    let ctx = open(root).await;

    let first = ctx.recompute_all().await.unwrap();
    assert_eq!(first.write_count(), 1);
    let after_first = read(root, "X.md");
    assert_eq!(after_first, "---\nfileClass: Hub\n---\nbacklinks:: [[A]]\n");

    let second = ctx.recompute_all().await.unwrap();
    assert_eq!(second.write_count(), 0);
    assert!(second.changed.is_empty());
    assert_eq!(second.up_to_date, 1);
    assert_eq!(read(root, "X.md"), after_first);
}

#[tokio::test]
async fn reordered_list_is_not_a_change() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(root, "classes/Hub.md", &HUB.replace("auto_update: false", "auto_update: true"));
    write(root, "X.md", "---\nfileClass: Hub\n---\nbacklinks:: [[B]], [[A]]\n");
    write(root, "A.md", "related:: [[X]]\n");
    write(root, "B.md", "related:: [[X]]\n");
    let ctx = open(root).await;

    let report = ctx.lookups().recompute(&RecomputeScope::All).await.unwrap();
    assert_eq!(report.write_count(), 0);
    assert_eq!(report.up_to_date, 1);
    assert_eq!(read(root, "X.md"), "---\nfileClass: Hub\n---\nbacklinks:: [[B]], [[A]]\n");
}

#[tokio::test]
async fn type_change_drops_only_the_changed_field() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let hub = r#"---
fields:
  - name: backlinks
    type:
      kind: lookup
      relation: { by: links-to, field: related }
  - name: total
    type:
      kind: lookup
      relation: { by: links-to, field: related }
      output: { mode: builtin-summarizing, function: count-all, field: related }
---
"#;
    write(root, "classes/Hub.md", hub);
    write(root, "X.md", "---\nfileClass: Hub\n---\nbacklinks:: \ntotal:: \n");
    write(root, "A.md", "related:: [[X]]\n");
    let ctx = open(root).await;
    let x = NotePath::new("X.md");

    ctx.recompute_all().await.unwrap();
    assert_eq!(read(root, "X.md"), "---\nfileClass: Hub\n---\nbacklinks:: [[A]]\ntotal:: 1\n");
    assert!(ctx.lookups().entry(&x, "backlinks").is_some());
    assert!(ctx.lookups().entry(&x, "total").is_some());

    let changed = hub.replacen(
        "      relation: { by: links-to, field: related }\n  - name: total",
        "      relation: { by: links-to, field: related }\n      output: { mode: links-bullet-list }\n  - name: total",
        1,
    );
    write(root, "classes/Hub.md", &changed);
    let dropped = ctx.rebuild().await.unwrap();

    assert_eq!(dropped, 1);
    assert!(ctx.lookups().entry(&x, "backlinks").is_none());
    assert!(ctx.lookups().entry(&x, "total").is_some());
}

/// Vault whose first write fails
struct FlakyVault {
    inner: FsVault,
    failed: AtomicBool,
}

#[async_trait]
impl Vault for FlakyVault {
    async fn list(&self) -> Result<Vec<NotePath>> {
        self.inner.list().await
    }

    async fn read(&self, path: &NotePath) -> Result<String> {
        self.inner.read(path).await
    }

    async fn write(&self, path: &NotePath, content: &str) -> Result<()> {
        if !self.failed.swap(true, Ordering::SeqCst) {
            return Err(IndexError::Io(std::io::Error::other("disk full")));
        }
        self.inner.write(path, content).await
    }

    async fn exists(&self, path: &NotePath) -> bool {
        self.inner.exists(path).await
    }

    async fn modified(&self, path: &NotePath) -> Result<DateTime<Utc>> {
        self.inner.modified(path).await
    }
}

#[tokio::test]
async fn failed_write_is_retried_on_the_next_pass() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(root, "classes/Hub.md", &HUB.replace("auto_update: false", "auto_update: true"));
    write(root, "X.md", "---\nfileClass: Hub\n---\nbacklinks:: \n");
    write(root, "A.md", "related:: [[X]]\n");
    let vault = Arc::new(FlakyVault {
        inner: FsVault::new(root),
        failed: AtomicBool::new(false),
    });
    let ctx = FieldmarkContext::open(root)
        .with_vault(vault)
        .with_settings(IndexSettings::default())
        .build()
        .await
        .unwrap();
    let x = NotePath::new("X.md");

    let first = ctx.recompute_all().await.unwrap();
    assert_eq!(first.errors.len(), 1);
    assert_eq!(first.write_count(), 0);
    let entry = ctx.lookups().entry(&x, "backlinks").unwrap();
    assert_eq!(entry.status, ComputeStatus::Error);
    assert_eq!(entry.value, json!(""));
    assert_eq!(read(root, "X.md"), "---\nfileClass: Hub\n---\nbacklinks:: \n");

    let second = ctx.recompute_all().await.unwrap();
    assert_eq!(second.write_count(), 1);
    assert_eq!(ctx.lookups().status(&x, "backlinks"), Some(ComputeStatus::UpToDate));
    assert_eq!(read(root, "X.md"), "---\nfileClass: Hub\n---\nbacklinks:: [[A]]\n");
}

const ORDER: &str = r#"---
fields:
  - name: qty
    type: { kind: number }
  - name: rate
    type: { kind: number }
  - name: total
    type: { kind: formula, formula: "current.qty * 3" }
  - name: double
    type: { kind: formula, formula: "current.rate * 2" }
---
"#;

#[tokio::test]
async fn failing_formula_keeps_its_value_while_siblings_update() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(root, "classes/Order.md", ORDER);
    write(root, "o.md", "---\nfileClass: Order\n---\nqty:: 2\nrate:: 4\ntotal:: \ndouble:: \n");
    let ctx = open(root).await;
    let o = NotePath::new("o.md");

    let first = ctx.recompute_all().await.unwrap();
    assert_eq!(first.write_count(), 2);
    assert_eq!(read(root, "o.md"), "---\nfileClass: Order\n---\nqty:: 2\nrate:: 4\ntotal:: 6\ndouble:: 8\n");

    tick().await;
    write(root, "o.md", "---\nfileClass: Order\n---\nqty:: 5\ntotal:: 6\ndouble:: 8\n");
    let result = FileChanged::new("o.md").execute(&ctx).await.into_result().unwrap();
    assert_eq!(result["skipped"], false);

    let entry = ctx.formulas().entry(&o, "double").unwrap();
    assert_eq!(entry.status, ComputeStatus::Error);
    assert_eq!(entry.value, json!("8"));
    assert!(entry.error.is_some());
    assert_eq!(ctx.formulas().status(&o, "total"), Some(ComputeStatus::UpToDate));
    assert_eq!(read(root, "o.md"), "---\nfileClass: Order\n---\nqty:: 5\ntotal:: 15\ndouble:: 8\n");
}

#[tokio::test]
async fn formula_reads_other_notes() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let invoice = r#"---
fields:
  - name: rate
    type: { kind: formula, formula: "linked[0].rate" }
  - name: vendor_rate
    type: { kind: formula, formula: "pages.filter(p, p.file.name == 'Vendor')[0].rate" }
---
"#;
    write(root, "classes/Invoice.md", invoice);
    write(root, "Acme.md", "---\nrate: 10\n---\n");
    write(root, "Vendor.md", "---\nrate: 7\n---\n");
    write(root, "i.md", "---\nfileClass: Invoice\n---\nclient:: [[Acme]]\nrate:: \nvendor_rate:: \n");
    let ctx = open(root).await;

    let report = ctx.formulas().recompute(&RecomputeScope::All).await.unwrap();
    assert!(report.is_clean(), "{:?}", report.errors);
    assert_eq!(
        read(root, "i.md"),
        "---\nfileClass: Invoice\n---\nclient:: [[Acme]]\nrate:: 10\nvendor_rate:: 7\n"
    );
}
