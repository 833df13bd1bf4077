use crate::error::Result;
use crate::model::Element;
use anyhow::Context;
use chrono::Utc;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// On-disk JSON backups for createOrReplace: the documents about to be
/// deleted are written under `<root>/<org>/<project>/` before the delete,
/// and discarded only after the recreate succeeds. A failed recreate leaves
/// the file in place for manual recovery; nothing ever replays it
/// automatically.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Write a snapshot and return its path. The filename carries a uuid
    /// suffix alongside the timestamp so concurrent calls on the same
    /// project cannot collide; directory creation is idempotent.
    pub async fn write(&self, org: &str, project: &str, elements: &[Element]) -> Result<PathBuf> {
        let dir = self.root.join(org).join(project);
        tokio::fs::create_dir_all(&dir)
            .await
            .context("Failed to create snapshot directory")?;

        let file = dir.join(format!(
            "elements-{}-{}.json",
            Utc::now().format("%Y%m%dT%H%M%S%3f"),
            Uuid::new_v4().simple()
        ));
        let data = serde_json::to_vec_pretty(elements)
            .context("Failed to serialize element snapshot")?;
        tokio::fs::write(&file, data)
            .await
            .context("Failed to write element snapshot")?;
        Ok(file)
    }

    /// Remove a snapshot after a successful recreate, pruning now-empty
    /// project and org directories. Prune failures on non-empty directories
    /// are expected and ignored.
    pub async fn discard(&self, path: &Path) -> Result<()> {
        tokio::fs::remove_file(path)
            .await
            .context("Failed to remove element snapshot")?;

        let mut dir = path.parent();
        while let Some(current) = dir {
            if current == self.root {
                break;
            }
            if tokio::fs::remove_dir(current).await.is_err() {
                break;
            }
            dir = current.parent();
        }
        Ok(())
    }
}
