//! JSON-file snapshot store.
//!
//! Persists the whole queue as one JSON array under a single well-known path.
//! Writes go to a sibling temp file first and are renamed into place, so a
//! crash mid-write leaves the previous snapshot intact.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use super::traits::{QueueStore, StoreError};
use crate::operation::Operation;

/// File-backed [`QueueStore`] using atomic tmp-then-rename snapshots.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }
}

#[async_trait]
impl QueueStore for JsonFileStore {
    async fn load(&self) -> Result<Vec<Operation>, StoreError> {
        match fs::read(&self.path).await {
            Ok(bytes) => {
                let operations: Vec<Operation> = serde_json::from_slice(&bytes)?;
                debug!(path = %self.path.display(), count = operations.len(), "loaded queue snapshot");
                Ok(operations)
            }
            // No snapshot yet means an empty queue, not an error.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, operations: &[Operation]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let bytes = serde_json::to_vec_pretty(operations)?;
        let tmp = self.tmp_path();

        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), count = operations.len(), "persisted queue snapshot");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{Operation, OperationKind};
    use serde_json::json;

    fn op(kind: OperationKind) -> Operation {
        Operation::new(kind, json!({"id": "abc"}))
    }

    #[tokio::test]
    async fn test_load_absent_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("queue.json"));

        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("queue.json"));

        let ops = vec![op(OperationKind::CreateEvent), op(OperationKind::DeleteReminder)];
        store.save(&ops).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, ops[0].id);
        assert_eq!(loaded[1].kind, OperationKind::DeleteReminder);
    }

    #[tokio::test]
    async fn test_save_replaces_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("queue.json"));

        store.save(&[op(OperationKind::CreateEvent)]).await.unwrap();
        store.save(&[]).await.unwrap();

        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested/deep/queue.json"));

        store.save(&[op(OperationKind::UpdateEvent)]).await.unwrap();
        assert_eq!(store.load().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        tokio::fs::write(&path, b"not json{{").await.unwrap();

        let store = JsonFileStore::new(&path);
        assert!(matches!(
            store.load().await.unwrap_err(),
            StoreError::Serialize(_)
        ));
    }
}
