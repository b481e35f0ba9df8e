// SPDX-License-Identifier: MIT

use super::{CheckpointInfo, CheckpointStore, WorkflowSnapshot};
use crate::adk::error::CheckpointError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Stores each checkpoint as `<dir>/<checkpoint_id>.json`
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, checkpoint_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", checkpoint_id))
    }

    async fn read_snapshot(path: &Path) -> Result<WorkflowSnapshot, CheckpointError> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| CheckpointError::Decode(e.to_string()))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(
        &self,
        run_id: &str,
        snapshot: &WorkflowSnapshot,
    ) -> Result<String, CheckpointError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;

        let checkpoint_id = uuid::Uuid::new_v4().to_string();
        let mut snapshot = snapshot.clone();
        snapshot.run_id = run_id.to_string();
        let content = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;

        fs::write(self.path_for(&checkpoint_id), content)
            .await
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;
        log::debug!(
            "Saved checkpoint {} for run {} to {:?}",
            checkpoint_id,
            run_id,
            self.dir
        );
        Ok(checkpoint_id)
    }

    async fn list_checkpoints(&self, run_id: &str) -> Result<Vec<CheckpointInfo>, CheckpointError> {
        let mut infos = Vec::new();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(infos),
            Err(e) => return Err(CheckpointError::Storage(e.to_string())),
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            let Some(checkpoint_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match Self::read_snapshot(&path).await {
                Ok(snapshot) if snapshot.run_id == run_id => {
                    infos.push(CheckpointInfo::from_snapshot(checkpoint_id, &snapshot))
                }
                Ok(_) => {}
                Err(e) => log::warn!("Skipping unreadable checkpoint {:?}: {}", path, e),
            }
        }

        infos.sort_by(|a, b| {
            a.superstep
                .cmp(&b.superstep)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(infos)
    }

    async fn restore(&self, checkpoint_id: &str) -> Result<WorkflowSnapshot, CheckpointError> {
        let path = self.path_for(checkpoint_id);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(CheckpointError::NotFound(checkpoint_id.to_string()));
        }
        Self::read_snapshot(&path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::HashMap;

    fn snapshot(superstep: usize) -> WorkflowSnapshot {
        let mut shared_state = HashMap::new();
        shared_state.insert("k".to_string(), json!({"nested": [1, 2]}));
        WorkflowSnapshot {
            run_id: String::new(),
            workflow_name: "file-test".into(),
            superstep,
            created_at: Utc::now(),
            executor_states: HashMap::new(),
            executor_checkpoints: HashMap::new(),
            shared_state,
            pending_requests: vec![],
            queued_messages: vec![],
        }
    }

    #[tokio::test]
    async fn test_file_store_persists_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("checkpoints"));

        let a = store.save("run", &snapshot(1)).await.unwrap();
        let b = store.save("run", &snapshot(2)).await.unwrap();
        store.save("other", &snapshot(1)).await.unwrap();

        let listed = store.list_checkpoints("run").await.unwrap();
        let ids: Vec<_> = listed.iter().map(|c| c.checkpoint_id.clone()).collect();
        assert_eq!(ids, vec![a, b.clone()]);

        let restored = store.restore(&b).await.unwrap();
        assert_eq!(restored.superstep, 2);
        assert_eq!(restored.shared_state["k"], json!({"nested": [1, 2]}));
    }

    #[tokio::test]
    async fn test_missing_directory_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("absent"));
        assert!(store.list_checkpoints("run").await.unwrap().is_empty());
        assert!(matches!(
            store.restore("nope").await,
            Err(CheckpointError::NotFound(_))
        ));
    }
}
