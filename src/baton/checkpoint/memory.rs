// SPDX-License-Identifier: MIT

use super::{CheckpointInfo, CheckpointStore, WorkflowSnapshot};
use crate::adk::error::CheckpointError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Process-local checkpoint store
#[derive(Clone, Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: Arc<RwLock<Vec<(String, WorkflowSnapshot)>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.checkpoints.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.checkpoints.read().await.is_empty()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(
        &self,
        run_id: &str,
        snapshot: &WorkflowSnapshot,
    ) -> Result<String, CheckpointError> {
        let checkpoint_id = uuid::Uuid::new_v4().to_string();
        let mut snapshot = snapshot.clone();
        snapshot.run_id = run_id.to_string();
        self.checkpoints
            .write()
            .await
            .push((checkpoint_id.clone(), snapshot));
        Ok(checkpoint_id)
    }

    async fn list_checkpoints(&self, run_id: &str) -> Result<Vec<CheckpointInfo>, CheckpointError> {
        let checkpoints = self.checkpoints.read().await;
        Ok(checkpoints
            .iter()
            .filter(|(_, snap)| snap.run_id == run_id)
            .map(|(id, snap)| CheckpointInfo::from_snapshot(id.clone(), snap))
            .collect())
    }

    async fn restore(&self, checkpoint_id: &str) -> Result<WorkflowSnapshot, CheckpointError> {
        let checkpoints = self.checkpoints.read().await;
        checkpoints
            .iter()
            .find(|(id, _)| id == checkpoint_id)
            .map(|(_, snap)| snap.clone())
            .ok_or_else(|| CheckpointError::NotFound(checkpoint_id.to_string()))
    }
}
