// SPDX-License-Identifier: MIT

//! Checkpoint persistence
//!
//! The runner saves a [`WorkflowSnapshot`] after every superstep when a
//! [`CheckpointStore`] is configured. Two stores ship with the crate:
//! - [`InMemoryCheckpointStore`] - process-local, for tests and servers
//! - [`FileCheckpointStore`] - one JSON file per checkpoint

pub mod encoding;
mod file;
mod memory;
pub mod snapshot;

pub use encoding::{
    checkpoint_envelope, decode_checkpoint_value, encode_checkpoint_value, CheckpointValue,
};
pub use file::FileCheckpointStore;
pub use memory::InMemoryCheckpointStore;
pub use snapshot::{CheckpointInfo, WorkflowSnapshot};

use crate::adk::error::CheckpointError;
use async_trait::async_trait;

/// Storage backend for workflow snapshots
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist a snapshot and return its checkpoint id
    async fn save(&self, run_id: &str, snapshot: &WorkflowSnapshot)
        -> Result<String, CheckpointError>;

    /// Checkpoints of one run, oldest first
    async fn list_checkpoints(&self, run_id: &str) -> Result<Vec<CheckpointInfo>, CheckpointError>;

    async fn restore(&self, checkpoint_id: &str) -> Result<WorkflowSnapshot, CheckpointError>;

    /// Most recent checkpoint of a run, if any
    async fn latest(&self, run_id: &str) -> Result<Option<CheckpointInfo>, CheckpointError> {
        Ok(self.list_checkpoints(run_id).await?.pop())
    }
}
