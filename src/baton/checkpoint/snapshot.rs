// SPDX-License-Identifier: MIT

use crate::baton::workflow::message::Envelope;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Everything needed to resume a run after the superstep it was taken at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub run_id: String,
    pub workflow_name: String,
    pub superstep: usize,
    pub created_at: DateTime<Utc>,
    /// Last `set_state` payload per executor id
    #[serde(default)]
    pub executor_states: HashMap<String, Value>,
    /// `on_checkpoint_save` output per executor id
    #[serde(default)]
    pub executor_checkpoints: HashMap<String, Value>,
    #[serde(default)]
    pub shared_state: HashMap<String, Value>,
    /// Pending requests, each encoded with `encode_checkpoint_value`
    #[serde(default)]
    pub pending_requests: Vec<Value>,
    /// Messages queued for the next superstep
    #[serde(default)]
    pub queued_messages: Vec<Envelope>,
}

/// Listing entry returned by `CheckpointStore::list_checkpoints`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointInfo {
    pub checkpoint_id: String,
    pub run_id: String,
    pub superstep: usize,
    pub created_at: DateTime<Utc>,
    pub pending_requests: usize,
}

impl CheckpointInfo {
    pub fn from_snapshot(checkpoint_id: impl Into<String>, snapshot: &WorkflowSnapshot) -> Self {
        Self {
            checkpoint_id: checkpoint_id.into(),
            run_id: snapshot.run_id.clone(),
            superstep: snapshot.superstep,
            created_at: snapshot.created_at,
            pending_requests: snapshot.pending_requests.len(),
        }
    }
}
