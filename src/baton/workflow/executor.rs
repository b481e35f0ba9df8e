// SPDX-License-Identifier: MIT

use crate::adk::error::Result;
use crate::baton::workflow::context::WorkflowContext;
use crate::baton::workflow::message::{MessageKind, WorkflowMessage};
use async_trait::async_trait;
use serde_json::Value;

/// Named unit of computation in a workflow graph.
///
/// `input_types` are the executor's handler bindings: the runner only
/// delivers messages whose kind appears there. Handlers run sequentially per
/// executor, so interior state behind a lock is never contended by the
/// runner itself.
///
/// Delivery is at-least-once across a crash/resume boundary. Handlers that
/// touch external systems must tolerate being replayed from the last
/// checkpoint.
#[async_trait]
pub trait Executor: Send + Sync {
    fn id(&self) -> &str;

    fn input_types(&self) -> &[MessageKind];

    fn accepts(&self, kind: MessageKind) -> bool {
        self.input_types().contains(&kind)
    }

    async fn handle(&self, message: WorkflowMessage, ctx: &mut WorkflowContext) -> Result<()>;

    /// State captured into checkpoints in addition to the `set_state` slot
    async fn on_checkpoint_save(&self) -> Option<Value> {
        None
    }

    async fn on_checkpoint_restore(&self, _state: Value) -> Result<()> {
        Ok(())
    }
}
