// SPDX-License-Identifier: MIT

//! Executors that run declarative actions.
//!
//! Every action entry executor has the action's id and accepts the
//! continuation messages (`ActionTrigger`, `ActionComplete`,
//! `ConditionResult`, `LoopIterationResult`) as "your turn". Structured
//! actions add helper executors with derived ids: `<id>_join` for branch
//! re-entry, `<id>_next` and `<id>_exit` for loops.

mod agent;
mod basic;
mod control_flow;
mod input;
mod tool;

pub use agent::{ExternalLoopState, InvokeAgentExecutor};
pub use basic::{BasicActionExecutor, EndExecutor, JoinExecutor, StartExecutor};
pub use control_flow::{
    branch_condition, iteration_condition, ConditionExecutor, ForeachInitExecutor,
    ForeachNextExecutor, GotoExecutor, LoopControlExecutor, LoopSlot,
};
pub use input::ExternalInputExecutor;
pub use tool::InvokeToolExecutor;

use crate::baton::declarative::protocol::ActionComplete;
use crate::baton::workflow::message::{MessageKind, WorkflowMessage};
use crate::baton::workflow::WorkflowContext;

pub const START_ID: &str = "workflow_start";
pub const END_ID: &str = "workflow_end";
/// Shared-state key of the per-loop iteration slots
pub const LOOP_STATE_KEY: &str = "_loop_state";
/// Shared-state key prefix of agent external-loop state
pub const EXTERNAL_LOOP_KEY: &str = "_external_loop";

pub(crate) const CONTINUATION: &[MessageKind] = &[
    MessageKind::ActionTrigger,
    MessageKind::ActionComplete,
    MessageKind::ConditionResult,
    MessageKind::LoopIterationResult,
];

pub(crate) const CONTINUATION_OR_RESPONSE: &[MessageKind] = &[
    MessageKind::ActionTrigger,
    MessageKind::ActionComplete,
    MessageKind::ConditionResult,
    MessageKind::LoopIterationResult,
    MessageKind::Response,
];

pub fn join_id(action_id: &str) -> String {
    format!("{}_join", action_id)
}

pub fn next_id(action_id: &str) -> String {
    format!("{}_next", action_id)
}

pub fn exit_id(action_id: &str) -> String {
    format!("{}_exit", action_id)
}

/// Hand control to whatever follows the current action
pub(crate) fn complete(ctx: &mut WorkflowContext) {
    ctx.send_message(
        WorkflowMessage::ActionComplete(ActionComplete::default()),
        None,
    );
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::baton::declarative::state::DeclarativeWorkflowState;
    use crate::baton::workflow::{SharedState, WorkflowContext};

    pub fn context(executor_id: &str, shared: &SharedState) -> WorkflowContext {
        WorkflowContext::new(
            executor_id,
            vec!["upstream".into()],
            shared.clone(),
            None,
            None,
        )
        .unwrap()
    }

    pub async fn state(shared: &SharedState) -> DeclarativeWorkflowState {
        DeclarativeWorkflowState::load(shared).await.unwrap()
    }
}
