// SPDX-License-Identifier: MIT

//! Declarative workflows: YAML action lists compiled into executor graphs.
//!
//! [`WorkflowLoader`] parses a definition, [`DeclarativeWorkflowBuilder`]
//! turns it into a runnable [`Workflow`](crate::baton::workflow::Workflow),
//! and the executors keep their variables in a [`DeclarativeWorkflowState`]
//! stored in shared state so it survives checkpoints.

pub mod actions;
pub mod builder;
pub mod executors;
pub mod expression;
pub mod loader;
pub mod protocol;
pub mod state;

pub use actions::{parse_actions, Action, ActionKind};
pub use builder::DeclarativeWorkflowBuilder;
pub use loader::{WorkflowDefinition, WorkflowLoader};
pub use protocol::{
    ActionComplete, ActionTrigger, ConditionResult, LoopAction, LoopControl, LoopIterationResult,
};
pub use state::DeclarativeWorkflowState;
