// SPDX-License-Identifier: MIT

//! Message-passing substrate: executors, edges, contexts and the superstep
//! runner that drives them.

pub mod builder;
pub mod config;
pub mod context;
pub mod edge;
pub mod events;
pub mod executor;
pub mod message;
pub mod request;
pub mod runner;
pub mod shared_state;

pub use builder::WorkflowBuilder;
pub use config::{ObservabilityConfig, RunnerConfig};
pub use context::WorkflowContext;
pub use edge::{Edge, EdgeCondition};
pub use events::{EventStream, RunStatus, WorkflowEvent, WorkflowRunResult};
pub use executor::Executor;
pub use message::{Envelope, MessageKind, WorkflowMessage};
pub use request::{PendingRequest, RequestPayload};
pub use runner::Workflow;
pub use shared_state::SharedState;
