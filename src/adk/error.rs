// SPDX-License-Identifier: MIT

//! Typed error handling for baton-rs
//!
//! Every failure the engine can produce is one of the enums below, and all of
//! them fold into [`BatonError`] through `#[from]` conversions so callers can
//! use `?` across layers.

use thiserror::Error;

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, BatonError>;

/// Top-level error type for baton-rs
#[derive(Debug, Error)]
pub enum BatonError {
    /// Workflow graph or action definitions are invalid
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    /// A builder method received an invalid value
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// An agent or tool failed during execution
    #[error(transparent)]
    Invocation(#[from] InvocationError),

    /// Declarative state store rejected an operation
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Expression parsing or evaluation failed
    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),

    /// Runner-level failures (routing, limits, unknown requests)
    #[error("Runner error: {0}")]
    Runner(#[from] RunnerError),

    /// Checkpoint persistence failures
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error wrapper
    #[error("{0}")]
    Other(String),
}

/// Errors raised synchronously from `build()`
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BuildError {
    #[error("Duplicate action id '{0}'")]
    DuplicateActionId(String),

    #[error("Action '{action_id}' is missing required field '{field}'")]
    MissingField { action_id: String, field: String },

    #[error("Action '{action_id}' has unknown kind '{kind}'")]
    UnknownActionKind { action_id: String, kind: String },

    #[error("Goto action '{0}' targets itself")]
    SelfReferencingGoto(String),

    #[error("Goto action '{action_id}' targets undeclared action '{target}'")]
    DanglingGoto { action_id: String, target: String },

    #[error("Action '{0}' is only valid inside a Foreach body")]
    LoopControlOutsideLoop(String),

    #[error("Action '{action_id}' references unknown agent '{agent}'")]
    UnknownAgent { action_id: String, agent: String },

    #[error("Action '{action_id}' references unknown tool '{tool}'")]
    UnknownTool { action_id: String, tool: String },

    #[error("Invalid workflow definition: {0}")]
    InvalidDefinition(String),

    #[error("Cannot mix participant instances with participant factories")]
    MixedParticipants,

    #[error("Participant factory map is empty")]
    EmptyParticipantFactories,

    #[error("No participants configured")]
    NoParticipants,

    #[error("Coordinator '{0}' is not a registered participant")]
    UnknownCoordinator(String),

    #[error("Handoff references unknown participant '{0}'")]
    UnknownParticipant(String),

    #[error("Duplicate participant '{0}'")]
    DuplicateParticipant(String),

    #[error("Duplicate executor id '{0}'")]
    DuplicateExecutor(String),

    #[error("Edge references unknown executor '{0}'")]
    UnknownExecutor(String),

    #[error("No start executor configured")]
    MissingStartExecutor,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors raised immediately by the builder method that received a bad value
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Autonomous turn limit must be a positive integer, got {0}")]
    InvalidTurnLimit(i64),

    #[error("Return-to-previous requires handoff edges between at least two participants")]
    ReturnToPreviousWithoutHandoffs,

    #[error("Unknown interaction mode '{0}'")]
    UnknownInteractionMode(String),
}

/// What kind of external capability failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationTarget {
    Agent,
    Tool,
}

impl std::fmt::Display for InvocationTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvocationTarget::Agent => write!(f, "Agent"),
            InvocationTarget::Tool => write!(f, "Tool"),
        }
    }
}

/// An agent or tool call failed while the workflow was running
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{target} '{name}' failed: {message}")]
pub struct InvocationError {
    pub target: InvocationTarget,
    pub name: String,
    pub message: String,
}

impl InvocationError {
    pub fn agent(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            target: InvocationTarget::Agent,
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn tool(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            target: InvocationTarget::Tool,
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Error returned by an [`Agent`](crate::adk::agent::Agent) or
/// [`Tool`](crate::adk::tool::Tool) call
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CallError {
    /// The underlying transport dropped; the call may be retried after reconnecting
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// A domain failure that must not be retried
    #[error("{0}")]
    Failed(String),
}

impl CallError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn connection_lost(message: impl Into<String>) -> Self {
        Self::ConnectionLost(message.into())
    }

    pub fn is_connection_lost(&self) -> bool {
        matches!(self, CallError::ConnectionLost(_))
    }
}

impl From<&str> for CallError {
    fn from(s: &str) -> Self {
        Self::Failed(s.to_string())
    }
}

impl From<String> for CallError {
    fn from(s: String) -> Self {
        Self::Failed(s)
    }
}

/// Declarative state store validation errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StateError {
    #[error("Cannot modify Workflow.Inputs: '{0}' is read-only")]
    ReadOnlyInputs(String),

    #[error("Cannot set Workflow directly; write to Workflow.Outputs instead")]
    WorkflowRoot,

    #[error("Unknown Workflow namespace '{0}'; only Inputs and Outputs exist")]
    UnknownWorkflowNamespace(String),

    #[error("Cannot replace entire namespace '{0}'")]
    ReplaceNamespace(String),

    #[error("Value at '{0}' is not a list")]
    NotAList(String),

    #[error("Empty variable path")]
    EmptyPath,
}

/// Expression language failures
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("Parse error at position {position}: {message}")]
    Parse { position: usize, message: String },

    #[error("Evaluation error: {0}")]
    Eval(String),

    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    #[error("Function '{name}' expects {expected} argument(s), got {actual}")]
    Arity {
        name: String,
        expected: String,
        actual: usize,
    },

    #[error("Division by zero")]
    DivisionByZero,
}

impl ExpressionError {
    pub fn parse(position: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            position,
            message: message.into(),
        }
    }

    pub fn eval(message: impl Into<String>) -> Self {
        Self::Eval(message.into())
    }
}

/// Failures in the superstep runner
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RunnerError {
    #[error("Workflow context requires at least one source executor")]
    NoSources,

    #[error("Unknown executor '{0}'")]
    UnknownExecutor(String),

    #[error("No edge from '{source_id}' to '{target_id}'")]
    NoEdge { source_id: String, target_id: String },

    #[error("Executor '{executor_id}' has no handler for {kind} messages")]
    UnsupportedMessage { executor_id: String, kind: String },

    #[error("Workflow exceeded {0} supersteps")]
    MaxSupersteps(usize),

    #[error("Unknown request id '{0}'")]
    UnknownRequest(String),

    #[error("No checkpoint store configured")]
    NoCheckpointStore,

    #[error("Run task failed: {0}")]
    TaskFailed(String),
}

/// Checkpoint persistence failures
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CheckpointError {
    #[error("Checkpoint '{0}' not found")]
    NotFound(String),

    #[error("Checkpoint storage failed: {0}")]
    Storage(String),

    #[error("Checkpoint value could not be decoded: {0}")]
    Decode(String),
}

impl BatonError {
    /// Create from a generic message
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

impl From<&str> for BatonError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for BatonError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_error_names_target() {
        let err = InvocationError::agent("triage", "boom");
        assert_eq!(err.to_string(), "Agent 'triage' failed: boom");

        let err = InvocationError::tool("search", "timeout");
        assert_eq!(err.to_string(), "Tool 'search' failed: timeout");
    }

    #[test]
    fn test_call_error_connection_lost() {
        assert!(CallError::connection_lost("socket closed").is_connection_lost());
        assert!(!CallError::from("bad input").is_connection_lost());
    }

    #[test]
    fn test_state_errors_carry_expected_text() {
        let err = StateError::ReadOnlyInputs("Workflow.Inputs.q".into());
        assert!(err.to_string().contains("Cannot modify Workflow.Inputs"));

        let err = StateError::ReplaceNamespace("turn".into());
        assert!(err.to_string().contains("Cannot replace entire namespace"));
    }

    #[test]
    fn test_sub_errors_convert_into_baton_error() {
        let err: BatonError = BuildError::MissingStartExecutor.into();
        assert!(matches!(err, BatonError::Build(_)));

        let err: BatonError = ConfigError::InvalidTurnLimit(0).into();
        assert!(err.to_string().contains("positive integer"));

        let err: BatonError = "plain".into();
        assert!(matches!(err, BatonError::Other(_)));
    }
}
