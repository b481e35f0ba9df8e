// SPDX-License-Identifier: MIT

//! Payloads moved between executors and the envelope that carries them.

use crate::adk::message::ChatMessage;
use crate::baton::declarative::protocol::{
    ActionComplete, ActionTrigger, ConditionResult, LoopControl, LoopIterationResult,
};
use crate::baton::handoff::types::{ConversationWithUserInput, HandoffUserInputRequest};
use crate::baton::workflow::request::ExternalResponse;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Every payload the runner can deliver.
///
/// Executors declare which [`MessageKind`]s they handle; the runner only
/// delivers matching messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum WorkflowMessage {
    Text(String),
    Value(Value),
    Conversation(Vec<ChatMessage>),
    ConversationWithUserInput(ConversationWithUserInput),
    UserInputRequest(HandoffUserInputRequest),
    ActionTrigger(ActionTrigger),
    ActionComplete(ActionComplete),
    ConditionResult(ConditionResult),
    LoopIterationResult(LoopIterationResult),
    LoopControl(LoopControl),
    /// Reply to a request raised with `request_info`
    Response(ExternalResponse),
    /// Aggregate delivered by a fan-in edge once every source reported
    Batch(Vec<BatchItem>),
}

/// One source's contribution to a fan-in batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    pub source_id: String,
    pub data: WorkflowMessage,
}

/// Discriminant of [`WorkflowMessage`], used for handler bindings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Value,
    Conversation,
    ConversationWithUserInput,
    UserInputRequest,
    ActionTrigger,
    ActionComplete,
    ConditionResult,
    LoopIterationResult,
    LoopControl,
    Response,
    Batch,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MessageKind::Text => "Text",
            MessageKind::Value => "Value",
            MessageKind::Conversation => "Conversation",
            MessageKind::ConversationWithUserInput => "ConversationWithUserInput",
            MessageKind::UserInputRequest => "UserInputRequest",
            MessageKind::ActionTrigger => "ActionTrigger",
            MessageKind::ActionComplete => "ActionComplete",
            MessageKind::ConditionResult => "ConditionResult",
            MessageKind::LoopIterationResult => "LoopIterationResult",
            MessageKind::LoopControl => "LoopControl",
            MessageKind::Response => "Response",
            MessageKind::Batch => "Batch",
        };
        write!(f, "{}", name)
    }
}

impl WorkflowMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            WorkflowMessage::Text(_) => MessageKind::Text,
            WorkflowMessage::Value(_) => MessageKind::Value,
            WorkflowMessage::Conversation(_) => MessageKind::Conversation,
            WorkflowMessage::ConversationWithUserInput(_) => {
                MessageKind::ConversationWithUserInput
            }
            WorkflowMessage::UserInputRequest(_) => MessageKind::UserInputRequest,
            WorkflowMessage::ActionTrigger(_) => MessageKind::ActionTrigger,
            WorkflowMessage::ActionComplete(_) => MessageKind::ActionComplete,
            WorkflowMessage::ConditionResult(_) => MessageKind::ConditionResult,
            WorkflowMessage::LoopIterationResult(_) => MessageKind::LoopIterationResult,
            WorkflowMessage::LoopControl(_) => MessageKind::LoopControl,
            WorkflowMessage::Response(_) => MessageKind::Response,
            WorkflowMessage::Batch(_) => MessageKind::Batch,
        }
    }
}

impl From<&str> for WorkflowMessage {
    fn from(s: &str) -> Self {
        WorkflowMessage::Text(s.to_string())
    }
}

impl From<String> for WorkflowMessage {
    fn from(s: String) -> Self {
        WorkflowMessage::Text(s)
    }
}

impl From<Vec<ChatMessage>> for WorkflowMessage {
    fn from(messages: Vec<ChatMessage>) -> Self {
        WorkflowMessage::Conversation(messages)
    }
}

/// Trace identifiers propagated from a delivered envelope to everything its
/// handler emits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
}

impl TraceContext {
    pub fn new_root() -> Self {
        Self {
            trace_id: uuid::Uuid::new_v4().to_string(),
            span_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Same trace, fresh span
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            span_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

/// Immutable unit queued for delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub data: WorkflowMessage,
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_context: Option<TraceContext>,
}

impl Envelope {
    pub fn new(data: WorkflowMessage, source_id: impl Into<String>) -> Self {
        Self {
            data,
            source_id: source_id.into(),
            target_id: None,
            trace_context: None,
        }
    }

    pub fn to(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    pub fn with_trace(mut self, trace: Option<TraceContext>) -> Self {
        self.trace_context = trace;
        self
    }
}
