// SPDX-License-Identifier: MIT

//! External-input requests: what a paused run is waiting for.

use crate::adk::agent::AgentResponse;
use crate::baton::handoff::types::HandoffUserInputRequest;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload of a `request_info` pause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestPayload {
    /// The handoff coordinator waits for the next user turn
    HandoffUserInput(HandoffUserInputRequest),
    /// A declarative action waits for a value from outside
    ExternalInput(ExternalInputRequest),
    /// A reviewer may inspect an agent reply before the conversation continues
    AgentReview(AgentReviewRequest),
}

impl RequestPayload {
    /// Human readable prompt for line-oriented front ends
    pub fn prompt(&self) -> String {
        match self {
            RequestPayload::HandoffUserInput(req) => {
                if req.prompt.is_empty() {
                    format!("{} is waiting for your reply", req.awaiting_agent_id)
                } else {
                    req.prompt.clone()
                }
            }
            RequestPayload::ExternalInput(req) => req
                .prompt
                .clone()
                .unwrap_or_else(|| format!("Input requested by '{}'", req.action_id)),
            RequestPayload::AgentReview(req) => format!(
                "Review reply from '{}' (empty to accept): {}",
                req.agent_id,
                req.response.text()
            ),
        }
    }
}

/// Which declarative action raised an external-input request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalInputKind {
    WaitForInput,
    RequestExternalInput,
    Question,
    /// An agent-in-a-loop waits for the next external message
    AgentLoop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalInputRequest {
    pub action_id: String,
    pub input_kind: ExternalInputKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Variable path the reply is stored at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentReviewRequest {
    pub agent_id: String,
    pub response: AgentResponse,
}

/// A request the runner is holding until `send_responses_streaming`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRequest {
    pub request_id: String,
    pub source_executor_id: String,
    pub request: RequestPayload,
}

/// Delivered to the requesting executor when its request is answered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalResponse {
    pub request_id: String,
    pub request: RequestPayload,
    pub response: Value,
}
