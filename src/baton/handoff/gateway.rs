// SPDX-License-Identifier: MIT

//! Bridge between the coordinator and the outside world.
//!
//! The coordinator sends a [`HandoffUserInputRequest`]; the gateway turns it
//! into a paused request. When the reply arrives it rebuilds the
//! conversation and hands it back to the requesting executor.

use crate::adk::error::Result;
use crate::adk::message::{messages_from_value, ChatMessage};
use crate::baton::handoff::coordinator::GATEWAY_ID;
use crate::baton::handoff::types::{ConversationWithUserInput, HandoffUserInputRequest};
use crate::baton::workflow::request::RequestPayload;
use crate::baton::workflow::{Executor, MessageKind, WorkflowContext, WorkflowMessage};
use async_trait::async_trait;
use serde_json::Value;

pub struct UserInputGateway {
    id: String,
}

impl UserInputGateway {
    pub fn new() -> Self {
        Self {
            id: GATEWAY_ID.to_string(),
        }
    }
}

impl Default for UserInputGateway {
    fn default() -> Self {
        Self::new()
    }
}

/// Merge a user reply into the conversation carried by the original request.
///
/// A request decoded from a checkpoint has an empty conversation; the
/// coordinator still holds the full history, so only the new messages are
/// sent and flagged for appending.
pub fn resume_from_user(
    original: &HandoffUserInputRequest,
    reply: &Value,
) -> ConversationWithUserInput {
    let new_messages: Vec<ChatMessage> = messages_from_value(reply);
    if original.conversation.is_empty() {
        ConversationWithUserInput {
            full_conversation: new_messages,
            is_post_restore: true,
        }
    } else {
        let mut full_conversation = original.conversation.clone();
        full_conversation.extend(new_messages);
        ConversationWithUserInput {
            full_conversation,
            is_post_restore: false,
        }
    }
}

#[async_trait]
impl Executor for UserInputGateway {
    fn id(&self) -> &str {
        &self.id
    }

    fn input_types(&self) -> &[MessageKind] {
        &[MessageKind::UserInputRequest, MessageKind::Response]
    }

    async fn handle(&self, message: WorkflowMessage, ctx: &mut WorkflowContext) -> Result<()> {
        match message {
            WorkflowMessage::UserInputRequest(request) => {
                log::debug!(
                    "Gateway pausing for user input on behalf of '{}'",
                    request.awaiting_agent_id
                );
                ctx.request_info(RequestPayload::HandoffUserInput(request));
            }
            WorkflowMessage::Response(response) => match response.request {
                RequestPayload::HandoffUserInput(original) => {
                    let update = resume_from_user(&original, &response.response);
                    ctx.send_message(
                        WorkflowMessage::ConversationWithUserInput(update),
                        Some(&original.source_executor_id),
                    );
                }
                other => log::warn!("Gateway ignoring response to {:?}", other),
            },
            other => log::warn!("Gateway ignoring {} message", other.kind()),
        }
        Ok(())
    }
}
