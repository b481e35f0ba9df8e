// SPDX-License-Identifier: MIT

//! `InvokeAzureAgent`: runs an agent over the conversation, stores its reply
//! and optionally keeps it in a loop with external input.

use super::{complete, CONTINUATION_OR_RESPONSE, EXTERNAL_LOOP_KEY};
use crate::adk::agent::{Agent, AgentResponse};
use crate::adk::error::{BatonError, InvocationError, Result};
use crate::adk::message::{messages_from_value, value_to_text, ChatMessage};
use crate::adk::retry;
use crate::baton::declarative::actions::InvokeAgentAction;
use crate::baton::declarative::state::DeclarativeWorkflowState;
use crate::baton::workflow::events::AgentRunEvent;
use crate::baton::workflow::request::{ExternalInputKind, ExternalInputRequest, ExternalResponse};
use crate::baton::workflow::{
    Executor, MessageKind, RequestPayload, WorkflowContext, WorkflowEvent, WorkflowMessage,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Conversation variable agents read from and append to
const MESSAGES_PATH: &str = "Conversation.messages";

/// Persisted while an agent-in-a-loop waits for the next external message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalLoopState {
    pub agent_name: String,
    pub iteration: usize,
    pub external_loop_when: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages_var: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_obj_var: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_property: Option<String>,
    pub auto_send: bool,
    pub messages_path: String,
    /// Messages resolved from `input_messages` for the first turn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_messages: Vec<ChatMessage>,
    /// Length of the conversation before the first turn
    #[serde(default)]
    pub history_start: usize,
}

/// What the first turn was given, replayed ahead of later loop turns
#[derive(Debug, Clone, Default)]
struct TurnInput {
    input_messages: Vec<ChatMessage>,
    history_start: usize,
}

pub struct InvokeAgentExecutor {
    id: String,
    action: InvokeAgentAction,
    agent: Arc<dyn Agent>,
}

impl InvokeAgentExecutor {
    pub fn new(id: impl Into<String>, action: InvokeAgentAction, agent: Arc<dyn Agent>) -> Self {
        Self {
            id: id.into(),
            action,
            agent,
        }
    }

    fn loop_key(&self) -> String {
        format!("{}.{}", EXTERNAL_LOOP_KEY, self.id)
    }

    async fn run_turn(
        &self,
        ctx: &mut WorkflowContext,
        state: &mut DeclarativeWorkflowState,
        conversation: Vec<ChatMessage>,
        iteration: usize,
        input: TurnInput,
    ) -> Result<()> {
        log::debug!(
            "Action '{}' invoking agent '{}' (iteration {}) with {} messages",
            self.id,
            self.action.agent,
            iteration,
            conversation.len()
        );
        let response = match retry::run_agent(self.agent.as_ref(), &conversation).await {
            Ok(response) => response,
            Err(e) => return Err(self.fail(ctx, state, e.to_string()).await),
        };

        let reply: Vec<ChatMessage> = response
            .messages
            .into_iter()
            .map(|m| match m.author_name {
                Some(_) => m,
                None => m.with_author(self.action.agent.clone()),
            })
            .collect();
        for message in &reply {
            state.append(MESSAGES_PATH, serde_json::to_value(message)?)?;
        }
        let reply = AgentResponse::new(reply);
        let text = reply.text();
        self.store_outputs(state, &reply, &text)?;
        state.set(
            "Agent.LastResponse",
            json!({ "Name": self.action.agent, "Text": text }),
        )?;

        ctx.add_event(WorkflowEvent::AgentRun(AgentRunEvent {
            executor_id: self.id.clone(),
            agent_id: self.action.agent.clone(),
            response: reply,
        }));
        if self.action.auto_send && !text.is_empty() {
            ctx.yield_output(Value::String(text.clone()));
        }

        if let Some(when) = &self.action.external_loop_when {
            if state.eval_condition(when)? {
                let loop_state = ExternalLoopState {
                    agent_name: self.action.agent.clone(),
                    iteration,
                    external_loop_when: when.clone(),
                    messages_var: self.action.messages_var.clone(),
                    response_obj_var: self.action.response_obj_var.clone(),
                    result_property: self.action.result_property.clone(),
                    auto_send: self.action.auto_send,
                    messages_path: MESSAGES_PATH.to_string(),
                    input_messages: input.input_messages,
                    history_start: input.history_start,
                };
                state.save(ctx.shared_state()).await?;
                ctx.set_shared_state(self.loop_key(), serde_json::to_value(&loop_state)?)
                    .await;
                ctx.request_info(RequestPayload::ExternalInput(ExternalInputRequest {
                    action_id: self.id.clone(),
                    input_kind: ExternalInputKind::AgentLoop,
                    prompt: Some(text),
                    variable: None,
                    choices: None,
                }));
                return Ok(());
            }
        }

        ctx.delete_shared_state(&self.loop_key()).await;
        state.save(ctx.shared_state()).await?;
        complete(ctx);
        Ok(())
    }

    fn store_outputs(
        &self,
        state: &mut DeclarativeWorkflowState,
        reply: &AgentResponse,
        text: &str,
    ) -> Result<()> {
        if let Some(var) = &self.action.messages_var {
            state.set(var, serde_json::to_value(&reply.messages)?)?;
        }
        if let Some(var) = &self.action.response_obj_var {
            let parsed = serde_json::from_str::<Value>(text)
                .unwrap_or_else(|_| Value::String(text.to_string()));
            state.set(var, parsed)?;
        }
        if let Some(var) = &self.action.result_property {
            state.set(var, Value::String(text.to_string()))?;
        }
        Ok(())
    }

    /// Record the failure in the result slot and the executor state
    async fn fail(
        &self,
        ctx: &mut WorkflowContext,
        state: &mut DeclarativeWorkflowState,
        message: String,
    ) -> BatonError {
        log::error!(
            "Agent '{}' failed in action '{}': {}",
            self.action.agent,
            self.id,
            message
        );
        if let Some(slot) = self.action.result_slot() {
            if let Err(e) = state.set(slot, json!({ "error": message })) {
                log::warn!("Could not record agent error at '{}': {}", slot, e);
            }
        }
        if let Err(e) = state.save(ctx.shared_state()).await {
            log::warn!("Could not save state after agent error: {}", e);
        }
        ctx.set_state(json!({ "error": message, "agent": self.action.agent }));
        InvocationError::agent(&self.action.agent, message).into()
    }

    async fn resume_loop(&self, response: ExternalResponse, ctx: &mut WorkflowContext) -> Result<()> {
        let loop_state = match ctx.get_shared_state(&self.loop_key()).await {
            Some(value) => serde_json::from_value::<ExternalLoopState>(value)?,
            None => {
                log::warn!(
                    "Action '{}' got a reply without a waiting agent loop",
                    self.id
                );
                complete(ctx);
                return Ok(());
            }
        };

        let mut state = DeclarativeWorkflowState::load(ctx.shared_state()).await?;
        for message in messages_from_value(&response.response) {
            state.append(&loop_state.messages_path, serde_json::to_value(&message)?)?;
        }
        state.set(
            "System.LastMessage",
            json!({ "Text": value_to_text(&response.response) }),
        )?;
        let history =
            messages_from_value(&state.get(&loop_state.messages_path).unwrap_or(Value::Null));
        let start = loop_state.history_start.min(history.len());
        let mut conversation = loop_state.input_messages.clone();
        conversation.extend(history.into_iter().skip(start));

        let input = TurnInput {
            input_messages: loop_state.input_messages,
            history_start: loop_state.history_start,
        };
        self.run_turn(ctx, &mut state, conversation, loop_state.iteration + 1, input)
            .await
    }
}

#[async_trait]
impl Executor for InvokeAgentExecutor {
    fn id(&self) -> &str {
        &self.id
    }

    fn input_types(&self) -> &[MessageKind] {
        CONTINUATION_OR_RESPONSE
    }

    async fn handle(&self, message: WorkflowMessage, ctx: &mut WorkflowContext) -> Result<()> {
        if let WorkflowMessage::Response(response) = message {
            return self.resume_loop(response, ctx).await;
        }

        let mut state = DeclarativeWorkflowState::load(ctx.shared_state()).await?;
        let history = messages_from_value(&state.get(MESSAGES_PATH).unwrap_or(Value::Null));
        let (conversation, input) = match &self.action.input_messages {
            Some(expr) => {
                let messages = messages_from_value(&state.eval_if_expression(expr)?);
                let input = TurnInput {
                    input_messages: messages.clone(),
                    history_start: history.len(),
                };
                (messages, input)
            }
            None => (history, TurnInput::default()),
        };
        self.run_turn(ctx, &mut state, conversation, 0, input).await
    }
}
