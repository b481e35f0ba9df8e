// SPDX-License-Identifier: MIT

//! The handoff coordinator state machine.
//!
//! One coordinator owns the conversation of a handoff run. On each increment
//! it invokes the current agent, follows any legal handoff immediately,
//! evaluates the termination condition and then either pauses for the user
//! (human-in-loop) or keeps going (autonomous).

use crate::adk::agent::{Agent, AgentResponse};
use crate::adk::error::{InvocationError, Result};
use crate::adk::message::{last_message_text, value_to_text, ChatMessage};
use crate::adk::retry;
use crate::baton::handoff::detection::{detect_handoff, resolve_target};
use crate::baton::handoff::types::{
    ConversationWithUserInput, CoordinatorState, HandoffUserInputRequest, InteractionMode,
    TerminationCondition, MAX_HANDOFF_HOPS,
};
use crate::baton::workflow::events::{AgentRunEvent, WorkflowEvent};
use crate::baton::workflow::request::{AgentReviewRequest, ExternalResponse, RequestPayload};
use crate::baton::workflow::{Executor, MessageKind, WorkflowContext, WorkflowMessage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const COORDINATOR_ID: &str = "handoff_coordinator";
pub const GATEWAY_ID: &str = "user_input_gateway";
/// Shared-state key the coordinator mirrors its conversation into
pub const CONVERSATION_STATE_KEY: &str = "handoff.conversation";

/// Immutable routing configuration of one coordinator
pub struct HandoffConfig {
    pub starting_agent_id: String,
    pub agents: HashMap<String, Arc<dyn Agent>>,
    /// Legal handoff targets per agent id
    pub handoff_graph: HashMap<String, Vec<String>>,
    pub termination: TerminationCondition,
    pub interaction_mode: InteractionMode,
    pub autonomous_turn_limit: usize,
    pub return_to_previous: bool,
    pub request_info: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CoordinatorSnapshot {
    #[serde(default)]
    conversation: Vec<ChatMessage>,
    current_agent_id: String,
    #[serde(default)]
    state: CoordinatorState,
    #[serde(default)]
    autonomous_turns: usize,
}

pub struct HandoffCoordinator {
    id: String,
    config: HandoffConfig,
    inner: Mutex<CoordinatorSnapshot>,
}

impl HandoffCoordinator {
    pub fn new(config: HandoffConfig) -> Self {
        let inner = CoordinatorSnapshot {
            current_agent_id: config.starting_agent_id.clone(),
            ..Default::default()
        };
        Self {
            id: COORDINATOR_ID.to_string(),
            config,
            inner: Mutex::new(inner),
        }
    }

    pub async fn conversation(&self) -> Vec<ChatMessage> {
        self.inner.lock().await.conversation.clone()
    }

    pub async fn current_agent_id(&self) -> String {
        self.inner.lock().await.current_agent_id.clone()
    }

    pub async fn state(&self) -> CoordinatorState {
        self.inner.lock().await.state
    }

    async fn start(&self, conversation: Vec<ChatMessage>, ctx: &mut WorkflowContext) -> Result<()> {
        let mut inner = self.inner.lock().await;
        *inner = CoordinatorSnapshot {
            conversation,
            current_agent_id: self.config.starting_agent_id.clone(),
            state: CoordinatorState::AwaitingAgent,
            autonomous_turns: 0,
        };
        log::info!(
            "Handoff run starting with agent '{}'",
            self.config.starting_agent_id
        );
        self.run_turns(&mut inner, ctx).await
    }

    async fn resume(
        &self,
        update: ConversationWithUserInput,
        ctx: &mut WorkflowContext,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if update.is_post_restore {
            inner.conversation.extend(update.full_conversation);
        } else {
            inner.conversation = update.full_conversation;
        }

        let target = if self.config.return_to_previous {
            inner.current_agent_id.clone()
        } else {
            self.config.starting_agent_id.clone()
        };
        log::info!(
            "User input received ({} messages in conversation), routing to '{}'",
            inner.conversation.len(),
            target
        );
        inner.current_agent_id = target;
        inner.state = CoordinatorState::AwaitingAgent;
        inner.autonomous_turns = 0;
        self.mirror(&inner, ctx).await;
        self.run_turns(&mut inner, ctx).await
    }

    async fn review(&self, response: ExternalResponse, ctx: &mut WorkflowContext) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let feedback = value_to_text(&response.response);
        let feedback = feedback.trim();

        if feedback.is_empty() {
            inner.state = CoordinatorState::AwaitingAgent;
            if self.continue_after_reply(&mut inner, ctx) {
                return self.run_turns(&mut inner, ctx).await;
            }
            return Ok(());
        }

        log::info!(
            "Review feedback for '{}', re-invoking",
            inner.current_agent_id
        );
        inner.conversation.push(ChatMessage::user(feedback));
        self.mirror(&inner, ctx).await;
        self.run_turns(&mut inner, ctx).await
    }

    async fn run_turns(
        &self,
        inner: &mut CoordinatorSnapshot,
        ctx: &mut WorkflowContext,
    ) -> Result<()> {
        let mut hops = 0;
        loop {
            let agent_id = inner.current_agent_id.clone();
            let reply = self.invoke_agent(&agent_id, inner, ctx).await?;

            if let Some(target) = self.legal_handoff(&agent_id, &reply) {
                if hops < MAX_HANDOFF_HOPS {
                    hops += 1;
                    log::info!("Handoff from '{}' to '{}'", agent_id, target);
                    inner.current_agent_id = target;
                    if self.check_termination(inner, ctx).await {
                        return Ok(());
                    }
                    if self.autonomous_limit_reached(inner) {
                        self.finish(inner, ctx);
                        return Ok(());
                    }
                    continue;
                }
                log::warn!(
                    "Handoff limit of {} reached in one turn, ignoring handoff to '{}'",
                    MAX_HANDOFF_HOPS,
                    target
                );
            }

            if self.check_termination(inner, ctx).await {
                return Ok(());
            }

            if self.config.request_info {
                inner.state = CoordinatorState::AwaitingReview;
                ctx.request_info(RequestPayload::AgentReview(AgentReviewRequest {
                    agent_id,
                    response: reply,
                }));
                return Ok(());
            }

            if !self.continue_after_reply(inner, ctx) {
                return Ok(());
            }
        }
    }

    /// Returns `true` when another agent turn should run right away
    fn continue_after_reply(
        &self,
        inner: &mut CoordinatorSnapshot,
        ctx: &mut WorkflowContext,
    ) -> bool {
        match self.config.interaction_mode {
            InteractionMode::HumanInLoop => {
                inner.state = CoordinatorState::AwaitingUserInput;
                let request = HandoffUserInputRequest {
                    conversation: inner.conversation.clone(),
                    awaiting_agent_id: inner.current_agent_id.clone(),
                    prompt: last_message_text(&inner.conversation),
                    source_executor_id: self.id.clone(),
                };
                ctx.send_message(WorkflowMessage::UserInputRequest(request), Some(GATEWAY_ID));
                false
            }
            InteractionMode::Autonomous => {
                if self.autonomous_limit_reached(inner) {
                    log::info!(
                        "Autonomous turn limit of {} reached",
                        self.config.autonomous_turn_limit
                    );
                    self.finish(inner, ctx);
                    false
                } else {
                    true
                }
            }
        }
    }

    fn autonomous_limit_reached(&self, inner: &CoordinatorSnapshot) -> bool {
        self.config.interaction_mode == InteractionMode::Autonomous
            && inner.autonomous_turns >= self.config.autonomous_turn_limit
    }

    async fn invoke_agent(
        &self,
        agent_id: &str,
        inner: &mut CoordinatorSnapshot,
        ctx: &mut WorkflowContext,
    ) -> Result<AgentResponse> {
        let agent = self
            .config
            .agents
            .get(agent_id)
            .ok_or_else(|| InvocationError::agent(agent_id, "not a handoff participant"))?;

        inner.state = CoordinatorState::AwaitingAgent;
        log::debug!(
            "Invoking agent '{}' with {} messages",
            agent_id,
            inner.conversation.len()
        );

        let response = match retry::run_agent(agent.as_ref(), &inner.conversation).await {
            Ok(response) => response,
            Err(e) => {
                ctx.set_state(json!({"error": e.to_string(), "agent": agent_id}));
                return Err(InvocationError::agent(agent_id, e.to_string()).into());
            }
        };

        let tagged: Vec<ChatMessage> = response
            .messages
            .into_iter()
            .map(|mut m| {
                if m.author_name.is_none() {
                    m.author_name = Some(agent_id.to_string());
                }
                m
            })
            .collect();
        inner.conversation.extend(tagged.iter().cloned());
        if self.config.interaction_mode == InteractionMode::Autonomous {
            inner.autonomous_turns += 1;
        }

        let reply = AgentResponse::new(tagged);
        ctx.add_event(WorkflowEvent::AgentRun(AgentRunEvent {
            executor_id: self.id.clone(),
            agent_id: agent_id.to_string(),
            response: reply.clone(),
        }));
        self.mirror(inner, ctx).await;
        Ok(reply)
    }

    fn legal_handoff(&self, agent_id: &str, reply: &AgentResponse) -> Option<String> {
        let signal = detect_handoff(&reply.messages)?;
        let allowed = self
            .config
            .handoff_graph
            .get(agent_id)
            .map(|targets| targets.iter().map(String::as_str).collect::<Vec<_>>())
            .unwrap_or_default();

        let resolved = resolve_target(signal.target(), allowed);
        if resolved.is_none() {
            log::warn!(
                "Agent '{}' requested handoff to '{}', which is not a legal successor",
                agent_id,
                signal.target()
            );
        }
        resolved
    }

    async fn check_termination(
        &self,
        inner: &mut CoordinatorSnapshot,
        ctx: &mut WorkflowContext,
    ) -> bool {
        if self.config.termination.evaluate(&inner.conversation).await {
            log::info!("Termination condition met");
            self.finish(inner, ctx);
            true
        } else {
            false
        }
    }

    fn finish(&self, inner: &mut CoordinatorSnapshot, ctx: &mut WorkflowContext) {
        inner.state = CoordinatorState::Terminated;
        match serde_json::to_value(&inner.conversation) {
            Ok(conversation) => ctx.yield_output(conversation),
            Err(e) => log::error!("Failed to serialize conversation: {}", e),
        }
    }

    async fn mirror(&self, inner: &CoordinatorSnapshot, ctx: &WorkflowContext) {
        if let Ok(value) = serde_json::to_value(&inner.conversation) {
            ctx.set_shared_state(CONVERSATION_STATE_KEY, value).await;
        }
    }
}

#[async_trait]
impl Executor for HandoffCoordinator {
    fn id(&self) -> &str {
        &self.id
    }

    fn input_types(&self) -> &[MessageKind] {
        &[
            MessageKind::Text,
            MessageKind::Conversation,
            MessageKind::ConversationWithUserInput,
            MessageKind::Response,
        ]
    }

    async fn handle(&self, message: WorkflowMessage, ctx: &mut WorkflowContext) -> Result<()> {
        match message {
            WorkflowMessage::Text(text) => self.start(vec![ChatMessage::user(text)], ctx).await,
            WorkflowMessage::Conversation(conversation) => self.start(conversation, ctx).await,
            WorkflowMessage::ConversationWithUserInput(update) => self.resume(update, ctx).await,
            WorkflowMessage::Response(response) => match &response.request {
                RequestPayload::AgentReview(_) => self.review(response, ctx).await,
                other => {
                    log::warn!("Coordinator ignoring response to {:?}", other);
                    Ok(())
                }
            },
            other => {
                log::warn!("Coordinator ignoring {} message", other.kind());
                Ok(())
            }
        }
    }

    async fn on_checkpoint_save(&self) -> Option<Value> {
        let inner = self.inner.lock().await;
        serde_json::to_value(&*inner)
            .ok()
            .map(|metadata| json!({ "metadata": metadata }))
    }

    async fn on_checkpoint_restore(&self, state: Value) -> Result<()> {
        let metadata = state.get("metadata").cloned().unwrap_or(state);
        let restored: CoordinatorSnapshot = serde_json::from_value(metadata)?;
        log::info!(
            "Coordinator restored: {} messages, current agent '{}'",
            restored.conversation.len(),
            restored.current_agent_id
        );
        *self.inner.lock().await = restored;
        Ok(())
    }
}
