// SPDX-License-Identifier: MIT

//! Entry and exit executors plus the straight-line actions

use super::{complete, CONTINUATION, END_ID, START_ID};
use crate::adk::error::{BuildError, Result};
use crate::adk::message::{last_message_text, ChatMessage};
use crate::baton::declarative::actions::ActionKind;
use crate::baton::declarative::protocol::{ActionComplete, ActionTrigger};
use crate::baton::declarative::state::DeclarativeWorkflowState;
use crate::baton::workflow::{Executor, MessageKind, WorkflowContext, WorkflowEvent, WorkflowMessage};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Seeds the declarative state from the run input and triggers the first
/// action
pub struct StartExecutor {
    id: String,
}

impl StartExecutor {
    pub fn new() -> Self {
        Self {
            id: START_ID.to_string(),
        }
    }
}

impl Default for StartExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executor for StartExecutor {
    fn id(&self) -> &str {
        &self.id
    }

    fn input_types(&self) -> &[MessageKind] {
        &[MessageKind::Text, MessageKind::Value, MessageKind::Conversation]
    }

    async fn handle(&self, message: WorkflowMessage, ctx: &mut WorkflowContext) -> Result<()> {
        let (inputs, conversation) = match message {
            WorkflowMessage::Text(text) => {
                let message = ChatMessage::user(text.clone());
                (json!({ "input": text }), vec![message])
            }
            WorkflowMessage::Conversation(messages) => {
                let text = last_message_text(&messages);
                (json!({ "input": text }), messages)
            }
            WorkflowMessage::Value(value) => (value, Vec::new()),
            other => {
                log::warn!("Start executor ignoring {} message", other.kind());
                return Ok(());
            }
        };

        let mut state = DeclarativeWorkflowState::with_inputs(inputs);
        let last_text = last_message_text(&conversation);
        state.set("Conversation.messages", serde_json::to_value(&conversation)?)?;
        state.set("System.LastMessage", json!({ "Text": last_text }))?;
        state.set(
            "System.ConversationId",
            json!(uuid::Uuid::new_v4().to_string()),
        )?;
        state.save(ctx.shared_state()).await?;

        log::info!("Declarative workflow started");
        ctx.send_message(
            WorkflowMessage::ActionTrigger(ActionTrigger { value: None }),
            None,
        );
        Ok(())
    }
}

/// Terminal executor; yields `Workflow.Outputs` when anything was written
pub struct EndExecutor {
    id: String,
}

impl EndExecutor {
    pub fn new() -> Self {
        Self {
            id: END_ID.to_string(),
        }
    }
}

impl Default for EndExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executor for EndExecutor {
    fn id(&self) -> &str {
        &self.id
    }

    fn input_types(&self) -> &[MessageKind] {
        CONTINUATION
    }

    async fn handle(&self, _message: WorkflowMessage, ctx: &mut WorkflowContext) -> Result<()> {
        let state = DeclarativeWorkflowState::load(ctx.shared_state()).await?;
        match state.get("Workflow.Outputs") {
            Some(Value::Object(outputs)) if !outputs.is_empty() => {
                ctx.yield_output(Value::Object(outputs));
            }
            _ => log::debug!("Workflow finished without outputs"),
        }
        log::info!("Declarative workflow completed");
        Ok(())
    }
}

/// Re-entry point after branches or loops; forwards control to the successor
pub struct JoinExecutor {
    id: String,
}

impl JoinExecutor {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl Executor for JoinExecutor {
    fn id(&self) -> &str {
        &self.id
    }

    fn input_types(&self) -> &[MessageKind] {
        CONTINUATION
    }

    async fn handle(&self, _message: WorkflowMessage, ctx: &mut WorkflowContext) -> Result<()> {
        complete(ctx);
        Ok(())
    }
}

/// Runs one variable, activity or end action
pub struct BasicActionExecutor {
    id: String,
    kind: ActionKind,
}

impl BasicActionExecutor {
    pub fn new(id: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    fn apply(&self, state: &mut DeclarativeWorkflowState, ctx: &mut WorkflowContext) -> Result<()> {
        match &self.kind {
            ActionKind::SetVariable { variable, value } => {
                let value = state.eval_if_expression(value)?;
                state.set(variable, value)?;
            }
            ActionKind::SetTextVariable { variable, value } => {
                let text = state.interpolate_string(value);
                state.set(variable, Value::String(text))?;
            }
            ActionKind::SetMultipleVariables { assignments } => {
                for (variable, value) in assignments {
                    let value = state.eval_if_expression(value)?;
                    state.set(variable, value)?;
                }
            }
            ActionKind::AppendValue { variable, value } => {
                let value = state.eval_if_expression(value)?;
                state.append(variable, value)?;
            }
            ActionKind::ResetVariable { variable } => state.reset(variable)?,
            ActionKind::ClearAllVariables { namespace } => state.clear(namespace.as_deref())?,
            ActionKind::SendActivity { activity } => {
                let text = match state.eval(&Value::String(activity.clone()))? {
                    Value::String(s) => state.interpolate_string(&s),
                    other => crate::baton::declarative::expression::to_text(&other),
                };
                ctx.yield_output(Value::String(text));
            }
            ActionKind::EmitEvent { name, data } => {
                let data = state.eval_if_expression(data)?;
                ctx.add_event(WorkflowEvent::Custom {
                    executor_id: self.id.clone(),
                    name: name.clone(),
                    data,
                });
            }
            ActionKind::EndWorkflow | ActionKind::EndConversation => {}
            other => {
                return Err(BuildError::InvalidDefinition(format!(
                    "{} is not a straight-line action",
                    other.name()
                ))
                .into())
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Executor for BasicActionExecutor {
    fn id(&self) -> &str {
        &self.id
    }

    fn input_types(&self) -> &[MessageKind] {
        CONTINUATION
    }

    async fn handle(&self, _message: WorkflowMessage, ctx: &mut WorkflowContext) -> Result<()> {
        let mut state = DeclarativeWorkflowState::load(ctx.shared_state()).await?;
        self.apply(&mut state, ctx)?;
        state.save(ctx.shared_state()).await?;
        log::debug!("Action '{}' ({}) done", self.id, self.kind.name());

        match self.kind {
            ActionKind::EndWorkflow | ActionKind::EndConversation => ctx.send_message(
                WorkflowMessage::ActionComplete(ActionComplete::default()),
                Some(END_ID),
            ),
            _ => complete(ctx),
        }
        Ok(())
    }
}
