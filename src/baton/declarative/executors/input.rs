// SPDX-License-Identifier: MIT

//! WaitForInput, RequestExternalInput and Question.
//!
//! The action pauses the run with an external-input request; the reply is
//! stored at the action's variable and appended to the conversation as user
//! input before control moves on.

use super::{complete, CONTINUATION_OR_RESPONSE};
use crate::adk::error::Result;
use crate::adk::message::{messages_from_value, value_to_text};
use crate::baton::declarative::actions::InputAction;
use crate::baton::declarative::state::DeclarativeWorkflowState;
use crate::baton::workflow::request::{ExternalInputKind, ExternalInputRequest, ExternalResponse};
use crate::baton::workflow::{
    Executor, MessageKind, RequestPayload, WorkflowContext, WorkflowMessage,
};
use async_trait::async_trait;
use serde_json::json;

pub struct ExternalInputExecutor {
    id: String,
    kind: ExternalInputKind,
    input: InputAction,
}

impl ExternalInputExecutor {
    pub fn new(id: impl Into<String>, kind: ExternalInputKind, input: InputAction) -> Self {
        Self {
            id: id.into(),
            kind,
            input,
        }
    }

    fn ask(&self, state: &DeclarativeWorkflowState, ctx: &mut WorkflowContext) {
        let prompt = self
            .input
            .prompt
            .as_deref()
            .map(|p| state.interpolate_string(p));
        ctx.request_info(RequestPayload::ExternalInput(ExternalInputRequest {
            action_id: self.id.clone(),
            input_kind: self.kind,
            prompt,
            variable: self.input.variable.clone(),
            choices: self.input.choices.clone(),
        }));
    }

    fn accepts_answer(&self, answer: &str) -> bool {
        match &self.input.choices {
            Some(choices) if !choices.is_empty() => choices
                .iter()
                .any(|c| c.trim().eq_ignore_ascii_case(answer.trim())),
            _ => true,
        }
    }

    async fn receive(&self, response: ExternalResponse, ctx: &mut WorkflowContext) -> Result<()> {
        let mut state = DeclarativeWorkflowState::load(ctx.shared_state()).await?;
        let text = value_to_text(&response.response);

        if !self.accepts_answer(&text) {
            log::warn!(
                "Answer '{}' to '{}' is not one of the offered choices, asking again",
                text,
                self.id
            );
            self.ask(&state, ctx);
            return Ok(());
        }

        if let Some(variable) = &self.input.variable {
            state.set(variable, response.response.clone())?;
        }
        for message in messages_from_value(&response.response) {
            state.append("Conversation.messages", serde_json::to_value(&message)?)?;
        }
        state.set("System.LastMessage", json!({ "Text": text }))?;
        state.save(ctx.shared_state()).await?;

        log::debug!("Action '{}' received external input", self.id);
        complete(ctx);
        Ok(())
    }
}

#[async_trait]
impl Executor for ExternalInputExecutor {
    fn id(&self) -> &str {
        &self.id
    }

    fn input_types(&self) -> &[MessageKind] {
        CONTINUATION_OR_RESPONSE
    }

    async fn handle(&self, message: WorkflowMessage, ctx: &mut WorkflowContext) -> Result<()> {
        match message {
            WorkflowMessage::Response(response) => self.receive(response, ctx).await,
            _ => {
                let state = DeclarativeWorkflowState::load(ctx.shared_state()).await?;
                self.ask(&state, ctx);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{context, state};
    use super::*;
    use crate::baton::declarative::protocol::ActionTrigger;
    use crate::baton::workflow::SharedState;
    use serde_json::Value;

    fn question() -> ExternalInputExecutor {
        ExternalInputExecutor::new(
            "pick",
            ExternalInputKind::Question,
            InputAction {
                prompt: Some("Red or blue, {Local.name}?".into()),
                variable: Some("Local.color".into()),
                choices: Some(vec!["red".into(), "blue".into()]),
            },
        )
    }

    async fn ask(shared: &SharedState) -> (String, RequestPayload) {
        let mut ctx = context("pick", shared);
        question()
            .handle(
                WorkflowMessage::ActionTrigger(ActionTrigger::default()),
                &mut ctx,
            )
            .await
            .unwrap();
        let effects = ctx.into_effects();
        assert!(effects.messages.is_empty());
        let pending = effects.requests[0].clone();
        (pending.request_id, pending.request)
    }

    async fn answer(shared: &SharedState, value: Value) -> crate::baton::workflow::context::ContextEffects {
        let (request_id, request) = ask(shared).await;
        let mut ctx = context("pick", shared);
        question()
            .handle(
                WorkflowMessage::Response(ExternalResponse {
                    request_id,
                    request,
                    response: value,
                }),
                &mut ctx,
            )
            .await
            .unwrap();
        ctx.into_effects()
    }

    #[tokio::test]
    async fn test_prompt_is_interpolated() {
        let shared = SharedState::new();
        let mut seed = DeclarativeWorkflowState::new();
        seed.set("Local.name", json!("Ada")).unwrap();
        seed.save(&shared).await.unwrap();

        let (_, request) = ask(&shared).await;
        assert_eq!(request.prompt(), "Red or blue, Ada?");
    }

    #[tokio::test]
    async fn test_answer_is_stored_and_appended() {
        let shared = SharedState::new();
        let effects = answer(&shared, json!("Blue")).await;

        assert!(matches!(
            effects.messages[0].data,
            WorkflowMessage::ActionComplete(_)
        ));
        let state = state(&shared).await;
        assert_eq!(state.get("Local.color"), Some(json!("Blue")));
        assert_eq!(state.get("System.LastMessage.Text"), Some(json!("Blue")));
        assert_eq!(
            state.get("Conversation.messages.0.role"),
            Some(json!("user"))
        );
    }

    #[tokio::test]
    async fn test_answer_outside_choices_asks_again() {
        let shared = SharedState::new();
        let effects = answer(&shared, json!("green")).await;
        assert!(effects.messages.is_empty());
        assert_eq!(effects.requests.len(), 1);
        assert_eq!(state(&shared).await.get("Local.color"), None);
    }
}
