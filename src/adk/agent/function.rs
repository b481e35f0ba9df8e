// SPDX-License-Identifier: MIT

use super::{Agent, AgentResponse};
use crate::adk::error::CallError;
use crate::adk::message::ChatMessage;
use async_trait::async_trait;
use std::sync::Arc;

type ReplyFn = dyn Fn(&[ChatMessage]) -> Result<AgentResponse, CallError> + Send + Sync;

/// Agent whose reply is computed by a synchronous closure.
///
/// Useful for deterministic participants (routers, echo agents) and in tests.
#[derive(Clone)]
pub struct FunctionAgent {
    name: String,
    description: String,
    reply: Arc<ReplyFn>,
}

impl FunctionAgent {
    pub fn new<F>(name: impl Into<String>, reply: F) -> Self
    where
        F: Fn(&[ChatMessage]) -> Result<AgentResponse, CallError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: String::new(),
            reply: Arc::new(reply),
        }
    }

    /// Agent that answers with the text of the last message
    pub fn echo(name: impl Into<String>) -> Self {
        Self::new(name, |messages| {
            Ok(AgentResponse::text_reply(
                crate::adk::message::last_message_text(messages),
            ))
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[async_trait]
impl Agent for FunctionAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn run(&self, messages: &[ChatMessage]) -> Result<AgentResponse, CallError> {
        (self.reply)(messages)
    }
}
