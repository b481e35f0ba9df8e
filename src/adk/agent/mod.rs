// SPDX-License-Identifier: MIT

//! Agent module - the agent capability consumed by the engine
//!
//! The engine never knows how an agent produces its reply. It hands over a
//! conversation and receives the new messages the agent appended:
//! - [`Agent`] - the provider-agnostic trait
//! - [`FunctionAgent`] - an agent backed by a closure
//! - [`MiddlewareAgent`] - an agent wrapped in an ordered middleware chain

mod function;
mod middleware;

pub use function::FunctionAgent;
pub use middleware::{AgentMiddleware, LoggingMiddleware, MiddlewareAgent, Next};

use crate::adk::error::CallError;
use crate::adk::message::{ChatMessage, Content};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AgentEvent {
    Thought(String),
    ToolCall {
        name: String,
        args: serde_json::Value,
    },
    ToolResult {
        name: String,
        result: serde_json::Value,
    },
    Answer(String),
    Error(String),
    Log(String),
}

/// Messages produced by one agent run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub messages: Vec<ChatMessage>,
}

impl AgentResponse {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self { messages }
    }

    /// A single assistant message with the given text
    pub fn text_reply(text: impl Into<String>) -> Self {
        Self::new(vec![ChatMessage::assistant(text)])
    }

    /// Concatenated text of every message
    pub fn text(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.text_content())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Core agent trait for all agent types
#[async_trait]
pub trait Agent: Send + Sync {
    /// Returns the agent name
    fn name(&self) -> &str;

    /// Human readable description, used for handoff tool descriptions
    fn description(&self) -> &str {
        ""
    }

    /// Run the agent over the full conversation
    async fn run(&self, messages: &[ChatMessage]) -> Result<AgentResponse, CallError>;

    /// Run the agent with streaming events
    async fn run_stream(
        &self,
        messages: &[ChatMessage],
        tx: mpsc::Sender<AgentEvent>,
    ) -> Result<AgentResponse, CallError> {
        // Default implementation falls back to run()
        match self.run(messages).await {
            Ok(res) => {
                for msg in &res.messages {
                    for content in &msg.contents {
                        if let Content::FunctionCall {
                            name, arguments, ..
                        } = content
                        {
                            let _ = tx
                                .send(AgentEvent::ToolCall {
                                    name: name.clone(),
                                    args: arguments.clone(),
                                })
                                .await;
                        }
                    }
                }
                let _ = tx.send(AgentEvent::Answer(res.text())).await;
                Ok(res)
            }
            Err(e) => {
                let _ = tx.send(AgentEvent::Error(e.to_string())).await;
                Err(e)
            }
        }
    }

    /// Re-establish the underlying connection after a [`CallError::ConnectionLost`]
    async fn reconnect(&self) -> Result<(), CallError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A simple mock agent that transforms the last message (used in tests)
    pub struct MockAgent {
        name: String,
        transform: fn(String) -> String,
    }

    impl MockAgent {
        pub fn new(name: &str, transform: fn(String) -> String) -> Self {
            Self {
                name: name.to_string(),
                transform,
            }
        }
    }

    #[async_trait]
    impl Agent for MockAgent {
        fn name(&self) -> &str {
            &self.name
        }

        async fn run(&self, messages: &[ChatMessage]) -> Result<AgentResponse, CallError> {
            let last = crate::adk::message::last_message_text(messages);
            Ok(AgentResponse::text_reply((self.transform)(last)))
        }
    }

    #[tokio::test]
    async fn test_mock_agent() {
        let agent = MockAgent::new("test", |s| format!("{}-transformed", s));
        assert_eq!(agent.name(), "test");

        let result = agent.run(&[ChatMessage::user("input")]).await.unwrap();
        assert_eq!(result.text(), "input-transformed");
    }

    #[tokio::test]
    async fn test_default_run_stream_emits_answer() {
        let agent = MockAgent::new("test", |s| s.to_uppercase());
        let (tx, mut rx) = mpsc::channel(8);

        let result = agent
            .run_stream(&[ChatMessage::user("hi")], tx)
            .await
            .unwrap();
        assert_eq!(result.text(), "HI");

        match rx.recv().await {
            Some(AgentEvent::Answer(text)) => assert_eq!(text, "HI"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_response_text_skips_empty_messages() {
        let response = AgentResponse::new(vec![
            ChatMessage::assistant("one"),
            ChatMessage::new(crate::adk::message::Role::Assistant, vec![]),
            ChatMessage::assistant("two"),
        ]);
        assert_eq!(response.text(), "one\ntwo");
    }
}
