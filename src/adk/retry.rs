// SPDX-License-Identifier: MIT

//! Reconnect-and-retry-once for external calls.
//!
//! Only [`CallError::ConnectionLost`] is retried, and only once. A domain
//! failure, or a second consecutive connection loss, is returned as is.

use crate::adk::agent::{Agent, AgentResponse};
use crate::adk::error::CallError;
use crate::adk::message::ChatMessage;
use crate::adk::tool::Tool;
use serde_json::Value;

/// Run an agent, reconnecting and retrying once on connection loss
pub async fn run_agent(agent: &dyn Agent, messages: &[ChatMessage]) -> Result<AgentResponse, CallError> {
    match agent.run(messages).await {
        Err(e) if e.is_connection_lost() => {
            log::warn!(
                "Agent '{}' lost its connection ({}), reconnecting",
                agent.name(),
                e
            );
            agent.reconnect().await?;
            agent.run(messages).await
        }
        other => other,
    }
}

/// Execute a tool, reconnecting and retrying once on connection loss
pub async fn execute_tool(tool: &dyn Tool, input: Value) -> Result<Value, CallError> {
    match tool.execute(input.clone()).await {
        Err(e) if e.is_connection_lost() => {
            log::warn!(
                "Tool '{}' lost its connection ({}), reconnecting",
                tool.name(),
                e
            );
            tool.reconnect().await?;
            tool.execute(input).await
        }
        other => other,
    }
}
