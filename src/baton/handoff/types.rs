// SPDX-License-Identifier: MIT

//! Shared types for handoff orchestration

use crate::adk::error::ConfigError;
use crate::adk::message::{count_user_messages, ChatMessage};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

/// Default termination: stop once the conversation holds this many user messages
pub const DEFAULT_USER_MESSAGE_LIMIT: usize = 10;
/// Default cap on agent invocations in autonomous mode
pub const DEFAULT_AUTONOMOUS_TURN_LIMIT: usize = 50;
/// Cap on chained handoffs inside one turn
pub const MAX_HANDOFF_HOPS: usize = 10;

/// The coordinator is waiting for the next user turn.
///
/// The conversation is not written into checkpoints (see
/// `checkpoint::encoding`); after a restore it is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffUserInputRequest {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conversation: Vec<ChatMessage>,
    pub awaiting_agent_id: String,
    #[serde(default)]
    pub prompt: String,
    pub source_executor_id: String,
}

/// Conversation update sent from the gateway back to the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationWithUserInput {
    pub full_conversation: Vec<ChatMessage>,
    /// `true` appends to the coordinator's conversation, `false` replaces it
    #[serde(default)]
    pub is_post_restore: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionMode {
    /// Pause for user input after every agent turn
    #[default]
    HumanInLoop,
    /// Keep invoking agents until termination or the turn limit
    Autonomous,
}

impl FromStr for InteractionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human_in_loop" | "human-in-loop" | "humaninloop" => Ok(InteractionMode::HumanInLoop),
            "autonomous" => Ok(InteractionMode::Autonomous),
            other => Err(ConfigError::UnknownInteractionMode(other.to_string())),
        }
    }
}

/// Coordinator state machine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorState {
    #[default]
    AwaitingAgent,
    AwaitingUserInput,
    AwaitingReview,
    Terminated,
}

type SyncPredicate = dyn Fn(&[ChatMessage]) -> bool + Send + Sync;
type AsyncPredicate = dyn Fn(Vec<ChatMessage>) -> BoxFuture<'static, bool> + Send + Sync;

/// Predicate over the full conversation deciding when the handoff run ends
#[derive(Clone)]
pub enum TerminationCondition {
    Sync(Arc<SyncPredicate>),
    Async(Arc<AsyncPredicate>),
}

impl TerminationCondition {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&[ChatMessage]) -> bool + Send + Sync + 'static,
    {
        TerminationCondition::Sync(Arc::new(f))
    }

    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Vec<ChatMessage>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        TerminationCondition::Async(Arc::new(move |conversation| Box::pin(f(conversation))))
    }

    /// Terminates once `limit` user messages are in the conversation
    pub fn user_message_limit(limit: usize) -> Self {
        Self::sync(move |conversation| count_user_messages(conversation) >= limit)
    }

    pub async fn evaluate(&self, conversation: &[ChatMessage]) -> bool {
        match self {
            TerminationCondition::Sync(f) => f(conversation),
            TerminationCondition::Async(f) => f(conversation.to_vec()).await,
        }
    }
}

impl Default for TerminationCondition {
    fn default() -> Self {
        Self::user_message_limit(DEFAULT_USER_MESSAGE_LIMIT)
    }
}

impl std::fmt::Debug for TerminationCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminationCondition::Sync(_) => write!(f, "TerminationCondition::Sync"),
            TerminationCondition::Async(_) => write!(f, "TerminationCondition::Async"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interaction_mode_from_str() {
        assert_eq!(
            "autonomous".parse::<InteractionMode>().unwrap(),
            InteractionMode::Autonomous
        );
        assert_eq!(
            "human_in_loop".parse::<InteractionMode>().unwrap(),
            InteractionMode::HumanInLoop
        );
        assert!("chaos".parse::<InteractionMode>().is_err());
    }

    #[tokio::test]
    async fn test_default_termination_counts_user_messages() {
        let condition = TerminationCondition::default();
        let mut conversation: Vec<ChatMessage> =
            (0..9).map(|i| ChatMessage::user(format!("{}", i))).collect();
        conversation.push(ChatMessage::assistant("not a user"));
        assert!(!condition.evaluate(&conversation).await);

        conversation.push(ChatMessage::user("tenth"));
        assert!(condition.evaluate(&conversation).await);
    }

    #[tokio::test]
    async fn test_async_termination() {
        let condition = TerminationCondition::from_async(|conversation| async move {
            conversation
                .iter()
                .any(|m| m.text_content().contains("goodbye"))
        });
        assert!(!condition.evaluate(&[ChatMessage::user("hi")]).await);
        assert!(condition.evaluate(&[ChatMessage::user("goodbye")]).await);
    }
}
