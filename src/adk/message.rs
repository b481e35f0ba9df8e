// SPDX-License-Identifier: MIT

//! Chat message types shared by agents, the handoff coordinator and the
//! declarative interpreter.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Who produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// Typed content items of a message, in order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    /// Plain text
    Text { text: String },
    /// Function/tool call requested by the model
    FunctionCall {
        call_id: String,
        name: String,
        #[serde(default)]
        arguments: Value,
    },
    /// Result of executing a function/tool
    FunctionResult { call_id: String, result: Value },
    /// Reasoning emitted by thinking models
    Reasoning { text: String },
}

/// A message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default)]
    pub contents: Vec<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub additional_properties: Map<String, Value>,
}

/// Ordered sequence of messages; consecutive user messages are kept verbatim
pub type Conversation = Vec<ChatMessage>;

impl ChatMessage {
    pub fn new(role: Role, contents: Vec<Content>) -> Self {
        Self {
            role,
            contents,
            author_name: None,
            message_id: None,
            additional_properties: Map::new(),
        }
    }

    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self::new(role, vec![Content::Text { text: text.into() }])
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::text(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text(Role::Assistant, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::text(Role::System, text)
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author_name = Some(author.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Concatenated text of all text contents
    pub fn text_content(&self) -> String {
        self.contents
            .iter()
            .filter_map(|c| match c {
                Content::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Function calls in this message, in order
    pub fn function_calls(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.contents.iter().filter_map(|c| match c {
            Content::FunctionCall {
                name, arguments, ..
            } => Some((name.as_str(), arguments)),
            _ => None,
        })
    }
}

/// Text of the last message in a conversation, or empty
pub fn last_message_text(messages: &[ChatMessage]) -> String {
    messages
        .last()
        .map(|m| m.text_content())
        .unwrap_or_default()
}

/// Number of user-authored messages
pub fn count_user_messages(messages: &[ChatMessage]) -> usize {
    messages.iter().filter(|m| m.role == Role::User).count()
}

/// Interpret a loosely shaped JSON value as chat messages.
///
/// Accepts a string (one user message), a serialized message, an object
/// with `role`/`text`, or an array of any of these.
pub fn messages_from_value(value: &Value) -> Vec<ChatMessage> {
    match value {
        Value::Null => vec![],
        Value::String(s) => vec![ChatMessage::user(s.clone())],
        Value::Array(items) => items.iter().flat_map(messages_from_value).collect(),
        Value::Object(obj) => {
            if let Ok(msg) = serde_json::from_value::<ChatMessage>(value.clone()) {
                if !msg.contents.is_empty() || !obj.contains_key("text") {
                    return vec![msg];
                }
            }
            let role = obj
                .get("role")
                .and_then(|r| serde_json::from_value::<Role>(r.clone()).ok())
                .unwrap_or(Role::User);
            let text = obj
                .get("text")
                .or_else(|| obj.get("content"))
                .map(value_to_text)
                .unwrap_or_default();
            let mut msg = ChatMessage::text(role, text);
            msg.author_name = obj
                .get("author_name")
                .and_then(|a| a.as_str())
                .map(String::from);
            vec![msg]
        }
        other => vec![ChatMessage::user(value_to_text(other))],
    }
}

/// Convert a JSON value to readable text
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(arr) => {
            let as_messages: Vec<ChatMessage> = arr
                .iter()
                .filter_map(|v| serde_json::from_value::<ChatMessage>(v.clone()).ok())
                .collect();
            if !arr.is_empty() && as_messages.len() == arr.len() {
                last_message_text(&as_messages)
            } else {
                value.to_string()
            }
        }
        Value::Object(_) => match serde_json::from_value::<ChatMessage>(value.clone()) {
            Ok(msg) => msg.text_content(),
            Err(_) => value.to_string(),
        },
    }
}
