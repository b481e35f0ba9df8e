// SPDX-License-Identifier: MIT

//! Handoff signal detection in agent replies.
//!
//! Function calls named `handoff_to_<target>` take priority. A plain-text
//! `HANDOFF_TO: <target>` hint is the fallback for agents without tool calls.

use crate::adk::message::ChatMessage;
use once_cell::sync::Lazy;
use regex::Regex;

pub const HANDOFF_FUNCTION_PREFIX: &str = "handoff_to_";

static HANDOFF_HINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"HANDOFF_TO:\s*[`'\x22]?([A-Za-z0-9_\-]+)").expect("handoff hint pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandoffSignal {
    ToolCall(String),
    TextHint(String),
}

impl HandoffSignal {
    pub fn target(&self) -> &str {
        match self {
            HandoffSignal::ToolCall(t) | HandoffSignal::TextHint(t) => t,
        }
    }
}

/// Name of the function an agent calls to hand off to `target`
pub fn handoff_function_name(target: &str) -> String {
    format!("{}{}", HANDOFF_FUNCTION_PREFIX, target)
}

/// Find a handoff request in an agent reply
pub fn detect_handoff(messages: &[ChatMessage]) -> Option<HandoffSignal> {
    let from_call = messages
        .iter()
        .flat_map(|m| m.function_calls())
        .find_map(|(name, _)| {
            name.strip_prefix(HANDOFF_FUNCTION_PREFIX)
                .filter(|target| !target.is_empty())
                .map(|target| HandoffSignal::ToolCall(target.to_string()))
        });
    if from_call.is_some() {
        return from_call;
    }

    messages.iter().find_map(|m| {
        HANDOFF_HINT
            .captures(&m.text_content())
            .and_then(|caps| caps.get(1))
            .map(|target| HandoffSignal::TextHint(target.as_str().to_string()))
    })
}

/// Match a requested target against participant ids: exact first, then
/// case-insensitive
pub fn resolve_target<'a, I>(requested: &str, candidates: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let candidates: Vec<&str> = candidates.into_iter().collect();
    candidates
        .iter()
        .find(|c| **c == requested)
        .or_else(|| {
            candidates
                .iter()
                .find(|c| c.eq_ignore_ascii_case(requested))
        })
        .map(|c| c.to_string())
}
