// SPDX-License-Identifier: MIT

//! Control-plane messages exchanged by declarative action executors

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Starts the first action of a workflow
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionTrigger {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// An action finished; its successor runs next
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionComplete {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

/// Outcome of an If / Switch / ConditionGroup evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionResult {
    pub matched: bool,
    /// Index of the first matching branch, `-1` for no match / else
    pub branch_index: i32,
}

impl ConditionResult {
    pub fn branch(index: usize) -> Self {
        Self {
            matched: true,
            branch_index: index as i32,
        }
    }

    pub fn no_match() -> Self {
        Self {
            matched: false,
            branch_index: -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopIterationResult {
    pub has_next: bool,
    #[serde(default)]
    pub current_item: Option<Value>,
    pub current_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopAction {
    Break,
    Continue,
}

/// Sent by BreakLoop / ContinueLoop to the enclosing loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopControl {
    pub action: LoopAction,
}
