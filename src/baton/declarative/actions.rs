// SPDX-License-Identifier: MIT

//! Declarative action definitions
//!
//! Actions arrive as loosely typed maps (`{kind, id?, displayName?, ...}`)
//! from YAML or JSON and are parsed into the closed [`ActionKind`] enum.
//! Anything malformed is reported as a [`BuildError`] naming the action.

use crate::adk::error::BuildError;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// One parsed action
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub id: String,
    pub display_name: Option<String>,
    pub kind: ActionKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    SetVariable { variable: String, value: Value },
    /// `value` is a `{path}` template
    SetTextVariable { variable: String, value: String },
    SetMultipleVariables { assignments: Vec<(String, Value)> },
    AppendValue { variable: String, value: Value },
    ResetVariable { variable: String },
    ClearAllVariables { namespace: Option<String> },
    SendActivity { activity: String },
    EmitEvent { name: String, data: Value },
    Foreach(ForeachAction),
    If(ConditionalAction),
    Switch(ConditionalAction),
    ConditionGroup(ConditionalAction),
    BreakLoop,
    ContinueLoop,
    Goto { target: String },
    InvokeAzureAgent(InvokeAgentAction),
    InvokeTool {
        tool: String,
        arguments: Value,
        output: Option<String>,
    },
    WaitForInput(InputAction),
    RequestExternalInput(InputAction),
    Question(InputAction),
    EndWorkflow,
    EndConversation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeachAction {
    /// Expression or literal list
    pub items: Value,
    pub item_variable: String,
    pub index_variable: Option<String>,
    pub actions: Vec<Action>,
}

/// Shared shape of If, Switch and ConditionGroup
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalAction {
    /// Switch subject; when set, branch tests are compared against it
    pub value: Option<Value>,
    pub branches: Vec<Branch>,
    pub else_actions: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    /// Condition expression, or the case value for a Switch with a subject
    pub test: Value,
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvokeAgentAction {
    pub agent: String,
    /// Expression producing the conversation to send; defaults to
    /// `Conversation.messages`
    pub input_messages: Option<Value>,
    pub messages_var: Option<String>,
    pub response_obj_var: Option<String>,
    pub result_property: Option<String>,
    pub auto_send: bool,
    /// Keep asking for external input while this condition holds
    pub external_loop_when: Option<Value>,
}

impl InvokeAgentAction {
    /// Variable that receives `{"error": ...}` when the agent fails
    pub fn result_slot(&self) -> Option<&str> {
        self.result_property
            .as_deref()
            .or(self.response_obj_var.as_deref())
            .or(self.messages_var.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputAction {
    pub prompt: Option<String>,
    pub variable: Option<String>,
    pub choices: Option<Vec<String>>,
}

impl ActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::SetVariable { .. } => "SetVariable",
            ActionKind::SetTextVariable { .. } => "SetTextVariable",
            ActionKind::SetMultipleVariables { .. } => "SetMultipleVariables",
            ActionKind::AppendValue { .. } => "AppendValue",
            ActionKind::ResetVariable { .. } => "ResetVariable",
            ActionKind::ClearAllVariables { .. } => "ClearAllVariables",
            ActionKind::SendActivity { .. } => "SendActivity",
            ActionKind::EmitEvent { .. } => "EmitEvent",
            ActionKind::Foreach(_) => "Foreach",
            ActionKind::If(_) => "If",
            ActionKind::Switch(_) => "Switch",
            ActionKind::ConditionGroup(_) => "ConditionGroup",
            ActionKind::BreakLoop => "BreakLoop",
            ActionKind::ContinueLoop => "ContinueLoop",
            ActionKind::Goto { .. } => "Goto",
            ActionKind::InvokeAzureAgent(_) => "InvokeAzureAgent",
            ActionKind::InvokeTool { .. } => "InvokeTool",
            ActionKind::WaitForInput(_) => "WaitForInput",
            ActionKind::RequestExternalInput(_) => "RequestExternalInput",
            ActionKind::Question(_) => "Question",
            ActionKind::EndWorkflow => "EndWorkflow",
            ActionKind::EndConversation => "EndConversation",
        }
    }

    /// Actions that never fall through to the next action in their list
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActionKind::BreakLoop
                | ActionKind::ContinueLoop
                | ActionKind::Goto { .. }
                | ActionKind::EndWorkflow
                | ActionKind::EndConversation
        )
    }
}

impl Action {
    /// Nested action lists in declaration order
    pub fn children(&self) -> Vec<&Vec<Action>> {
        match &self.kind {
            ActionKind::Foreach(foreach) => vec![&foreach.actions],
            ActionKind::If(c) | ActionKind::Switch(c) | ActionKind::ConditionGroup(c) => c
                .branches
                .iter()
                .map(|b| &b.actions)
                .chain(std::iter::once(&c.else_actions))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Parse a list of raw action maps, assigning `<Kind>_<n>` ids where missing
pub fn parse_actions(values: &[Value]) -> Result<Vec<Action>, BuildError> {
    let mut counter = 0usize;
    let actions = parse_list(values, &mut counter)?;
    let mut seen = HashSet::new();
    check_unique(&actions, &mut seen)?;
    Ok(actions)
}

fn check_unique<'a>(actions: &'a [Action], seen: &mut HashSet<&'a str>) -> Result<(), BuildError> {
    for action in actions {
        if !seen.insert(action.id.as_str()) {
            return Err(BuildError::DuplicateActionId(action.id.clone()));
        }
        for child in action.children() {
            check_unique(child, seen)?;
        }
    }
    Ok(())
}

fn parse_list(values: &[Value], counter: &mut usize) -> Result<Vec<Action>, BuildError> {
    values.iter().map(|v| parse_action(v, counter)).collect()
}

/// Field access with errors that name the action
struct Fields<'a> {
    action_id: &'a str,
    map: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    fn missing(&self, field: &str) -> BuildError {
        BuildError::MissingField {
            action_id: self.action_id.to_string(),
            field: field.to_string(),
        }
    }

    fn value(&self, key: &str) -> Result<Value, BuildError> {
        self.map.get(key).cloned().ok_or_else(|| self.missing(key))
    }

    fn opt_value(&self, key: &str) -> Option<Value> {
        self.map.get(key).filter(|v| !v.is_null()).cloned()
    }

    fn string(&self, key: &str) -> Result<String, BuildError> {
        match self.map.get(key) {
            Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
            Some(Value::String(_)) | None | Some(Value::Null) => Err(self.missing(key)),
            Some(other) => Err(BuildError::InvalidDefinition(format!(
                "action '{}' field '{}' must be a string, got {}",
                self.action_id, key, other
            ))),
        }
    }

    fn opt_string(&self, key: &str) -> Option<String> {
        self.map.get(key).and_then(Value::as_str).map(str::to_string)
    }

    /// First present key among aliases
    fn string_of(&self, keys: &[&str]) -> Result<String, BuildError> {
        keys.iter()
            .find(|k| self.map.contains_key(**k))
            .map(|k| self.string(k))
            .unwrap_or_else(|| Err(self.missing(keys[0])))
    }

    fn list(&self, key: &str) -> Result<&'a Vec<Value>, BuildError> {
        match self.map.get(key) {
            Some(Value::Array(items)) => Ok(items),
            None | Some(Value::Null) => Err(self.missing(key)),
            Some(_) => Err(BuildError::InvalidDefinition(format!(
                "action '{}' field '{}' must be a list",
                self.action_id, key
            ))),
        }
    }

    fn actions(&self, key: &str, counter: &mut usize) -> Result<Vec<Action>, BuildError> {
        match self.map.get(key) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(_) => parse_list(self.list(key)?, counter),
        }
    }
}

fn parse_action(value: &Value, counter: &mut usize) -> Result<Action, BuildError> {
    let map = value.as_object().ok_or_else(|| {
        BuildError::InvalidDefinition(format!("action must be a map, got {}", value))
    })?;

    let explicit_id = map.get("id").and_then(Value::as_str).map(str::to_string);
    let kind_name = map.get("kind").and_then(Value::as_str);
    let id = match explicit_id {
        Some(id) => id,
        None => {
            let id = format!("{}_{}", kind_name.unwrap_or("action"), counter);
            *counter += 1;
            id
        }
    };
    let Some(kind_name) = kind_name else {
        return Err(BuildError::MissingField {
            action_id: id,
            field: "kind".to_string(),
        });
    };

    let fields = Fields {
        action_id: &id,
        map,
    };
    let kind = match kind_name {
        "SetVariable" => ActionKind::SetVariable {
            variable: fields.string_of(&["variable", "path"])?,
            value: fields.value("value")?,
        },
        "SetTextVariable" => ActionKind::SetTextVariable {
            variable: fields.string_of(&["variable", "path"])?,
            value: fields.string_of(&["value", "text"])?,
        },
        "SetMultipleVariables" => {
            let mut assignments = Vec::new();
            for item in fields.list("assignments")? {
                let entry = item.as_object().ok_or_else(|| {
                    BuildError::InvalidDefinition(format!(
                        "action '{}' assignments must be maps",
                        id
                    ))
                })?;
                let inner = Fields {
                    action_id: &id,
                    map: entry,
                };
                assignments.push((
                    inner.string_of(&["variable", "path"])?,
                    inner.value("value")?,
                ));
            }
            ActionKind::SetMultipleVariables { assignments }
        }
        "AppendValue" => ActionKind::AppendValue {
            variable: fields.string_of(&["variable", "path"])?,
            value: fields.value("value")?,
        },
        "ResetVariable" => ActionKind::ResetVariable {
            variable: fields.string_of(&["variable", "path"])?,
        },
        "ClearAllVariables" => ActionKind::ClearAllVariables {
            namespace: fields.opt_string("namespace"),
        },
        "SendActivity" => ActionKind::SendActivity {
            activity: match fields.value("activity")? {
                Value::String(s) => s,
                Value::Object(obj) => obj
                    .get("text")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| fields.missing("activity.text"))?,
                other => other.to_string(),
            },
        },
        "EmitEvent" => ActionKind::EmitEvent {
            name: fields.string_of(&["eventName", "name"])?,
            data: fields.opt_value("data").unwrap_or(Value::Null),
        },
        "Foreach" => ActionKind::Foreach(ForeachAction {
            items: fields.value("items")?,
            item_variable: fields
                .opt_string("value")
                .unwrap_or_else(|| "Local.item".to_string()),
            index_variable: fields.opt_string("index"),
            actions: fields.actions("actions", counter)?,
        }),
        "If" => ActionKind::If(ConditionalAction {
            value: None,
            branches: vec![Branch {
                test: fields.value("condition")?,
                actions: fields.actions("actions", counter)?,
            }],
            else_actions: fields.actions("elseActions", counter)?,
        }),
        "Switch" => {
            let value = fields.opt_value("value");
            let (key, test_key) = if value.is_some() {
                ("cases", "match")
            } else {
                ("conditions", "condition")
            };
            let branches = parse_branches(&fields, key, test_key, counter)?;
            let else_key = if map.contains_key("default") {
                "default"
            } else {
                "elseActions"
            };
            ActionKind::Switch(ConditionalAction {
                value,
                branches,
                else_actions: fields.actions(else_key, counter)?,
            })
        }
        "ConditionGroup" => ActionKind::ConditionGroup(ConditionalAction {
            value: None,
            branches: parse_branches(&fields, "conditions", "condition", counter)?,
            else_actions: fields.actions("elseActions", counter)?,
        }),
        "BreakLoop" => ActionKind::BreakLoop,
        "ContinueLoop" => ActionKind::ContinueLoop,
        "Goto" | "GotoAction" => ActionKind::Goto {
            target: fields.string_of(&["actionId", "target"])?,
        },
        "InvokeAzureAgent" => {
            let agent = match fields.value("agent")? {
                Value::String(s) => s,
                Value::Object(obj) => obj
                    .get("name")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| fields.missing("agent.name"))?,
                _ => return Err(fields.missing("agent")),
            };
            let input = fields.opt_value("input").unwrap_or(Value::Null);
            let output = fields.opt_value("output").unwrap_or(Value::Null);
            let out_str = |key: &str| output.get(key).and_then(Value::as_str).map(str::to_string);
            ActionKind::InvokeAzureAgent(InvokeAgentAction {
                agent,
                input_messages: input.get("messages").cloned(),
                messages_var: out_str("messages"),
                response_obj_var: out_str("responseObject"),
                result_property: out_str("resultProperty")
                    .or_else(|| fields.opt_string("resultProperty")),
                auto_send: output.get("autoSend").and_then(Value::as_bool).unwrap_or(true),
                external_loop_when: fields
                    .opt_value("externalLoop")
                    .and_then(|l| l.get("when").cloned()),
            })
        }
        "InvokeTool" => ActionKind::InvokeTool {
            tool: fields.string_of(&["tool", "toolName"])?,
            arguments: fields
                .opt_value("arguments")
                .unwrap_or_else(|| Value::Object(Map::new())),
            output: fields.opt_string("output"),
        },
        "WaitForInput" => ActionKind::WaitForInput(parse_input(&fields, false)?),
        "RequestExternalInput" => ActionKind::RequestExternalInput(parse_input(&fields, false)?),
        "Question" => ActionKind::Question(parse_input(&fields, true)?),
        "EndWorkflow" => ActionKind::EndWorkflow,
        "EndConversation" => ActionKind::EndConversation,
        other => {
            return Err(BuildError::UnknownActionKind {
                action_id: id,
                kind: other.to_string(),
            })
        }
    };

    Ok(Action {
        display_name: map
            .get("displayName")
            .and_then(Value::as_str)
            .map(str::to_string),
        id,
        kind,
    })
}

fn parse_branches(
    fields: &Fields<'_>,
    key: &str,
    test_key: &str,
    counter: &mut usize,
) -> Result<Vec<Branch>, BuildError> {
    let mut branches = Vec::new();
    for item in fields.list(key)? {
        let map = item.as_object().ok_or_else(|| {
            BuildError::InvalidDefinition(format!(
                "action '{}' {} entries must be maps",
                fields.action_id, key
            ))
        })?;
        let branch = Fields {
            action_id: fields.action_id,
            map,
        };
        branches.push(Branch {
            test: branch.value(test_key)?,
            actions: branch.actions("actions", counter)?,
        });
    }
    Ok(branches)
}

fn parse_input(fields: &Fields<'_>, prompt_required: bool) -> Result<InputAction, BuildError> {
    let prompt = if prompt_required {
        Some(fields.string_of(&["prompt", "text"])?)
    } else {
        fields
            .opt_string("prompt")
            .or_else(|| fields.opt_string("text"))
    };
    let choices = match fields.opt_value("choices") {
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .map(|c| match c {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
        ),
        _ => None,
    };
    Ok(InputAction {
        prompt,
        variable: fields.opt_string("variable"),
        choices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_nested_if_with_generated_ids() {
        let actions = parse_actions(&[json!({
            "kind": "If",
            "condition": "=Local.n > 1",
            "actions": [{"kind": "SendActivity", "activity": "big"}],
            "elseActions": [{"kind": "SendActivity", "activity": {"text": "small"}}]
        })])
        .unwrap();

        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].id, "If_0");
        let ActionKind::If(cond) = &actions[0].kind else {
            panic!("expected If");
        };
        assert_eq!(cond.branches[0].actions[0].id, "SendActivity_1");
        assert_eq!(
            cond.else_actions[0].kind,
            ActionKind::SendActivity {
                activity: "small".into()
            }
        );
    }

    #[test]
    fn test_unknown_kind_names_action() {
        let err = parse_actions(&[json!({"id": "weird", "kind": "Teleport"})]).unwrap_err();
        assert_eq!(
            err,
            BuildError::UnknownActionKind {
                action_id: "weird".into(),
                kind: "Teleport".into()
            }
        );
    }

    #[test]
    fn test_missing_field_names_action_and_field() {
        let err = parse_actions(&[json!({"id": "set1", "kind": "SetVariable", "value": 1})])
            .unwrap_err();
        assert_eq!(
            err,
            BuildError::MissingField {
                action_id: "set1".into(),
                field: "variable".into()
            }
        );

        let err = parse_actions(&[json!({"id": "x"})]).unwrap_err();
        assert!(matches!(err, BuildError::MissingField { field, .. } if field == "kind"));
    }

    #[test]
    fn test_duplicate_ids_across_branches() {
        let err = parse_actions(&[json!({
            "kind": "ConditionGroup",
            "id": "group",
            "conditions": [
                {"condition": true, "actions": [{"kind": "EndWorkflow", "id": "dup"}]},
                {"condition": false, "actions": [{"kind": "EndWorkflow", "id": "dup"}]}
            ]
        })])
        .unwrap_err();
        assert_eq!(err, BuildError::DuplicateActionId("dup".into()));
    }

    #[test]
    fn test_switch_with_subject_uses_cases() {
        let actions = parse_actions(&[json!({
            "kind": "Switch",
            "id": "route",
            "value": "=Local.color",
            "cases": [
                {"match": "red", "actions": [{"kind": "EndWorkflow"}]},
                {"match": "blue", "actions": []}
            ],
            "default": [{"kind": "EndConversation"}]
        })])
        .unwrap();
        let ActionKind::Switch(cond) = &actions[0].kind else {
            panic!("expected Switch");
        };
        assert_eq!(cond.value, Some(json!("=Local.color")));
        assert_eq!(cond.branches.len(), 2);
        assert_eq!(cond.branches[1].test, json!("blue"));
        assert_eq!(cond.else_actions.len(), 1);
    }

    #[test]
    fn test_invoke_agent_output_slots() {
        let actions = parse_actions(&[json!({
            "kind": "InvokeAzureAgent",
            "id": "ask",
            "agent": {"name": "writer"},
            "output": {"messages": "Local.reply", "autoSend": false},
            "externalLoop": {"when": "=Local.done = false"}
        })])
        .unwrap();
        let ActionKind::InvokeAzureAgent(invoke) = &actions[0].kind else {
            panic!("expected InvokeAzureAgent");
        };
        assert_eq!(invoke.agent, "writer");
        assert!(!invoke.auto_send);
        assert_eq!(invoke.result_slot(), Some("Local.reply"));
        assert_eq!(invoke.external_loop_when, Some(json!("=Local.done = false")));
    }

    #[test]
    fn test_question_requires_prompt() {
        let err = parse_actions(&[json!({"kind": "Question", "id": "q", "variable": "Local.a"})])
            .unwrap_err();
        assert!(matches!(err, BuildError::MissingField { field, .. } if field == "prompt"));
    }
}
