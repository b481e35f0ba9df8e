// SPDX-License-Identifier: MIT

//! Namespace-scoped state of a declarative workflow run.
//!
//! The whole store is one JSON document kept in [`SharedState`] under
//! [`STATE_KEY`]. Executors load it, apply their action and save it back;
//! the declarative graph runs one action at a time, so there is no
//! concurrent writer.

use crate::adk::error::{ExpressionError, Result, StateError};
use crate::baton::declarative::expression::{
    evaluate, is_truthy, parse, to_text, VariableScope,
};
use crate::baton::workflow::SharedState;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Shared-state key holding the serialized store
pub const STATE_KEY: &str = "_declarative_state";
/// Built-in top-level namespaces
pub const NAMESPACES: [&str; 5] = ["Local", "System", "Workflow", "Agent", "Conversation"];
/// `MessageText(...)` results longer than this are hoisted into a variable
pub const LONG_VALUE_THRESHOLD: usize = 500;
const TEMP_MESSAGE_TEXT: &str = "_TempMessageText";
const MESSAGE_TEXT_CALL: &[u8] = b"MessageText";

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z0-9_]+)*)\}")
        .expect("placeholder pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclarativeWorkflowState {
    root: Map<String, Value>,
}

impl Default for DeclarativeWorkflowState {
    fn default() -> Self {
        Self::new()
    }
}

impl DeclarativeWorkflowState {
    pub fn new() -> Self {
        let mut root = Map::new();
        for ns in NAMESPACES {
            root.insert(ns.to_string(), Value::Object(Map::new()));
        }
        root.insert(
            "Workflow".to_string(),
            serde_json::json!({"Inputs": {}, "Outputs": {}}),
        );
        Self { root }
    }

    /// Fresh store with the run's inputs; non-object input lands in
    /// `Workflow.Inputs.input`
    pub fn with_inputs(inputs: Value) -> Self {
        let mut state = Self::new();
        let inputs = match inputs {
            Value::Object(map) => Value::Object(map),
            Value::Null => Value::Object(Map::new()),
            other => serde_json::json!({ "input": other }),
        };
        if let Some(Value::Object(workflow)) = state.root.get_mut("Workflow") {
            workflow.insert("Inputs".to_string(), inputs);
        }
        state
    }

    pub async fn load(shared: &SharedState) -> Result<Self> {
        match shared.get(STATE_KEY).await {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Self::new()),
        }
    }

    pub async fn save(&self, shared: &SharedState) -> Result<()> {
        shared.set(STATE_KEY, serde_json::to_value(self)?).await;
        Ok(())
    }

    /// Whole document, namespaces as top-level keys
    pub fn to_value(&self) -> Value {
        Value::Object(self.root.clone())
    }

    fn is_namespace(&self, name: &str) -> bool {
        NAMESPACES.contains(&name) || self.root.contains_key(name)
    }

    /// Read a path; missing segments give `None`. A path whose first segment
    /// is not a namespace resolves under `Local`.
    pub fn get(&self, path: &str) -> Option<Value> {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return None;
        }
        let (namespace, rest) = if self.is_namespace(segments[0]) {
            (segments[0], &segments[1..])
        } else {
            ("Local", &segments[..])
        };

        let mut current = self.root.get(namespace)?;
        for segment in rest {
            current = match current {
                Value::Object(map) => map.get(*segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current.clone())
    }

    /// Validate a write target and split it into namespace and key path
    fn writable<'a>(&self, path: &'a str) -> std::result::Result<(&'a str, Vec<&'a str>), StateError> {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(StateError::EmptyPath);
        }
        if segments[0] == "Workflow" {
            return match segments.get(1) {
                None => Err(StateError::WorkflowRoot),
                Some(&"Inputs") => Err(StateError::ReadOnlyInputs(path.to_string())),
                Some(&"Outputs") if segments.len() == 2 => {
                    Err(StateError::ReplaceNamespace(path.to_string()))
                }
                Some(&"Outputs") => Ok(("Workflow", segments[1..].to_vec())),
                Some(other) => Err(StateError::UnknownWorkflowNamespace(other.to_string())),
            };
        }
        if segments.len() == 1 {
            return Err(StateError::ReplaceNamespace(path.to_string()));
        }
        Ok((segments[0], segments[1..].to_vec()))
    }

    fn slot_mut(&mut self, namespace: &str, keys: &[&str]) -> &mut Value {
        let mut current = self
            .root
            .entry(namespace.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        for key in keys {
            current = child_mut(current, key);
        }
        current
    }

    pub fn set(&mut self, path: &str, value: Value) -> std::result::Result<(), StateError> {
        let (namespace, keys) = self.writable(path)?;
        *self.slot_mut(namespace, &keys) = value;
        Ok(())
    }

    /// Append to a list, creating it when missing
    pub fn append(&mut self, path: &str, value: Value) -> std::result::Result<(), StateError> {
        let (namespace, keys) = self.writable(path)?;
        let slot = self.slot_mut(namespace, &keys);
        match slot {
            Value::Null => *slot = Value::Array(vec![value]),
            Value::Array(items) => items.push(value),
            _ => return Err(StateError::NotAList(path.to_string())),
        }
        Ok(())
    }

    /// Remove a variable; missing variables are ignored
    pub fn reset(&mut self, path: &str) -> std::result::Result<(), StateError> {
        let (namespace, keys) = self.writable(path)?;
        let Some((last, parents)) = keys.split_last() else {
            return Err(StateError::EmptyPath);
        };
        let mut current = match self.root.get_mut(namespace) {
            Some(value) => value,
            None => return Ok(()),
        };
        for key in parents {
            current = match current {
                Value::Object(map) => match map.get_mut(*key) {
                    Some(next) => next,
                    None => return Ok(()),
                },
                _ => return Ok(()),
            };
        }
        if let Value::Object(map) = current {
            map.remove(*last);
        }
        Ok(())
    }

    /// Empty a namespace (`Local` when `None`)
    pub fn clear(&mut self, namespace: Option<&str>) -> std::result::Result<(), StateError> {
        match namespace.unwrap_or("Local") {
            "Workflow.Inputs" => Err(StateError::ReadOnlyInputs("Workflow.Inputs".into())),
            "Workflow" => Err(StateError::WorkflowRoot),
            "Workflow.Outputs" => {
                *self.slot_mut("Workflow", &["Outputs"]) = Value::Object(Map::new());
                Ok(())
            }
            ns if ns.contains('.') => Err(StateError::UnknownWorkflowNamespace(ns.to_string())),
            ns => {
                self.root.insert(ns.to_string(), Value::Object(Map::new()));
                Ok(())
            }
        }
    }

    /// Evaluate `=`-prefixed strings; anything else is returned unchanged
    pub fn eval(&mut self, expr: &Value) -> std::result::Result<Value, ExpressionError> {
        match expr {
            Value::String(s) if s.starts_with('=') => {
                let body = self.hoist_message_text(&s[1..])?;
                let ast = parse(&body)?;
                evaluate(&ast, self)
            }
            other => Ok(other.clone()),
        }
    }

    /// [`eval`](Self::eval) applied through nested objects and arrays
    pub fn eval_if_expression(&mut self, value: &Value) -> std::result::Result<Value, ExpressionError> {
        match value {
            Value::Object(map) => {
                let mut out = Map::new();
                for (key, item) in map {
                    out.insert(key.clone(), self.eval_if_expression(item)?);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => items
                .iter()
                .map(|item| self.eval_if_expression(item))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Value::Array),
            other => self.eval(other),
        }
    }

    pub fn eval_condition(&mut self, expr: &Value) -> std::result::Result<bool, ExpressionError> {
        Ok(is_truthy(&self.eval(expr)?))
    }

    /// Replace `{Namespace.path}` placeholders with the variable's text
    pub fn interpolate_string(&self, template: &str) -> String {
        PLACEHOLDER
            .replace_all(template, |caps: &regex::Captures| {
                self.get(&caps[1]).map(|v| to_text(&v)).unwrap_or_default()
            })
            .into_owned()
    }

    /// Evaluate every `MessageText(...)` call up front. Long results move to
    /// `Local._TempMessageText<n>` and are referenced by name; short ones are
    /// inlined as string literals.
    fn hoist_message_text(&mut self, body: &str) -> std::result::Result<String, ExpressionError> {
        let bytes = body.as_bytes();
        let mut out = String::with_capacity(body.len());
        let mut copied = 0;
        let mut temp = 0;
        let mut i = 0;

        while i < bytes.len() {
            if bytes[i] == b'"' {
                i = skip_string(bytes, i);
                continue;
            }
            let at_call = bytes[i..].starts_with(MESSAGE_TEXT_CALL)
                && (i == 0 || !is_ident_byte(bytes[i - 1]));
            if !at_call {
                i += 1;
                continue;
            }

            let mut open = i + MESSAGE_TEXT_CALL.len();
            while open < bytes.len() && bytes[open].is_ascii_whitespace() {
                open += 1;
            }
            if open >= bytes.len() || bytes[open] != b'(' {
                i += MESSAGE_TEXT_CALL.len();
                continue;
            }
            let close = matching_paren(bytes, open)
                .ok_or_else(|| ExpressionError::parse(open, "unbalanced parentheses"))?;

            let text = to_text(&evaluate(&parse(&body[i..=close])?, self)?);
            out.push_str(&body[copied..i]);
            if text.chars().count() > LONG_VALUE_THRESHOLD {
                let key = format!("{}{}", TEMP_MESSAGE_TEXT, temp);
                temp += 1;
                log::debug!("Hoisting {} characters into Local.{}", text.len(), key);
                *self.slot_mut("Local", &[key.as_str()]) = Value::String(text);
                out.push_str("Local.");
                out.push_str(&key);
            } else {
                out.push('"');
                out.push_str(&text.replace('"', "\"\""));
                out.push('"');
            }
            i = close + 1;
            copied = i;
        }

        out.push_str(&body[copied..]);
        Ok(out)
    }
}

impl VariableScope for DeclarativeWorkflowState {
    fn lookup(&self, path: &str) -> Option<Value> {
        self.get(path)
    }
}

fn child_mut<'a>(value: &'a mut Value, key: &str) -> &'a mut Value {
    let index = match value {
        Value::Array(items) => key.parse::<usize>().ok().filter(|i| *i < items.len()),
        _ => None,
    };
    if let Some(i) = index {
        return &mut value[i];
    }
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    &mut value[key]
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || b >= 0x80
}

/// Index just past the string literal opening at `start`
fn skip_string(bytes: &[u8], start: usize) -> usize {
    let mut j = start + 1;
    while j < bytes.len() {
        if bytes[j] == b'"' {
            if bytes.get(j + 1) == Some(&b'"') {
                j += 2;
                continue;
            }
            return j + 1;
        }
        j += 1;
    }
    bytes.len()
}

fn matching_paren(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut j = open;
    while j < bytes.len() {
        match bytes[j] {
            b'"' => {
                j = skip_string(bytes, j);
                continue;
            }
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(j);
                }
            }
            _ => {}
        }
        j += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::message::ChatMessage;
    use serde_json::json;

    #[test]
    fn test_inputs_are_read_only() {
        let mut state = DeclarativeWorkflowState::with_inputs(json!({"q": "hi"}));
        for value in [json!(1), json!("x"), json!(null), json!({"a": 1})] {
            let err = state.set("Workflow.Inputs.q", value).unwrap_err();
            assert!(err.to_string().contains("Cannot modify Workflow.Inputs"));
        }
        assert_eq!(state.get("Workflow.Inputs.q"), Some(json!("hi")));
    }

    #[test]
    fn test_bare_namespace_cannot_be_replaced() {
        let mut state = DeclarativeWorkflowState::new();
        let err = state.set("turn", json!({})).unwrap_err();
        assert!(err.to_string().contains("Cannot replace entire namespace"));
        assert!(matches!(
            state.set("Local", json!({})),
            Err(StateError::ReplaceNamespace(_))
        ));
        assert!(matches!(
            state.set("Workflow", json!({})),
            Err(StateError::WorkflowRoot)
        ));
        assert!(matches!(
            state.set("Workflow.Secrets.k", json!(1)),
            Err(StateError::UnknownWorkflowNamespace(_))
        ));
        assert!(state.set("Workflow.Outputs.answer", json!(42)).is_ok());
    }

    #[test]
    fn test_bare_path_defaults_to_local() {
        let mut state = DeclarativeWorkflowState::new();
        state.set("Local.count", json!(3)).unwrap();
        assert_eq!(state.get("count"), Some(json!(3)));
        assert_eq!(state.get("Local.missing.deeper"), None);
    }

    #[test]
    fn test_custom_namespace_created_on_first_write() {
        let mut state = DeclarativeWorkflowState::new();
        state.set("turn.items", json!(["a", "b"])).unwrap();
        assert_eq!(state.get("turn.items.1"), Some(json!("b")));
        assert_eq!(state.get("turn.items.7"), None);
    }

    #[test]
    fn test_nested_set_creates_objects() {
        let mut state = DeclarativeWorkflowState::new();
        state.set("Local.user.profile.name", json!("Ada")).unwrap();
        assert_eq!(
            state.get("Local.user"),
            Some(json!({"profile": {"name": "Ada"}}))
        );
    }

    #[test]
    fn test_append_creates_and_rejects_non_lists() {
        let mut state = DeclarativeWorkflowState::new();
        state.append("Local.log", json!("one")).unwrap();
        state.append("Local.log", json!("two")).unwrap();
        assert_eq!(state.get("Local.log"), Some(json!(["one", "two"])));

        state.set("Local.name", json!("x")).unwrap();
        assert!(matches!(
            state.append("Local.name", json!(1)),
            Err(StateError::NotAList(_))
        ));
    }

    #[test]
    fn test_reset_and_clear() {
        let mut state = DeclarativeWorkflowState::with_inputs(json!({"q": 1}));
        state.set("Local.a", json!(1)).unwrap();
        state.set("Local.b", json!(2)).unwrap();
        state.reset("Local.a").unwrap();
        assert_eq!(state.get("Local.a"), None);
        assert_eq!(state.get("Local.b"), Some(json!(2)));

        state.clear(None).unwrap();
        assert_eq!(state.get("Local.b"), None);
        assert!(state.clear(Some("Workflow.Inputs")).is_err());
        assert_eq!(state.get("Workflow.Inputs.q"), Some(json!(1)));
    }

    #[test]
    fn test_eval_passes_literals_through() {
        let mut state = DeclarativeWorkflowState::new();
        assert_eq!(state.eval(&json!("plain text")).unwrap(), json!("plain text"));
        assert_eq!(state.eval(&json!(7)).unwrap(), json!(7));
        assert_eq!(state.eval(&json!({"k": "=1"})).unwrap(), json!({"k": "=1"}));
    }

    #[test]
    fn test_eval_division() {
        let mut state = DeclarativeWorkflowState::new();
        state.set("Local.x", json!(10)).unwrap();
        state.set("Local.y", json!(4)).unwrap();
        assert_eq!(state.eval(&json!("=x/y")).unwrap(), json!(2.5));
        assert_eq!(state.eval(&json!("=Local.x * 2")).unwrap(), json!(20));
    }

    #[test]
    fn test_long_message_text_is_hoisted() {
        let mut state = DeclarativeWorkflowState::new();
        let long = "a".repeat(600);
        state
            .set("Local.reply", json!([ChatMessage::assistant(long.clone())]))
            .unwrap();

        let result = state.eval(&json!("=Len(MessageText(Local.reply))")).unwrap();
        assert_eq!(result, json!(600));
        assert_eq!(
            state.get("Local._TempMessageText0"),
            Some(json!(long))
        );
    }

    #[test]
    fn test_short_message_text_is_inlined() {
        let mut state = DeclarativeWorkflowState::new();
        state
            .set("Local.reply", json!([ChatMessage::assistant("hello world")]))
            .unwrap();

        let result = state
            .eval(&json!("=Upper(MessageText(Local.reply))"))
            .unwrap();
        assert_eq!(result, json!("HELLO WORLD"));
        assert_eq!(state.get("Local._TempMessageText0"), None);
    }

    #[test]
    fn test_message_text_inside_string_literal_is_ignored() {
        let mut state = DeclarativeWorkflowState::new();
        let result = state
            .eval(&json!(r#"="MessageText(x) is literal""#))
            .unwrap();
        assert_eq!(result, json!("MessageText(x) is literal"));
    }

    #[test]
    fn test_eval_if_expression_recurses() {
        let mut state = DeclarativeWorkflowState::new();
        state.set("Local.n", json!(2)).unwrap();
        let value = json!({"a": "=n + 1", "b": ["=n * 2", "raw"], "c": true});
        assert_eq!(
            state.eval_if_expression(&value).unwrap(),
            json!({"a": 3, "b": [4, "raw"], "c": true})
        );
    }

    #[test]
    fn test_eval_condition_truthiness() {
        let mut state = DeclarativeWorkflowState::new();
        state.set("Local.n", json!(5)).unwrap();
        assert!(state.eval_condition(&json!("=n > 3")).unwrap());
        assert!(!state.eval_condition(&json!(false)).unwrap());
        assert!(state.eval_condition(&json!(true)).unwrap());
    }

    #[test]
    fn test_interpolate_string() {
        let mut state = DeclarativeWorkflowState::with_inputs(json!({"name": "Ada"}));
        state.set("Local.count", json!(3)).unwrap();
        assert_eq!(
            state.interpolate_string("Hi {Workflow.Inputs.name}, {count} items{Local.none}"),
            "Hi Ada, 3 items"
        );
    }

    #[tokio::test]
    async fn test_load_and_save_through_shared_state() {
        let shared = SharedState::new();
        let mut state = DeclarativeWorkflowState::load(&shared).await.unwrap();
        state.set("Local.k", json!("v")).unwrap();
        state.save(&shared).await.unwrap();

        let reloaded = DeclarativeWorkflowState::load(&shared).await.unwrap();
        assert_eq!(reloaded.get("Local.k"), Some(json!("v")));
        assert!(shared.get(STATE_KEY).await.is_some());
    }
}
