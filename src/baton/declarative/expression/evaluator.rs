// SPDX-License-Identifier: MIT

//! Expression evaluator

use super::ast::{BinaryOp, Expr, UnaryOp};
use crate::adk::error::ExpressionError;
use crate::adk::message::ChatMessage;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Resolves variable paths during evaluation
pub trait VariableScope {
    fn lookup(&self, path: &str) -> Option<Value>;
}

impl VariableScope for HashMap<String, Value> {
    fn lookup(&self, path: &str) -> Option<Value> {
        self.get(path).cloned()
    }
}

/// Evaluate an expression; missing variables evaluate to blank (`null`)
pub fn evaluate(expr: &Expr, scope: &dyn VariableScope) -> Result<Value, ExpressionError> {
    match expr {
        Expr::Number(n) => Ok(number_value(*n)),
        Expr::String(s) => Ok(Value::String(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Variable(path) => Ok(scope.lookup(path).unwrap_or(Value::Null)),
        Expr::Unary { op, operand } => {
            let value = evaluate(operand, scope)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!is_truthy(&value))),
                UnaryOp::Negate => Ok(number_value(-to_number(&value)?)),
            }
        }
        Expr::Binary { op, left, right } => evaluate_binary(*op, left, right, scope),
        Expr::Call { name, args } => call(name, args, scope),
    }
}

fn evaluate_binary(
    op: BinaryOp,
    left: &Expr,
    right: &Expr,
    scope: &dyn VariableScope,
) -> Result<Value, ExpressionError> {
    let l = evaluate(left, scope)?;
    // Boolean operators short-circuit
    match op {
        BinaryOp::And => {
            return Ok(Value::Bool(
                is_truthy(&l) && is_truthy(&evaluate(right, scope)?),
            ))
        }
        BinaryOp::Or => {
            return Ok(Value::Bool(
                is_truthy(&l) || is_truthy(&evaluate(right, scope)?),
            ))
        }
        _ => {}
    }

    let r = evaluate(right, scope)?;
    let result = match op {
        BinaryOp::Eq => Value::Bool(values_equal(&l, &r)),
        BinaryOp::NotEq => Value::Bool(!values_equal(&l, &r)),
        BinaryOp::Lt => Value::Bool(compare(&l, &r, op)? == Ordering::Less),
        BinaryOp::Gt => Value::Bool(compare(&l, &r, op)? == Ordering::Greater),
        BinaryOp::Lte => Value::Bool(compare(&l, &r, op)? != Ordering::Greater),
        BinaryOp::Gte => Value::Bool(compare(&l, &r, op)? != Ordering::Less),
        BinaryOp::Concat => Value::String(format!("{}{}", to_text(&l), to_text(&r))),
        BinaryOp::Add => number_value(to_number(&l)? + to_number(&r)?),
        BinaryOp::Sub => number_value(to_number(&l)? - to_number(&r)?),
        BinaryOp::Mul => number_value(to_number(&l)? * to_number(&r)?),
        BinaryOp::Div => {
            let divisor = to_number(&r)?;
            if divisor == 0.0 {
                return Err(ExpressionError::DivisionByZero);
            }
            number_value(to_number(&l)? / divisor)
        }
        BinaryOp::And | BinaryOp::Or => Value::Bool(is_truthy(&l) && is_truthy(&r)),
    };
    Ok(result)
}

fn check_arity(
    name: &str,
    args: &[Expr],
    min: usize,
    max: Option<usize>,
) -> Result<(), ExpressionError> {
    let actual = args.len();
    let ok = actual >= min && max.map(|m| actual <= m).unwrap_or(true);
    if ok {
        return Ok(());
    }
    let expected = match max {
        Some(m) if m == min => m.to_string(),
        Some(m) => format!("{}-{}", min, m),
        None => format!("at least {}", min),
    };
    Err(ExpressionError::Arity {
        name: name.to_string(),
        expected,
        actual,
    })
}

fn call(name: &str, args: &[Expr], scope: &dyn VariableScope) -> Result<Value, ExpressionError> {
    let eval_arg = |i: usize| evaluate(&args[i], scope);

    match name {
        "If" => {
            check_arity(name, args, 2, None)?;
            let mut i = 0;
            while i + 1 < args.len() {
                if is_truthy(&eval_arg(i)?) {
                    return eval_arg(i + 1);
                }
                i += 2;
            }
            if i < args.len() {
                eval_arg(i)
            } else {
                Ok(Value::Null)
            }
        }
        "Not" => {
            check_arity(name, args, 1, Some(1))?;
            Ok(Value::Bool(!is_truthy(&eval_arg(0)?)))
        }
        "And" => {
            check_arity(name, args, 1, None)?;
            for i in 0..args.len() {
                if !is_truthy(&eval_arg(i)?) {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
        "Or" => {
            check_arity(name, args, 1, None)?;
            for i in 0..args.len() {
                if is_truthy(&eval_arg(i)?) {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        "Lower" => {
            check_arity(name, args, 1, Some(1))?;
            Ok(Value::String(to_text(&eval_arg(0)?).to_lowercase()))
        }
        "Upper" => {
            check_arity(name, args, 1, Some(1))?;
            Ok(Value::String(to_text(&eval_arg(0)?).to_uppercase()))
        }
        "Find" => {
            check_arity(name, args, 2, Some(3))?;
            let needle = to_text(&eval_arg(0)?);
            let haystack: Vec<char> = to_text(&eval_arg(1)?).chars().collect();
            let start = if args.len() == 3 {
                (to_number(&eval_arg(2)?)? as usize).max(1)
            } else {
                1
            };
            Ok(find(&needle, &haystack, start - 1)
                .map(|index| Value::from(index as i64 + 1))
                .unwrap_or(Value::Null))
        }
        "IsBlank" => {
            check_arity(name, args, 1, Some(1))?;
            Ok(Value::Bool(is_blank(&eval_arg(0)?)))
        }
        "IsEmpty" => {
            check_arity(name, args, 1, Some(1))?;
            let empty = match eval_arg(0)? {
                Value::Null => true,
                Value::Array(items) => items.is_empty(),
                Value::Object(map) => map.is_empty(),
                Value::String(s) => s.is_empty(),
                _ => false,
            };
            Ok(Value::Bool(empty))
        }
        "MessageText" => {
            check_arity(name, args, 1, Some(1))?;
            Ok(Value::String(message_text(&eval_arg(0)?)))
        }
        "Concatenate" => {
            check_arity(name, args, 1, None)?;
            let mut text = String::new();
            for i in 0..args.len() {
                text.push_str(&to_text(&eval_arg(i)?));
            }
            Ok(Value::String(text))
        }
        "Len" => {
            check_arity(name, args, 1, Some(1))?;
            let len = match eval_arg(0)? {
                Value::Array(items) => items.len(),
                other => to_text(&other).chars().count(),
            };
            Ok(Value::from(len as i64))
        }
        "Trim" => {
            check_arity(name, args, 1, Some(1))?;
            Ok(Value::String(to_text(&eval_arg(0)?).trim().to_string()))
        }
        "Text" => {
            check_arity(name, args, 1, Some(1))?;
            Ok(Value::String(to_text(&eval_arg(0)?)))
        }
        "Value" => {
            check_arity(name, args, 1, Some(1))?;
            Ok(match eval_arg(0)? {
                Value::Number(n) => n.as_f64().map(number_value).unwrap_or(Value::Null),
                Value::Bool(b) => Value::from(b as i64),
                other => to_text(&other)
                    .trim()
                    .parse::<f64>()
                    .map(number_value)
                    .unwrap_or(Value::Null),
            })
        }
        "Blank" => {
            check_arity(name, args, 0, Some(0))?;
            Ok(Value::Null)
        }
        "CountRows" => {
            check_arity(name, args, 1, Some(1))?;
            match eval_arg(0)? {
                Value::Array(items) => Ok(Value::from(items.len() as i64)),
                Value::Null => Ok(Value::from(0)),
                other => Err(ExpressionError::eval(format!(
                    "CountRows expects a table, got {}",
                    type_name(&other)
                ))),
            }
        }
        "First" | "Last" => {
            check_arity(name, args, 1, Some(1))?;
            match eval_arg(0)? {
                Value::Array(items) => {
                    let item = if name == "First" {
                        items.first()
                    } else {
                        items.last()
                    };
                    Ok(item.cloned().unwrap_or(Value::Null))
                }
                Value::Null => Ok(Value::Null),
                other => Err(ExpressionError::eval(format!(
                    "{} expects a table, got {}",
                    name,
                    type_name(&other)
                ))),
            }
        }
        "UserMessage" => {
            check_arity(name, args, 1, Some(1))?;
            let message = ChatMessage::user(to_text(&eval_arg(0)?));
            serde_json::to_value(message).map_err(|e| ExpressionError::eval(e.to_string()))
        }
        other => Err(ExpressionError::UnknownFunction(other.to_string())),
    }
}

fn find(needle: &str, haystack: &[char], from: usize) -> Option<usize> {
    let needle: Vec<char> = needle.chars().collect();
    if needle.is_empty() {
        return (from <= haystack.len()).then_some(from);
    }
    if needle.len() > haystack.len() {
        return None;
    }
    (from..=haystack.len() - needle.len()).find(|&i| haystack[i..i + needle.len()] == needle[..])
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "blank",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "text",
        Value::Array(_) => "table",
        Value::Object(_) => "record",
    }
}

/// Whole numbers become JSON integers; everything else stays a float
pub fn number_value(n: f64) -> Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty() && !s.eq_ignore_ascii_case("false"),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Display text of a value; blank is the empty string
pub fn to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => (f as i64).to_string(),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

fn to_number(value: &Value) -> Result<f64, ExpressionError> {
    match value {
        Value::Null => Ok(0.0),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| ExpressionError::eval("number out of range")),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| ExpressionError::eval(format!("'{}' is not a number", s))),
        other => Err(ExpressionError::eval(format!(
            "expected a number, got {}",
            type_name(other)
        ))),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Equality used by `=`: numbers compare with numeric strings, blank equals `""`
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, other) | (other, Value::Null) => is_blank(other),
        (Value::Number(_), _) | (_, Value::Number(_)) => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
            _ => false,
        },
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value, op: BinaryOp) -> Result<Ordering, ExpressionError> {
    if let (Value::String(x), Value::String(y)) = (a, b) {
        if as_number(a).is_none() || as_number(b).is_none() {
            return Ok(x.cmp(y));
        }
    }
    let x = to_number(a)?;
    let y = to_number(b)?;
    x.partial_cmp(&y)
        .ok_or_else(|| ExpressionError::eval(format!("cannot compare with '{}'", op)))
}

/// Text of a conversation-shaped value: messages joined by newlines
pub fn message_text(value: &Value) -> String {
    match value {
        Value::Array(items) => items
            .iter()
            .map(message_text)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Object(map) => {
            if let Some(messages) = map.get("messages") {
                return message_text(messages);
            }
            match serde_json::from_value::<ChatMessage>(value.clone()) {
                Ok(message) => message.text_content(),
                Err(_) => map.get("text").map(to_text).unwrap_or_default(),
            }
        }
        other => to_text(other),
    }
}
