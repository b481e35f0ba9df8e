// SPDX-License-Identifier: MIT

//! The `=`-prefixed expression language used by declarative actions.
//!
//! Expressions look like:
//! - `=Local.count + 1`
//! - `=If(IsBlank(Local.name), "stranger", Local.name)`
//! - `=Lower(System.LastMessage.Text) = "yes" Or Local.retries > 3`

mod ast;
mod evaluator;
mod lexer;
mod parser;

pub use ast::{BinaryOp, Expr, UnaryOp};
pub use evaluator::{
    evaluate, is_blank, is_truthy, message_text, number_value, to_text, values_equal,
    VariableScope,
};
pub use parser::parse;
