// SPDX-License-Identifier: MIT

//! baton-rs: a durable, message-passing workflow engine for multi-agent
//! conversations and declarative action graphs.
//!
//! - [`adk`] holds the agent-facing traits (agents, tools, messages, errors)
//! - [`baton`] holds the engine: runner, checkpoints, handoff orchestration
//!   and the declarative interpreter

pub mod adk;
pub mod baton;
