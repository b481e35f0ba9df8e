// SPDX-License-Identifier: MIT

use crate::adk::error::CallError;
use async_trait::async_trait;
use serde_json::Value;

/// Trait for tools invoked by `InvokeTool` actions.
///
/// `name()` and `description()` return `&str` and `schema()` returns `&Value`
/// so implementations store them in fields instead of rebuilding per call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool name (must be unique within a registry)
    fn name(&self) -> &str;

    /// Returns a human-readable description of what the tool does
    fn description(&self) -> &str;

    /// Returns the JSON schema for the tool's input parameters
    fn schema(&self) -> &Value;

    /// Execute the tool with the given input and return the result
    async fn execute(&self, input: Value) -> Result<Value, CallError>;

    /// Re-establish the underlying connection after a [`CallError::ConnectionLost`]
    async fn reconnect(&self) -> Result<(), CallError> {
        Ok(())
    }
}
