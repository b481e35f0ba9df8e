// SPDX-License-Identifier: MIT

use super::{complete, CONTINUATION};
use crate::adk::error::{InvocationError, Result};
use crate::adk::retry;
use crate::adk::tool::Tool;
use crate::baton::declarative::state::DeclarativeWorkflowState;
use crate::baton::workflow::{Executor, MessageKind, WorkflowContext, WorkflowMessage};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

/// `InvokeTool`: evaluates the arguments, calls the tool and stores the result
pub struct InvokeToolExecutor {
    id: String,
    tool: Arc<dyn Tool>,
    arguments: Value,
    output: Option<String>,
}

impl InvokeToolExecutor {
    pub fn new(
        id: impl Into<String>,
        tool: Arc<dyn Tool>,
        arguments: Value,
        output: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            tool,
            arguments,
            output,
        }
    }
}

#[async_trait]
impl Executor for InvokeToolExecutor {
    fn id(&self) -> &str {
        &self.id
    }

    fn input_types(&self) -> &[MessageKind] {
        CONTINUATION
    }

    async fn handle(&self, _message: WorkflowMessage, ctx: &mut WorkflowContext) -> Result<()> {
        let mut state = DeclarativeWorkflowState::load(ctx.shared_state()).await?;
        let arguments = state.eval_if_expression(&self.arguments)?;
        log::debug!("Action '{}' calling tool '{}'", self.id, self.tool.name());

        match retry::execute_tool(self.tool.as_ref(), arguments).await {
            Ok(result) => {
                if let Some(output) = &self.output {
                    state.set(output, result)?;
                }
                state.save(ctx.shared_state()).await?;
                complete(ctx);
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                log::error!("Tool '{}' failed: {}", self.tool.name(), message);
                if let Some(output) = &self.output {
                    state.set(output, json!({ "error": message }))?;
                }
                state.save(ctx.shared_state()).await?;
                ctx.set_state(json!({ "error": message, "tool": self.tool.name() }));
                Err(InvocationError::tool(self.tool.name(), message).into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{context, state};
    use super::*;
    use crate::adk::error::{BatonError, CallError};
    use crate::baton::declarative::protocol::ActionTrigger;
    use crate::baton::workflow::SharedState;
    use once_cell::sync::Lazy;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static SCHEMA: Lazy<Value> = Lazy::new(|| json!({"type": "object"}));

    /// Adds `a` and `b`; loses its connection for the first `drops` calls
    struct AddTool {
        drops: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Tool for AddTool {
        fn name(&self) -> &str {
            "add"
        }

        fn description(&self) -> &str {
            "adds two numbers"
        }

        fn schema(&self) -> &Value {
            &SCHEMA
        }

        async fn execute(&self, input: Value) -> std::result::Result<Value, CallError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.drops {
                return Err(CallError::connection_lost("socket reset"));
            }
            let a = input["a"].as_i64().unwrap_or(0);
            let b = input["b"].as_i64().unwrap_or(0);
            Ok(json!(a + b))
        }
    }

    async fn run(drops: usize) -> (SharedState, Result<()>, usize) {
        let shared = SharedState::new();
        let mut seed = DeclarativeWorkflowState::new();
        seed.set("Local.x", json!(40)).unwrap();
        seed.save(&shared).await.unwrap();

        let tool = Arc::new(AddTool {
            drops,
            calls: AtomicUsize::new(0),
        });
        let exec = InvokeToolExecutor::new(
            "sum",
            tool.clone(),
            json!({"a": "=Local.x", "b": 2}),
            Some("Local.total".into()),
        );
        let mut ctx = context("sum", &shared);
        let result = exec
            .handle(
                WorkflowMessage::ActionTrigger(ActionTrigger::default()),
                &mut ctx,
            )
            .await;
        (shared, result, tool.calls.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn test_arguments_are_evaluated() {
        let (shared, result, calls) = run(0).await;
        result.unwrap();
        assert_eq!(calls, 1);
        assert_eq!(state(&shared).await.get("Local.total"), Some(json!(42)));
    }

    #[tokio::test]
    async fn test_connection_loss_retried_once() {
        let (shared, result, calls) = run(1).await;
        result.unwrap();
        assert_eq!(calls, 2);
        assert_eq!(state(&shared).await.get("Local.total"), Some(json!(42)));
    }

    #[tokio::test]
    async fn test_second_connection_loss_is_surfaced() {
        let (shared, result, calls) = run(2).await;
        assert_eq!(calls, 2);
        assert!(matches!(result, Err(BatonError::Invocation(ref e)) if e.name == "add"));
        assert_eq!(
            state(&shared).await.get("Local.total"),
            Some(json!({"error": "Connection lost: socket reset"}))
        );
    }
}
