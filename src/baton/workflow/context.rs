// SPDX-License-Identifier: MIT

//! Per-invocation façade handed to an executor's handler.

use crate::adk::error::RunnerError;
use crate::baton::workflow::events::{RequestInfoEvent, WorkflowEvent, WorkflowOutputEvent};
use crate::baton::workflow::message::{Envelope, TraceContext, WorkflowMessage};
use crate::baton::workflow::request::{PendingRequest, RequestPayload};
use crate::baton::workflow::shared_state::SharedState;
use serde_json::Value;

/// Everything a handler produced, collected by the runner afterwards
#[derive(Debug, Default)]
pub struct ContextEffects {
    pub messages: Vec<Envelope>,
    pub events: Vec<WorkflowEvent>,
    pub requests: Vec<PendingRequest>,
    /// `Some` when the handler called `set_state`
    pub state: Option<Value>,
}

/// Context for one handler invocation.
///
/// Bound to the executor being invoked and to the executor(s) whose messages
/// triggered it (several for fan-in deliveries).
pub struct WorkflowContext {
    executor_id: String,
    source_ids: Vec<String>,
    shared_state: SharedState,
    state: Option<Value>,
    state_written: bool,
    trace_context: Option<TraceContext>,
    effects: ContextEffects,
}

impl WorkflowContext {
    /// Fails with [`RunnerError::NoSources`] when `source_ids` is empty
    pub fn new(
        executor_id: impl Into<String>,
        source_ids: Vec<String>,
        shared_state: SharedState,
        state: Option<Value>,
        trace_context: Option<TraceContext>,
    ) -> Result<Self, RunnerError> {
        if source_ids.is_empty() {
            return Err(RunnerError::NoSources);
        }
        Ok(Self {
            executor_id: executor_id.into(),
            source_ids,
            shared_state,
            state,
            state_written: false,
            trace_context,
            effects: ContextEffects::default(),
        })
    }

    pub fn executor_id(&self) -> &str {
        &self.executor_id
    }

    pub fn source_ids(&self) -> &[String] {
        &self.source_ids
    }

    /// Queue a message; `None` broadcasts over the executor's outgoing edges.
    /// Messages from one invocation keep their emission order.
    pub fn send_message(&mut self, data: WorkflowMessage, target_id: Option<&str>) {
        let mut envelope = Envelope::new(data, self.executor_id.clone())
            .with_trace(self.trace_context.as_ref().map(|t| t.child()));
        if let Some(target) = target_id {
            envelope = envelope.to(target);
        }
        self.effects.messages.push(envelope);
    }

    /// Emit workflow output. This is an event, not a message.
    pub fn yield_output(&mut self, data: Value) {
        self.effects
            .events
            .push(WorkflowEvent::Output(WorkflowOutputEvent {
                source_executor_id: self.executor_id.clone(),
                data,
            }));
    }

    pub fn add_event(&mut self, event: WorkflowEvent) {
        self.effects.events.push(event);
    }

    /// Pause for external input; returns the request id to answer
    pub fn request_info(&mut self, request: RequestPayload) -> String {
        let request_id = uuid::Uuid::new_v4().to_string();
        log::info!(
            "Executor '{}' requested external input ({})",
            self.executor_id,
            request_id
        );
        self.effects
            .events
            .push(WorkflowEvent::RequestInfo(RequestInfoEvent {
                request_id: request_id.clone(),
                source_executor_id: self.executor_id.clone(),
                request: request.clone(),
            }));
        self.effects.requests.push(PendingRequest {
            request_id: request_id.clone(),
            source_executor_id: self.executor_id.clone(),
            request,
        });
        request_id
    }

    pub async fn get_shared_state(&self, key: &str) -> Option<Value> {
        self.shared_state.get(key).await
    }

    pub async fn set_shared_state(&self, key: impl Into<String>, value: Value) {
        self.shared_state.set(key, value).await
    }

    pub async fn delete_shared_state(&self, key: &str) -> Option<Value> {
        self.shared_state.delete(key).await
    }

    pub fn shared_state(&self) -> &SharedState {
        &self.shared_state
    }

    /// This executor's checkpoint slot
    pub fn get_state(&self) -> Option<Value> {
        self.state.clone()
    }

    /// Replace the checkpoint slot wholesale
    pub fn set_state(&mut self, value: Value) {
        self.state = Some(value);
        self.state_written = true;
    }

    pub fn into_effects(mut self) -> ContextEffects {
        if self.state_written {
            self.effects.state = self.state.take();
        }
        self.effects
    }
}
