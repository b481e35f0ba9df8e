// SPDX-License-Identifier: MIT

//! Lifecycle events and the stream that carries them out of a run.

use crate::adk::agent::AgentResponse;
use crate::adk::error::{BatonError, Result, RunnerError};
use crate::baton::workflow::request::RequestPayload;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

/// Where a run stands after the last superstep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Idle,
    IdleWithPendingRequests,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestInfoEvent {
    pub request_id: String,
    pub source_executor_id: String,
    pub request: RequestPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowOutputEvent {
    pub source_executor_id: String,
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRunEvent {
    pub executor_id: String,
    pub agent_id: String,
    pub response: AgentResponse,
}

/// Events yielded by `run_stream` and `send_responses_streaming`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    Started {
        run_id: String,
    },
    Status {
        status: RunStatus,
    },
    ExecutorInvoked {
        executor_id: String,
        message_kind: String,
    },
    ExecutorCompleted {
        executor_id: String,
    },
    AgentRun(AgentRunEvent),
    RequestInfo(RequestInfoEvent),
    Output(WorkflowOutputEvent),
    Custom {
        executor_id: String,
        name: String,
        #[serde(default)]
        data: Value,
    },
    CheckpointSaved {
        checkpoint_id: String,
        superstep: usize,
    },
    Failed {
        error: String,
    },
}

/// Terminal fold of an event stream
#[derive(Debug, Clone, Default)]
pub struct WorkflowRunResult {
    pub events: Vec<WorkflowEvent>,
    pub status: Option<RunStatus>,
}

impl WorkflowRunResult {
    pub fn outputs(&self) -> Vec<&Value> {
        self.events
            .iter()
            .filter_map(|e| match e {
                WorkflowEvent::Output(out) => Some(&out.data),
                _ => None,
            })
            .collect()
    }

    pub fn request_info_events(&self) -> Vec<&RequestInfoEvent> {
        self.events
            .iter()
            .filter_map(|e| match e {
                WorkflowEvent::RequestInfo(req) => Some(req),
                _ => None,
            })
            .collect()
    }

    pub fn agent_runs(&self) -> Vec<&AgentRunEvent> {
        self.events
            .iter()
            .filter_map(|e| match e {
                WorkflowEvent::AgentRun(run) => Some(run),
                _ => None,
            })
            .collect()
    }

    pub fn final_status(&self) -> RunStatus {
        self.status.unwrap_or(RunStatus::Idle)
    }
}

/// Finite stream of events from one run segment.
///
/// Dropping the stream does not stop the run; call [`EventStream::cancel`]
/// for that. [`EventStream::into_result`] drains the remaining events and
/// surfaces the run task's error, if any.
pub struct EventStream {
    events: ReceiverStream<WorkflowEvent>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<Result<()>>>,
}

impl EventStream {
    pub(crate) fn new(
        events: ReceiverStream<WorkflowEvent>,
        cancel: CancellationToken,
        handle: JoinHandle<Result<()>>,
    ) -> Self {
        Self {
            events,
            cancel,
            handle: Some(handle),
        }
    }

    /// Request cooperative cancellation; checked between supersteps
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drain the stream and fold it into a [`WorkflowRunResult`]
    pub async fn into_result(mut self) -> Result<WorkflowRunResult> {
        let mut result = WorkflowRunResult::default();
        while let Some(event) = self.events.next().await {
            if let WorkflowEvent::Status { status } = &event {
                result.status = Some(*status);
            }
            result.events.push(event);
        }

        if let Some(handle) = self.handle.take() {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e),
                Err(join) => {
                    return Err(BatonError::Runner(RunnerError::TaskFailed(
                        join.to_string(),
                    )))
                }
            }
        }
        Ok(result)
    }
}

impl Stream for EventStream {
    type Item = WorkflowEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().events).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_into_result_collects_events_and_status() {
        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(async move {
            let _ = tx
                .send(WorkflowEvent::Output(WorkflowOutputEvent {
                    source_executor_id: "a".into(),
                    data: json!("done"),
                }))
                .await;
            let _ = tx
                .send(WorkflowEvent::Status {
                    status: RunStatus::Idle,
                })
                .await;
            Ok(())
        });

        let stream = EventStream::new(ReceiverStream::new(rx), CancellationToken::new(), handle);
        let result = stream.into_result().await.unwrap();
        assert_eq!(result.outputs(), vec![&json!("done")]);
        assert_eq!(result.final_status(), RunStatus::Idle);
    }

    #[tokio::test]
    async fn test_into_result_surfaces_task_error() {
        let (_tx, rx) = mpsc::channel::<WorkflowEvent>(1);
        let handle = tokio::spawn(async move { Err(BatonError::other("boom")) });
        drop(_tx);

        let stream = EventStream::new(ReceiverStream::new(rx), CancellationToken::new(), handle);
        let err = stream.into_result().await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = WorkflowEvent::CheckpointSaved {
            checkpoint_id: "c1".into(),
            superstep: 3,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "checkpoint_saved");
        assert_eq!(value["superstep"], 3);
    }
}
