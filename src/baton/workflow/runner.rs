// SPDX-License-Identifier: MIT

//! Superstep runner
//!
//! A run proceeds in supersteps. Each superstep routes every queued envelope
//! over the graph, groups the resulting deliveries by target, runs distinct
//! targets concurrently and the deliveries of one target sequentially, then
//! queues everything the handlers emitted for the next superstep. A run
//! segment ends when the queue is empty; it is resumed by answering pending
//! requests with [`Workflow::send_responses_streaming`].

use crate::adk::error::{BatonError, Result, RunnerError};
use crate::baton::checkpoint::{
    checkpoint_envelope, decode_checkpoint_value, encode_checkpoint_value, CheckpointInfo,
    CheckpointStore, WorkflowSnapshot,
};
use crate::baton::workflow::config::{ObservabilityConfig, RunnerConfig};
use crate::baton::workflow::context::{ContextEffects, WorkflowContext};
use crate::baton::workflow::edge::Edge;
use crate::baton::workflow::events::{EventStream, RunStatus, WorkflowEvent, WorkflowRunResult};
use crate::baton::workflow::executor::Executor;
use crate::baton::workflow::message::{BatchItem, Envelope, TraceContext, WorkflowMessage};
use crate::baton::workflow::request::{ExternalResponse, PendingRequest};
use crate::baton::workflow::shared_state::SharedState;
use futures::future::join_all;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

/// Source id of the message that starts a run
pub const WORKFLOW_INPUT_SOURCE: &str = "__workflow_input__";
/// Source id of replies delivered by `send_responses_streaming`
pub const EXTERNAL_RESPONSE_SOURCE: &str = "__external_response__";

fn is_synthetic_source(source_id: &str) -> bool {
    source_id == WORKFLOW_INPUT_SOURCE || source_id == EXTERNAL_RESPONSE_SOURCE
}

/// Mutable state of the current run, guarded so only one segment runs at a time
struct RunState {
    run_id: String,
    shared_state: SharedState,
    executor_states: HashMap<String, Value>,
    pending_requests: Vec<PendingRequest>,
    /// Fan-in buffers keyed by edge index
    fan_in: HashMap<usize, HashMap<String, WorkflowMessage>>,
    superstep: usize,
    /// Messages restored from a checkpoint that still await delivery
    queued: Vec<Envelope>,
}

impl RunState {
    fn fresh() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            shared_state: SharedState::new(),
            executor_states: HashMap::new(),
            pending_requests: Vec::new(),
            fan_in: HashMap::new(),
            superstep: 0,
            queued: Vec::new(),
        }
    }
}

enum Segment {
    Fresh(WorkflowMessage),
    Responses(HashMap<String, Value>),
    Resume,
}

struct Delivery {
    executor: Arc<dyn Executor>,
    target: String,
    sources: Vec<String>,
    message: WorkflowMessage,
    trace: Option<TraceContext>,
}

struct DeliveryOutcome {
    executor_id: String,
    effects: Vec<ContextEffects>,
    state: Option<Value>,
    error: Option<BatonError>,
}

struct WorkflowInner {
    name: String,
    executors: HashMap<String, Arc<dyn Executor>>,
    edges: Vec<Edge>,
    start_executor_id: String,
    checkpoint_store: Option<Arc<dyn CheckpointStore>>,
    config: RunnerConfig,
    state: Mutex<RunState>,
}

/// A built workflow graph. Cheap to clone; clones share the same run.
#[derive(Clone)]
pub struct Workflow {
    inner: Arc<WorkflowInner>,
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}

async fn emit(tx: &mpsc::Sender<WorkflowEvent>, event: WorkflowEvent) {
    // A dropped receiver only means nobody is listening any more
    let _ = tx.send(event).await;
}

impl Workflow {
    pub(crate) fn new(
        name: String,
        executors: HashMap<String, Arc<dyn Executor>>,
        edges: Vec<Edge>,
        start_executor_id: String,
        checkpoint_store: Option<Arc<dyn CheckpointStore>>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(WorkflowInner {
                name,
                executors,
                edges,
                start_executor_id,
                checkpoint_store,
                config,
                state: Mutex::new(RunState::fresh()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn start_executor_id(&self) -> &str {
        &self.inner.start_executor_id
    }

    pub fn executor_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.executors.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn edges(&self) -> &[Edge] {
        &self.inner.edges
    }

    pub fn checkpoint_store(&self) -> Option<Arc<dyn CheckpointStore>> {
        self.inner.checkpoint_store.clone()
    }

    // The accessors below wait for an in-flight segment to finish.

    pub async fn run_id(&self) -> String {
        self.inner.state.lock().await.run_id.clone()
    }

    pub async fn shared_state(&self) -> SharedState {
        self.inner.state.lock().await.shared_state.clone()
    }

    pub async fn pending_requests(&self) -> Vec<PendingRequest> {
        self.inner.state.lock().await.pending_requests.clone()
    }

    /// Last `set_state` payload of an executor
    pub async fn executor_state(&self, executor_id: &str) -> Option<Value> {
        self.inner
            .state
            .lock()
            .await
            .executor_states
            .get(executor_id)
            .cloned()
    }

    /// Start a fresh run and stream its events
    pub fn run_stream(&self, input: impl Into<WorkflowMessage>) -> EventStream {
        self.spawn_segment(Segment::Fresh(input.into()))
    }

    /// Start a fresh run and wait for it to go idle
    pub async fn run(&self, input: impl Into<WorkflowMessage>) -> Result<WorkflowRunResult> {
        self.run_stream(input).into_result().await
    }

    /// Answer pending requests (request id -> reply) and continue the run
    pub fn send_responses_streaming(&self, responses: HashMap<String, Value>) -> EventStream {
        self.spawn_segment(Segment::Responses(responses))
    }

    pub async fn send_responses(
        &self,
        responses: HashMap<String, Value>,
    ) -> Result<WorkflowRunResult> {
        self.send_responses_streaming(responses).into_result().await
    }

    /// Deliver messages restored from a checkpoint without answering requests
    pub fn resume_stream(&self) -> EventStream {
        self.spawn_segment(Segment::Resume)
    }

    /// Load a checkpoint from the configured store into this workflow
    pub async fn restore_from_checkpoint(&self, checkpoint_id: &str) -> Result<()> {
        let store = self
            .inner
            .checkpoint_store
            .clone()
            .ok_or(RunnerError::NoCheckpointStore)?;
        let snapshot = store.restore(checkpoint_id).await?;
        self.restore_snapshot(snapshot).await
    }

    pub async fn restore_snapshot(&self, snapshot: WorkflowSnapshot) -> Result<()> {
        let mut state = self.inner.state.lock().await;

        let pending = snapshot
            .pending_requests
            .iter()
            .map(decode_checkpoint_value::<PendingRequest>)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for (executor_id, value) in snapshot.executor_checkpoints {
            match self.inner.executors.get(&executor_id) {
                Some(executor) => executor.on_checkpoint_restore(value).await?,
                None => log::warn!(
                    "Checkpoint references unknown executor '{}', ignoring",
                    executor_id
                ),
            }
        }

        state.shared_state.restore(snapshot.shared_state).await;
        state.run_id = snapshot.run_id;
        state.superstep = snapshot.superstep;
        state.executor_states = snapshot.executor_states;
        state.pending_requests = pending;
        state.queued = snapshot.queued_messages;
        state.fan_in.clear();

        log::info!(
            "Restored workflow '{}' run {} at superstep {} ({} pending requests)",
            self.inner.name,
            state.run_id,
            state.superstep,
            state.pending_requests.len()
        );
        Ok(())
    }

    /// Checkpoints of the current run
    pub async fn list_checkpoints(&self) -> Result<Vec<CheckpointInfo>> {
        let store = self
            .inner
            .checkpoint_store
            .clone()
            .ok_or(RunnerError::NoCheckpointStore)?;
        let run_id = self.run_id().await;
        Ok(store.list_checkpoints(&run_id).await?)
    }

    fn spawn_segment(&self, segment: Segment) -> EventStream {
        let (tx, rx) = mpsc::channel(self.inner.config.event_channel_capacity.max(1));
        let cancel = CancellationToken::new();
        let inner = self.inner.clone();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut state = inner.state.lock().await;
            let result = inner.run_segment(&mut state, segment, &tx, &token).await;
            if let Err(e) = &result {
                log::error!("Workflow '{}' failed: {}", inner.name, e);
                emit(&tx, WorkflowEvent::Failed {
                    error: e.to_string(),
                })
                .await;
                emit(&tx, WorkflowEvent::Status {
                    status: RunStatus::Failed,
                })
                .await;
            }
            result
        });

        EventStream::new(ReceiverStream::new(rx), cancel, handle)
    }
}

impl WorkflowInner {
    fn executor(&self, id: &str) -> std::result::Result<Arc<dyn Executor>, RunnerError> {
        self.executors
            .get(id)
            .cloned()
            .ok_or_else(|| RunnerError::UnknownExecutor(id.to_string()))
    }

    async fn run_segment(
        &self,
        state: &mut RunState,
        segment: Segment,
        tx: &mpsc::Sender<WorkflowEvent>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let queue = match segment {
            Segment::Fresh(input) => {
                *state = RunState::fresh();
                log::info!("Starting workflow '{}' run {}", self.name, state.run_id);
                emit(tx, WorkflowEvent::Started {
                    run_id: state.run_id.clone(),
                })
                .await;
                vec![Envelope::new(input, WORKFLOW_INPUT_SOURCE)
                    .to(self.start_executor_id.clone())
                    .with_trace(Some(TraceContext::new_root()))]
            }
            Segment::Responses(mut responses) => {
                if let Some(unknown) = responses
                    .keys()
                    .find(|id| !state.pending_requests.iter().any(|p| &p.request_id == *id))
                {
                    return Err(RunnerError::UnknownRequest(unknown.clone()).into());
                }

                let mut queue = std::mem::take(&mut state.queued);
                let mut still_pending = Vec::new();
                for pending in std::mem::take(&mut state.pending_requests) {
                    match responses.remove(&pending.request_id) {
                        Some(response) => {
                            let target = pending.source_executor_id;
                            let message = WorkflowMessage::Response(ExternalResponse {
                                request_id: pending.request_id,
                                request: pending.request,
                                response,
                            });
                            queue.push(
                                Envelope::new(message, EXTERNAL_RESPONSE_SOURCE)
                                    .to(target)
                                    .with_trace(Some(TraceContext::new_root())),
                            );
                        }
                        None => still_pending.push(pending),
                    }
                }
                state.pending_requests = still_pending;
                log::info!(
                    "Resuming workflow '{}' run {} with {} responses",
                    self.name,
                    state.run_id,
                    queue.len()
                );
                queue
            }
            Segment::Resume => std::mem::take(&mut state.queued),
        };

        emit(tx, WorkflowEvent::Status {
            status: RunStatus::Running,
        })
        .await;
        self.drive(state, queue, tx, cancel).await
    }

    async fn drive(
        &self,
        state: &mut RunState,
        mut queue: Vec<Envelope>,
        tx: &mpsc::Sender<WorkflowEvent>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut steps = 0usize;

        while !queue.is_empty() {
            if cancel.is_cancelled() {
                log::warn!(
                    "Run {} cancelled, discarding {} undelivered messages",
                    state.run_id,
                    queue.len()
                );
                emit(tx, WorkflowEvent::Status {
                    status: RunStatus::Cancelled,
                })
                .await;
                return Ok(());
            }
            if steps >= self.config.max_supersteps {
                return Err(RunnerError::MaxSupersteps(self.config.max_supersteps).into());
            }
            steps += 1;
            state.superstep += 1;

            let deliveries = self.route(state, queue)?;
            log::debug!(
                "Superstep {}: {} deliveries",
                state.superstep,
                deliveries.len()
            );

            let mut groups: Vec<(String, Vec<Delivery>)> = Vec::new();
            for delivery in deliveries {
                match groups.iter_mut().find(|(t, _)| *t == delivery.target) {
                    Some((_, group)) => group.push(delivery),
                    None => groups.push((delivery.target.clone(), vec![delivery])),
                }
            }

            let runs = groups.into_iter().map(|(target, deliveries)| {
                let slot = state.executor_states.get(&target).cloned();
                run_deliveries(
                    deliveries,
                    slot,
                    state.shared_state.clone(),
                    self.config.observability.clone(),
                )
            });
            let outcomes = join_all(runs).await;

            let mut next = Vec::new();
            let mut failure = None;
            for outcome in outcomes {
                if let Some(value) = outcome.state {
                    state.executor_states.insert(outcome.executor_id.clone(), value);
                }
                for effects in outcome.effects {
                    for event in effects.events {
                        emit(tx, event).await;
                    }
                    state.pending_requests.extend(effects.requests);
                    next.extend(effects.messages);
                }
                if let Some(e) = outcome.error {
                    failure.get_or_insert(e);
                }
            }
            if let Some(e) = failure {
                return Err(e);
            }

            queue = next;
            self.save_checkpoint(state, &queue, tx).await?;
        }

        let status = if state.pending_requests.is_empty() {
            RunStatus::Idle
        } else {
            RunStatus::IdleWithPendingRequests
        };
        log::info!(
            "Workflow '{}' run {} is {:?} after superstep {}",
            self.name,
            state.run_id,
            status,
            state.superstep
        );
        emit(tx, WorkflowEvent::Status { status }).await;
        Ok(())
    }

    fn route(
        &self,
        state: &mut RunState,
        queue: Vec<Envelope>,
    ) -> std::result::Result<Vec<Delivery>, RunnerError> {
        let mut deliveries = Vec::new();

        for envelope in queue {
            let kind = envelope.data.kind();
            let trace = envelope
                .trace_context
                .clone()
                .or_else(|| Some(TraceContext::new_root()));

            if let Some(target) = &envelope.target_id {
                let executor = self.executor(target)?;
                let wired = self.edges.iter().any(|edge| {
                    matches!(edge, Edge::Direct { source, target: t, .. }
                        if *source == envelope.source_id && t == target)
                });
                if !wired && !is_synthetic_source(&envelope.source_id) {
                    return Err(RunnerError::NoEdge {
                        source_id: envelope.source_id.clone(),
                        target_id: target.clone(),
                    });
                }
                if !executor.accepts(kind) {
                    return Err(RunnerError::UnsupportedMessage {
                        executor_id: target.clone(),
                        kind: kind.to_string(),
                    });
                }
                deliveries.push(Delivery {
                    executor,
                    target: target.clone(),
                    sources: vec![envelope.source_id.clone()],
                    message: envelope.data,
                    trace,
                });
                continue;
            }

            let mut routed = false;
            for (index, edge) in self.edges.iter().enumerate() {
                if !edge.has_source(&envelope.source_id) {
                    continue;
                }
                let executor = self.executor(edge.target())?;
                match edge {
                    Edge::Direct { target, .. } => {
                        if !edge.accepts(&envelope.data) {
                            continue;
                        }
                        if !executor.accepts(kind) {
                            log::debug!(
                                "Skipping {} message from '{}' to '{}': no handler",
                                kind,
                                envelope.source_id,
                                target
                            );
                            continue;
                        }
                        routed = true;
                        deliveries.push(Delivery {
                            executor,
                            target: target.clone(),
                            sources: vec![envelope.source_id.clone()],
                            message: envelope.data.clone(),
                            trace: trace.clone(),
                        });
                    }
                    Edge::FanIn { sources, target } => {
                        routed = true;
                        let complete = {
                            let buffer = state.fan_in.entry(index).or_default();
                            buffer.insert(envelope.source_id.clone(), envelope.data.clone());
                            sources.iter().all(|s| buffer.contains_key(s))
                        };
                        if !complete {
                            continue;
                        }
                        let mut buffer = state.fan_in.remove(&index).unwrap_or_default();
                        let items = sources
                            .iter()
                            .filter_map(|s| {
                                buffer.remove(s).map(|data| BatchItem {
                                    source_id: s.clone(),
                                    data,
                                })
                            })
                            .collect();
                        if !executor.accepts(crate::baton::workflow::message::MessageKind::Batch)
                        {
                            log::warn!("Fan-in target '{}' does not accept batches", target);
                            continue;
                        }
                        deliveries.push(Delivery {
                            executor,
                            target: target.clone(),
                            sources: sources.clone(),
                            message: WorkflowMessage::Batch(items),
                            trace: trace.clone(),
                        });
                    }
                }
            }
            if !routed {
                log::debug!(
                    "{} message from '{}' has no matching successor",
                    kind,
                    envelope.source_id
                );
            }
        }

        Ok(deliveries)
    }

    async fn save_checkpoint(
        &self,
        state: &RunState,
        queue: &[Envelope],
        tx: &mpsc::Sender<WorkflowEvent>,
    ) -> Result<()> {
        let Some(store) = &self.checkpoint_store else {
            return Ok(());
        };

        let mut executor_checkpoints = HashMap::new();
        for (id, executor) in &self.executors {
            if let Some(value) = executor.on_checkpoint_save().await {
                executor_checkpoints.insert(id.clone(), value);
            }
        }
        let pending_requests = state
            .pending_requests
            .iter()
            .map(encode_checkpoint_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let snapshot = WorkflowSnapshot {
            run_id: state.run_id.clone(),
            workflow_name: self.name.clone(),
            superstep: state.superstep,
            created_at: chrono::Utc::now(),
            executor_states: state.executor_states.clone(),
            executor_checkpoints,
            shared_state: state.shared_state.snapshot().await,
            pending_requests,
            queued_messages: queue.iter().map(checkpoint_envelope).collect(),
        };

        let checkpoint_id = store.save(&state.run_id, &snapshot).await?;
        log::debug!(
            "Checkpoint {} saved at superstep {}",
            checkpoint_id,
            state.superstep
        );
        emit(tx, WorkflowEvent::CheckpointSaved {
            checkpoint_id,
            superstep: state.superstep,
        })
        .await;
        Ok(())
    }
}

async fn run_deliveries(
    deliveries: Vec<Delivery>,
    mut slot: Option<Value>,
    shared_state: SharedState,
    observability: ObservabilityConfig,
) -> DeliveryOutcome {
    let executor_id = deliveries
        .first()
        .map(|d| d.target.clone())
        .unwrap_or_default();
    let mut outcome = DeliveryOutcome {
        executor_id: executor_id.clone(),
        effects: Vec::new(),
        state: None,
        error: None,
    };

    for delivery in deliveries {
        let kind = delivery.message.kind();
        if observability.log_payloads {
            log::debug!("'{}' <- {:?}", executor_id, delivery.message);
        }

        let mut ctx = match WorkflowContext::new(
            executor_id.clone(),
            delivery.sources,
            shared_state.clone(),
            slot.clone(),
            delivery.trace,
        ) {
            Ok(ctx) => ctx,
            Err(e) => {
                outcome.error = Some(e.into());
                break;
            }
        };

        if observability.executor_events {
            ctx.add_event(WorkflowEvent::ExecutorInvoked {
                executor_id: executor_id.clone(),
                message_kind: kind.to_string(),
            });
        }
        let result = delivery.executor.handle(delivery.message, &mut ctx).await;
        if observability.executor_events && result.is_ok() {
            ctx.add_event(WorkflowEvent::ExecutorCompleted {
                executor_id: executor_id.clone(),
            });
        }

        let effects = ctx.into_effects();
        if let Some(value) = &effects.state {
            slot = Some(value.clone());
            outcome.state = Some(value.clone());
        }
        outcome.effects.push(effects);

        if let Err(e) = result {
            log::error!("Executor '{}' failed on {} message: {}", executor_id, kind, e);
            outcome.error = Some(e);
            break;
        }
    }

    outcome
}
