// SPDX-License-Identifier: MIT

//! HTTP surface for declarative workflows.
//!
//! Runs are streamed back as server-sent events. The first event of a new
//! run carries the session id that later `responses` calls address.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_stream::StreamExt;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::adk::error::BatonError;
use crate::baton::checkpoint::{CheckpointStore, InMemoryCheckpointStore};
use crate::baton::declarative::{DeclarativeWorkflowBuilder, WorkflowLoader};
use crate::baton::registry::{AgentRegistry, ToolRegistry};
use crate::baton::workflow::{EventStream, Workflow, WorkflowEvent, WorkflowMessage};

#[derive(Clone)]
pub struct AppState {
    workflows_dir: PathBuf,
    agents: AgentRegistry,
    tools: ToolRegistry,
    checkpoint_store: Arc<dyn CheckpointStore>,
    sessions: Arc<RwLock<HashMap<String, Workflow>>>,
}

impl AppState {
    pub fn new(
        workflows_dir: impl Into<PathBuf>,
        agents: AgentRegistry,
        tools: ToolRegistry,
    ) -> Self {
        Self {
            workflows_dir: workflows_dir.into(),
            agents,
            tools,
            checkpoint_store: Arc::new(InMemoryCheckpointStore::new()),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoint_store = store;
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/workflows", get(list_workflows))
        .route("/api/runs", post(create_run))
        .route("/api/runs/{session_id}/responses", post(send_responses))
        .route("/api/runs/{session_id}/checkpoints", get(list_checkpoints))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(port: u16, state: AppState) -> Result<(), BatonError> {
    let app = router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    log::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// JSON error body with a status code
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<BatonError> for ApiError {
    fn from(e: BatonError) -> Self {
        let status = match e {
            BatonError::Build(_) | BatonError::Yaml(_) | BatonError::Json(_) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_workflows(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let loaded = WorkflowLoader::new().load_dir(&state.workflows_dir)?;
    let workflows: Vec<Value> = loaded
        .into_iter()
        .map(|(path, definition)| {
            json!({
                "id": path.file_stem().and_then(|s| s.to_str()).unwrap_or_default(),
                "name": definition.name,
                "description": definition.description,
                "file": path.to_string_lossy(),
            })
        })
        .collect();
    Ok(Json(json!(workflows)))
}

#[derive(Deserialize)]
struct RunRequest {
    workflow_id: String,
    #[serde(default)]
    input: Value,
}

#[derive(Deserialize)]
struct ResponsesRequest {
    /// request id -> reply
    responses: HashMap<String, Value>,
}

fn to_sse(event: &WorkflowEvent) -> Event {
    Event::default().json_data(event).unwrap_or_else(|e| {
        log::error!("Failed to encode event: {}", e);
        Event::default().event("error").data(e.to_string())
    })
}

fn sse_stream(events: EventStream) -> impl Stream<Item = Result<Event, Infallible>> {
    events.map(|event| Ok(to_sse(&event)))
}

fn keep_alive() -> KeepAlive {
    KeepAlive::new().interval(Duration::from_secs(1))
}

async fn build_workflow(state: &AppState, workflow_id: &str) -> Result<Workflow, ApiError> {
    let path = ["yaml", "yml"]
        .iter()
        .map(|ext| state.workflows_dir.join(format!("{}.{}", workflow_id, ext)))
        .find(|p| p.exists())
        .ok_or_else(|| ApiError::not_found(format!("Workflow '{}' not found", workflow_id)))?;

    let definition = WorkflowLoader::new().load_workflow(&path)?;
    let workflow = DeclarativeWorkflowBuilder::new(definition)
        .with_agents(state.agents.snapshot().await)
        .with_tools(state.tools.snapshot().await)
        .with_checkpoint_store(state.checkpoint_store.clone())
        .build()
        .map_err(BatonError::from)?;
    Ok(workflow)
}

async fn create_run(
    State(state): State<AppState>,
    Json(payload): Json<RunRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let workflow = build_workflow(&state, &payload.workflow_id).await?;
    let session_id = uuid::Uuid::new_v4().to_string();
    state
        .sessions
        .write()
        .await
        .insert(session_id.clone(), workflow.clone());
    log::info!(
        "Starting session {} for workflow '{}'",
        session_id,
        payload.workflow_id
    );

    let input = match payload.input {
        Value::String(text) => WorkflowMessage::Text(text),
        other => WorkflowMessage::Value(other),
    };
    let session = Event::default()
        .event("session")
        .data(json!({ "session_id": session_id }).to_string());
    let stream =
        tokio_stream::once(Ok::<_, Infallible>(session)).chain(sse_stream(workflow.run_stream(input)));

    Ok(Sse::new(stream).keep_alive(keep_alive()))
}

async fn session(state: &AppState, session_id: &str) -> Result<Workflow, ApiError> {
    state
        .sessions
        .read()
        .await
        .get(session_id)
        .cloned()
        .ok_or_else(|| ApiError::not_found(format!("Session '{}' not found", session_id)))
}

async fn send_responses(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(payload): Json<ResponsesRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let workflow = session(&state, &session_id).await?;
    log::info!(
        "Session {} received {} responses",
        session_id,
        payload.responses.len()
    );
    let stream = sse_stream(workflow.send_responses_streaming(payload.responses));
    Ok(Sse::new(stream).keep_alive(keep_alive()))
}

async fn list_checkpoints(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let workflow = session(&state, &session_id).await?;
    let checkpoints = workflow.list_checkpoints().await?;
    Ok(Json(json!(checkpoints)))
}
