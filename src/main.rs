// SPDX-License-Identifier: MIT

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::StreamExt;

use baton_rs::adk::agent::{AgentMiddleware, FunctionAgent, LoggingMiddleware, MiddlewareAgent};
use baton_rs::adk::message::value_to_text;
use baton_rs::baton::checkpoint::{CheckpointStore, FileCheckpointStore};
use baton_rs::baton::declarative::{DeclarativeWorkflowBuilder, WorkflowLoader};
use baton_rs::baton::registry::{AgentRegistry, ToolRegistry};
use baton_rs::baton::server::{self, AppState};
use baton_rs::baton::workflow::{EventStream, Workflow, WorkflowEvent};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a declarative workflow, answering its requests on stdin
    Run {
        /// Path to the workflow file
        #[arg(short, long)]
        file: PathBuf,

        /// Input to the workflow
        #[arg(short, long)]
        input: String,

        /// Directory to write checkpoints to
        #[arg(long)]
        checkpoint_dir: Option<PathBuf>,
    },
    /// Continue a run from a saved checkpoint
    Resume {
        #[arg(short, long)]
        file: PathBuf,

        #[arg(long)]
        checkpoint_dir: PathBuf,

        #[arg(long)]
        checkpoint_id: String,
    },
    /// List the checkpoints of a run
    Checkpoints {
        #[arg(long)]
        checkpoint_dir: PathBuf,

        #[arg(long)]
        run_id: String,
    },
    /// Serve workflows over HTTP
    Serve {
        #[arg(short, long, default_value_t = 3000)]
        port: u16,

        #[arg(long, default_value = "workflows")]
        workflows_dir: PathBuf,

        #[arg(long)]
        checkpoint_dir: Option<PathBuf>,
    },
}

/// Agents available to workflows run from the command line. Provider-backed
/// agents are registered by embedding applications.
async fn default_agents() -> AgentRegistry {
    let agents = AgentRegistry::new();
    let middleware: Vec<Arc<dyn AgentMiddleware>> = vec![Arc::new(LoggingMiddleware)];
    let echo = Arc::new(FunctionAgent::echo("echo").with_description("Repeats the last message"));
    agents.register(MiddlewareAgent::wrap(echo, &middleware)).await;
    agents
}

async fn build(
    file: &Path,
    checkpoint_store: Option<Arc<dyn CheckpointStore>>,
) -> anyhow::Result<Workflow> {
    let definition = WorkflowLoader::new()
        .load_workflow(file)
        .with_context(|| format!("loading {}", file.display()))?;
    let mut builder = DeclarativeWorkflowBuilder::new(definition)
        .with_agents(default_agents().await.snapshot().await)
        .with_tools(ToolRegistry::new().snapshot().await);
    if let Some(store) = checkpoint_store {
        builder = builder.with_checkpoint_store(store);
    }
    Ok(builder.build()?)
}

/// Print one segment's events; returns an error if the run failed
async fn print_events(mut events: EventStream) -> anyhow::Result<()> {
    while let Some(event) = events.next().await {
        match event {
            WorkflowEvent::Started { run_id } => log::info!("Run {}", run_id),
            WorkflowEvent::Output(output) => println!("{}", value_to_text(&output.data)),
            WorkflowEvent::AgentRun(run) => {
                log::info!("[{}] {}", run.agent_id, run.response.text())
            }
            WorkflowEvent::Custom { name, data, .. } => println!("event {}: {}", name, data),
            WorkflowEvent::CheckpointSaved {
                checkpoint_id,
                superstep,
            } => log::debug!("Checkpoint {} at superstep {}", checkpoint_id, superstep),
            WorkflowEvent::Failed { error } => eprintln!("Run failed: {}", error),
            _ => {}
        }
    }
    events.into_result().await?;
    Ok(())
}

/// Answer pending requests from stdin until the run goes idle
async fn drive(workflow: &Workflow) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let pending = workflow.pending_requests().await;
        if pending.is_empty() {
            return Ok(());
        }
        let mut responses = HashMap::new();
        for request in pending {
            println!("{}", request.request.prompt());
            let Some(line) = lines.next_line().await? else {
                bail!("stdin closed with {} request(s) pending", responses.len() + 1);
            };
            responses.insert(request.request_id, Value::String(line));
        }
        print_events(workflow.send_responses_streaming(responses)).await?;
    }
}

fn file_store(dir: &Path) -> Arc<dyn CheckpointStore> {
    Arc::new(FileCheckpointStore::new(dir))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    match args.command {
        Commands::Run {
            file,
            input,
            checkpoint_dir,
        } => {
            let workflow = build(&file, checkpoint_dir.as_deref().map(file_store)).await?;
            println!("Running workflow: {}", workflow.name());
            print_events(workflow.run_stream(input)).await?;
            drive(&workflow).await?;
            if checkpoint_dir.is_some() {
                println!("Run id: {}", workflow.run_id().await);
            }
        }
        Commands::Resume {
            file,
            checkpoint_dir,
            checkpoint_id,
        } => {
            let workflow = build(&file, Some(file_store(&checkpoint_dir))).await?;
            workflow.restore_from_checkpoint(&checkpoint_id).await?;
            if workflow.pending_requests().await.is_empty() {
                print_events(workflow.resume_stream()).await?;
            }
            drive(&workflow).await?;
        }
        Commands::Checkpoints {
            checkpoint_dir,
            run_id,
        } => {
            let store = FileCheckpointStore::new(checkpoint_dir);
            for info in store.list_checkpoints(&run_id).await? {
                println!(
                    "{}  superstep {}  {}  pending {}",
                    info.checkpoint_id,
                    info.superstep,
                    info.created_at.to_rfc3339(),
                    info.pending_requests
                );
            }
        }
        Commands::Serve {
            port,
            workflows_dir,
            checkpoint_dir,
        } => {
            let mut state =
                AppState::new(workflows_dir, default_agents().await, ToolRegistry::new());
            if let Some(dir) = &checkpoint_dir {
                state = state.with_checkpoint_store(file_store(dir));
            }
            server::serve(port, state).await?;
        }
    }

    Ok(())
}
