//! Integration tests for handoff orchestration and declarative workflows
//!
//! These tests drive complete workflows through the public API using
//! closure-backed agents.

use baton_rs::adk::agent::{Agent, AgentResponse, FunctionAgent};
use baton_rs::adk::message::{last_message_text, ChatMessage, Content, Role};
use baton_rs::baton::checkpoint::{CheckpointStore, InMemoryCheckpointStore};
use baton_rs::baton::declarative::{DeclarativeWorkflowBuilder, WorkflowLoader};
use baton_rs::baton::handoff::{
    HandoffBuilder, InteractionMode, TerminationCondition, CONVERSATION_STATE_KEY,
};
use baton_rs::baton::workflow::{RunStatus, Workflow, WorkflowRunResult};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ============================================================================
// Helpers
// ============================================================================

/// Agent that always gives the same reply and counts its invocations
fn scripted(name: &str, reply: Vec<Content>, calls: Arc<AtomicUsize>) -> Arc<dyn Agent> {
    Arc::new(FunctionAgent::new(name, move |_messages| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(AgentResponse::new(vec![ChatMessage::new(
            Role::Assistant,
            reply.clone(),
        )]))
    }))
}

fn text(text: &str) -> Vec<Content> {
    vec![Content::Text {
        text: text.to_string(),
    }]
}

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

fn agents_run(result: &WorkflowRunResult) -> Vec<String> {
    result
        .agent_runs()
        .iter()
        .map(|run| run.agent_id.clone())
        .collect()
}

/// Answer the single pending request of a run
async fn answer(workflow: &Workflow, reply: Value) -> WorkflowRunResult {
    let pending = workflow.pending_requests().await;
    assert_eq!(pending.len(), 1, "expected exactly one pending request");
    let mut responses = HashMap::new();
    responses.insert(pending[0].request_id.clone(), reply);
    workflow.send_responses(responses).await.unwrap()
}

// ============================================================================
// Handoff Tests
// ============================================================================

#[tokio::test]
async fn test_tool_call_handoff_beats_text_hint() {
    let triage_reply = vec![
        Content::FunctionCall {
            call_id: "call_1".into(),
            name: "handoff_to_billing".into(),
            arguments: json!({}),
        },
        Content::Text {
            text: "HANDOFF_TO: support".into(),
        },
    ];
    let billing_calls = counter();
    let support_calls = counter();

    let workflow = HandoffBuilder::new("priority")
        .participants(vec![
            scripted("triage", triage_reply, counter()),
            scripted("billing", text("billing here"), billing_calls.clone()),
            scripted("support", text("support here"), support_calls.clone()),
        ])
        .build()
        .unwrap();

    let result = workflow.run("my invoice is wrong").await.unwrap();
    assert_eq!(agents_run(&result), vec!["triage", "billing"]);
    assert_eq!(billing_calls.load(Ordering::SeqCst), 1);
    assert_eq!(support_calls.load(Ordering::SeqCst), 0);
    assert_eq!(result.request_info_events().len(), 1);
    assert_eq!(result.final_status(), RunStatus::IdleWithPendingRequests);
}

fn chain_builder(
    triage_calls: Arc<AtomicUsize>,
    specialist_calls: Arc<AtomicUsize>,
) -> HandoffBuilder {
    HandoffBuilder::new("chain")
        .participants(vec![
            scripted("triage", text("HANDOFF_TO: intake"), triage_calls),
            scripted("intake", text("HANDOFF_TO: specialist"), counter()),
            scripted("specialist", text("specialist here"), specialist_calls),
        ])
        .add_handoff("triage", &["intake"])
        .add_handoff("intake", &["specialist"])
}

#[tokio::test]
async fn test_return_to_previous_routes_to_last_speaker() {
    let triage_calls = counter();
    let specialist_calls = counter();
    let workflow = chain_builder(triage_calls.clone(), specialist_calls.clone())
        .enable_return_to_previous(true)
        .unwrap()
        .build()
        .unwrap();

    let first = workflow.run("hello").await.unwrap();
    assert_eq!(agents_run(&first), vec!["triage", "intake", "specialist"]);

    let second = answer(&workflow, json!("one more thing")).await;
    assert_eq!(agents_run(&second), vec!["specialist"]);
    let third = answer(&workflow, json!("and another")).await;
    assert_eq!(agents_run(&third), vec!["specialist"]);

    assert_eq!(triage_calls.load(Ordering::SeqCst), 1);
    assert_eq!(specialist_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_without_return_to_previous_user_turns_restart_at_coordinator() {
    let triage_calls = counter();
    let workflow = chain_builder(triage_calls.clone(), counter())
        .build()
        .unwrap();

    workflow.run("hello").await.unwrap();
    assert_eq!(triage_calls.load(Ordering::SeqCst), 1);

    let second = answer(&workflow, json!("one more thing")).await;
    assert_eq!(agents_run(&second), vec!["triage", "intake", "specialist"]);
    assert_eq!(triage_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_autonomous_turn_limit_stops_never_ending_worker() {
    let worker_calls = counter();
    let workflow = HandoffBuilder::new("autonomous")
        .participants(vec![scripted(
            "worker",
            text("still working"),
            worker_calls.clone(),
        )])
        .with_interaction_mode(InteractionMode::Autonomous, Some(3))
        .unwrap()
        .with_termination_condition(TerminationCondition::sync(|_| false))
        .build()
        .unwrap();

    let result = workflow.run("go").await.unwrap();
    assert_eq!(worker_calls.load(Ordering::SeqCst), 3);
    assert_eq!(result.outputs().len(), 1);
    assert!(result.request_info_events().is_empty());
    assert_eq!(result.final_status(), RunStatus::Idle);

    let conversation: Vec<ChatMessage> =
        serde_json::from_value(result.outputs()[0].clone()).unwrap();
    assert_eq!(conversation.len(), 4);
}

#[tokio::test]
async fn test_termination_condition_ends_conversation() {
    let workflow = HandoffBuilder::new("short")
        .participants(vec![Arc::new(FunctionAgent::echo("echo")) as Arc<dyn Agent>])
        .with_termination_condition(TerminationCondition::user_message_limit(2))
        .build()
        .unwrap();

    let first = workflow.run("one").await.unwrap();
    assert!(first.outputs().is_empty());

    let second = answer(&workflow, json!("two")).await;
    assert_eq!(second.outputs().len(), 1);
    assert!(workflow.pending_requests().await.is_empty());
}

#[tokio::test]
async fn test_paused_handoff_resumes_in_fresh_workflow() {
    let store: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());
    let builder = HandoffBuilder::new("durable")
        .participants(vec![Arc::new(FunctionAgent::echo("echo")) as Arc<dyn Agent>])
        .with_checkpoint_store(store.clone());

    let original = builder.build().unwrap();
    original.run("first").await.unwrap();
    let checkpoints = original.list_checkpoints().await.unwrap();
    let latest = checkpoints.last().unwrap();
    assert_eq!(latest.pending_requests, 1);

    let restored = builder.build().unwrap();
    restored
        .restore_from_checkpoint(&latest.checkpoint_id)
        .await
        .unwrap();
    assert_eq!(restored.run_id().await, original.run_id().await);

    let result = answer(&restored, json!("second")).await;
    assert_eq!(agents_run(&result), vec!["echo"]);
    assert_eq!(result.agent_runs()[0].response.text(), "second");

    let mirrored = restored
        .shared_state()
        .await
        .get(CONVERSATION_STATE_KEY)
        .await
        .unwrap();
    let conversation: Vec<ChatMessage> = serde_json::from_value(mirrored).unwrap();
    let texts: Vec<String> = conversation.iter().map(|m| m.text_content()).collect();
    assert_eq!(texts, vec!["first", "first", "second", "second"]);
    assert_eq!(last_message_text(&conversation), "second");
}

#[tokio::test]
async fn test_checkpoints_never_store_handoff_conversation() {
    let store: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());
    let builder = HandoffBuilder::new("durable")
        .participants(vec![Arc::new(FunctionAgent::echo("echo")) as Arc<dyn Agent>])
        .with_checkpoint_store(store.clone());

    let original = builder.build().unwrap();
    original.run("secret first message").await.unwrap();

    let mut in_flight = None;
    for info in original.list_checkpoints().await.unwrap() {
        let snapshot = store.restore(&info.checkpoint_id).await.unwrap();
        let queued = serde_json::to_string(&snapshot.queued_messages).unwrap();
        let pending = serde_json::to_string(&snapshot.pending_requests).unwrap();
        assert!(!queued.contains("\"conversation\""), "queued: {}", queued);
        assert!(!pending.contains("\"conversation\""), "pending: {}", pending);
        if queued.contains("user_input_request") {
            in_flight = Some(info.checkpoint_id.clone());
        }
    }

    // Restoring while the request is still queued pauses again and appends
    // the reply to the coordinator's own history.
    let checkpoint_id = in_flight.expect("a checkpoint with a queued user input request");
    let restored = builder.build().unwrap();
    restored.restore_from_checkpoint(&checkpoint_id).await.unwrap();
    restored.resume_stream().into_result().await.unwrap();

    let result = answer(&restored, json!("second")).await;
    assert_eq!(result.agent_runs()[0].response.text(), "second");
    let mirrored = restored
        .shared_state()
        .await
        .get(CONVERSATION_STATE_KEY)
        .await
        .unwrap();
    let conversation: Vec<ChatMessage> = serde_json::from_value(mirrored).unwrap();
    let texts: Vec<String> = conversation.iter().map(|m| m.text_content()).collect();
    assert_eq!(
        texts,
        vec!["secret first message", "secret first message", "second", "second"]
    );
}

// ============================================================================
// Declarative Workflow Tests
// ============================================================================

fn declarative(yaml: &str) -> DeclarativeWorkflowBuilder {
    let definition = WorkflowLoader::parse_yaml(yaml).unwrap();
    let mut agents: HashMap<String, Arc<dyn Agent>> = HashMap::new();
    agents.insert("echo".into(), Arc::new(FunctionAgent::echo("echo")));
    DeclarativeWorkflowBuilder::new(definition).with_agents(agents)
}

#[tokio::test]
async fn test_foreach_with_continue_and_break() {
    let yaml = r#"
kind: Workflow
name: loop
trigger:
  actions:
    - kind: Foreach
      id: each
      items: [1, 2, 3, 4, 5]
      actions:
        - kind: If
          id: skip_two
          condition: =Local.item = 2
          actions:
            - kind: ContinueLoop
              id: skip
        - kind: If
          id: stop_at_four
          condition: =Local.item = 4
          actions:
            - kind: BreakLoop
              id: stop
        - kind: AppendValue
          id: remember
          variable: Local.seen
          value: =Local.item
    - kind: SetVariable
      id: publish
      variable: Workflow.Outputs.seen
      value: =Local.seen
"#;
    let workflow = declarative(yaml).build().unwrap();
    let result = workflow.run("go").await.unwrap();

    assert_eq!(result.outputs(), vec![&json!({"seen": [1, 3]})]);
    assert_eq!(result.final_status(), RunStatus::Idle);
}

#[tokio::test]
async fn test_switch_and_goto() {
    let yaml = r#"
actions:
  - kind: SetVariable
    id: init
    variable: Local.count
    value: 0
  - kind: SetVariable
    id: bump
    variable: Local.count
    value: =Local.count + 1
  - kind: Switch
    id: route
    value: =Local.count
    cases:
      - match: 3
        actions:
          - kind: SetVariable
            id: done
            variable: Workflow.Outputs.count
            value: =Local.count
    default:
      - kind: Goto
        id: again
        actionId: bump
"#;
    let workflow = declarative(yaml).build().unwrap();
    let result = workflow.run("go").await.unwrap();
    assert_eq!(result.outputs(), vec![&json!({"count": 3})]);
}

const GREETER: &str = r#"
kind: Workflow
name: greeter
trigger:
  actions:
    - kind: Question
      id: ask_name
      prompt: "What is your name?"
      variable: Local.name
    - kind: SendActivity
      id: greet
      activity: "Hello {Local.name}"
    - kind: InvokeAzureAgent
      id: echo_back
      agent: echo
      output:
        resultProperty: Local.reply
        autoSend: false
    - kind: SetVariable
      id: publish
      variable: Workflow.Outputs.reply
      value: =Upper(Local.reply)
"#;

#[tokio::test]
async fn test_declarative_question_agent_round_trip() {
    let workflow = declarative(GREETER).build().unwrap();

    let first = workflow.run("start").await.unwrap();
    assert!(first.outputs().is_empty());
    let requests = first.request_info_events();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].source_executor_id, "ask_name");
    assert_eq!(requests[0].request.prompt(), "What is your name?");

    let second = answer(&workflow, json!("Ada")).await;
    assert_eq!(agents_run(&second), vec!["echo"]);
    assert_eq!(
        second.outputs(),
        vec![&json!("Hello Ada"), &json!({"reply": "ADA"})]
    );
    assert_eq!(second.final_status(), RunStatus::Idle);
}

#[tokio::test]
async fn test_declarative_run_resumes_from_checkpoint() {
    let store: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());
    let builder = declarative(GREETER).with_checkpoint_store(store);

    let original = builder.build().unwrap();
    original.run("start").await.unwrap();
    let latest = original.list_checkpoints().await.unwrap().pop().unwrap();

    let restored = builder.build().unwrap();
    restored
        .restore_from_checkpoint(&latest.checkpoint_id)
        .await
        .unwrap();
    let result = answer(&restored, json!("Grace")).await;
    assert_eq!(
        result.outputs(),
        vec![&json!("Hello Grace"), &json!({"reply": "GRACE"})]
    );
}

#[tokio::test]
async fn test_invalid_declarative_definitions_fail_at_build() {
    let dangling = "actions:\n  - kind: Goto\n    id: jump\n    actionId: nowhere\n";
    assert!(declarative(dangling).build().is_err());

    let nested_duplicate = r#"
actions:
  - kind: If
    id: check
    condition: true
    actions:
      - kind: SendActivity
        id: same
        activity: a
    elseActions:
      - kind: SendActivity
        id: same
        activity: b
"#;
    assert!(WorkflowLoader::parse_yaml(nested_duplicate).is_err());

    let unknown_kind = "actions:\n  - kind: LaunchRocket\n    id: boom\n";
    assert!(WorkflowLoader::parse_yaml(unknown_kind).is_err());
}
