// SPDX-License-Identifier: MIT

//! Compiles a [`WorkflowDefinition`] into an executor graph.
//!
//! Actions in a list are chained with direct edges from each action's exit
//! node to the next action's entry. Structured actions get conditional edges
//! into their bodies and a join or exit node their successor hangs off.
//! Control that jumps (Goto, BreakLoop, ContinueLoop, EndWorkflow) uses
//! explicitly targeted messages over dedicated edges.

use crate::adk::agent::Agent;
use crate::adk::error::BuildError;
use crate::adk::tool::Tool;
use crate::baton::checkpoint::CheckpointStore;
use crate::baton::declarative::actions::{Action, ActionKind, ConditionalAction, InputAction};
use crate::baton::declarative::executors::{
    branch_condition, exit_id, iteration_condition, join_id, next_id, BasicActionExecutor,
    ConditionExecutor, EndExecutor, ExternalInputExecutor, ForeachInitExecutor,
    ForeachNextExecutor, GotoExecutor, InvokeAgentExecutor, InvokeToolExecutor, JoinExecutor,
    LoopControlExecutor, StartExecutor, END_ID, START_ID,
};
use crate::baton::declarative::loader::WorkflowDefinition;
use crate::baton::declarative::protocol::LoopAction;
use crate::baton::workflow::request::ExternalInputKind;
use crate::baton::workflow::{RunnerConfig, Workflow, WorkflowBuilder};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub struct DeclarativeWorkflowBuilder {
    definition: WorkflowDefinition,
    agents: HashMap<String, Arc<dyn Agent>>,
    tools: HashMap<String, Arc<dyn Tool>>,
    checkpoint_store: Option<Arc<dyn CheckpointStore>>,
    config: RunnerConfig,
}

impl DeclarativeWorkflowBuilder {
    pub fn new(definition: WorkflowDefinition) -> Self {
        Self {
            definition,
            agents: HashMap::new(),
            tools: HashMap::new(),
            checkpoint_store: None,
            config: RunnerConfig::default(),
        }
    }

    pub fn with_agents(mut self, agents: HashMap<String, Arc<dyn Agent>>) -> Self {
        self.agents.extend(agents);
        self
    }

    pub fn with_tools(mut self, tools: HashMap<String, Arc<dyn Tool>>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoint_store = Some(store);
        self
    }

    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the definition and wire the graph. Repeatable; every call
    /// produces fresh executors.
    pub fn build(&self) -> Result<Workflow, BuildError> {
        let mut declared = HashSet::new();
        collect_ids(&self.definition.actions, &mut declared)?;

        let mut compiler = Compiler {
            agents: &self.agents,
            tools: &self.tools,
            declared: &declared,
            graph: WorkflowBuilder::new(self.definition.name.clone()),
        };
        compiler.graph.add_executor(Arc::new(StartExecutor::new()));
        compiler.graph.add_executor(Arc::new(EndExecutor::new()));

        let entry = compiler.compile_list(&self.definition.actions, END_ID, None)?;
        compiler.graph.add_edge(START_ID, entry);
        compiler.graph.set_start_executor(START_ID);
        if let Some(store) = &self.checkpoint_store {
            compiler.graph.with_checkpoint_store(store.clone());
        }
        compiler.graph.with_config(self.config.clone());

        log::info!(
            "Compiled declarative workflow '{}' ({} top-level actions)",
            self.definition.name,
            self.definition.actions.len()
        );
        compiler.graph.build()
    }
}

/// Every action id, rejecting duplicates anywhere in the tree
fn collect_ids<'a>(actions: &'a [Action], ids: &mut HashSet<&'a str>) -> Result<(), BuildError> {
    for action in actions {
        if !ids.insert(action.id.as_str()) {
            return Err(BuildError::DuplicateActionId(action.id.clone()));
        }
        for child in action.children() {
            collect_ids(child, ids)?;
        }
    }
    Ok(())
}

struct Compiler<'a> {
    agents: &'a HashMap<String, Arc<dyn Agent>>,
    tools: &'a HashMap<String, Arc<dyn Tool>>,
    declared: &'a HashSet<&'a str>,
    graph: WorkflowBuilder,
}

impl<'a> Compiler<'a> {
    /// Wire a list whose last action falls through to `successor`; returns
    /// the id control should enter the list at
    fn compile_list(
        &mut self,
        actions: &[Action],
        successor: &str,
        enclosing_loop: Option<&str>,
    ) -> Result<String, BuildError> {
        for (index, action) in actions.iter().enumerate() {
            let exit = self.compile_action(action, enclosing_loop)?;
            if let Some(exit) = exit {
                let next = actions
                    .get(index + 1)
                    .map(|a| a.id.as_str())
                    .unwrap_or(successor);
                self.graph.add_edge(exit, next);
            }
        }
        Ok(actions
            .first()
            .map(|a| a.id.clone())
            .unwrap_or_else(|| successor.to_string()))
    }

    /// Add the executors of one action; returns the node its successor is
    /// wired from, or `None` when control never falls through
    fn compile_action(
        &mut self,
        action: &Action,
        enclosing_loop: Option<&str>,
    ) -> Result<Option<String>, BuildError> {
        let id = action.id.as_str();
        match &action.kind {
            ActionKind::SetVariable { .. }
            | ActionKind::SetTextVariable { .. }
            | ActionKind::SetMultipleVariables { .. }
            | ActionKind::AppendValue { .. }
            | ActionKind::ResetVariable { .. }
            | ActionKind::ClearAllVariables { .. }
            | ActionKind::SendActivity { .. }
            | ActionKind::EmitEvent { .. } => {
                self.graph
                    .add_executor(Arc::new(BasicActionExecutor::new(id, action.kind.clone())));
                Ok(Some(id.to_string()))
            }
            ActionKind::EndWorkflow | ActionKind::EndConversation => {
                self.graph
                    .add_executor(Arc::new(BasicActionExecutor::new(id, action.kind.clone())));
                self.graph.add_edge(id, END_ID);
                Ok(None)
            }
            ActionKind::If(conditional)
            | ActionKind::Switch(conditional)
            | ActionKind::ConditionGroup(conditional) => {
                self.compile_conditional(id, conditional, enclosing_loop)
                    .map(Some)
            }
            ActionKind::Foreach(foreach) => {
                let next = next_id(id);
                let exit = exit_id(id);
                self.graph.add_executor(Arc::new(ForeachInitExecutor::new(
                    id,
                    foreach.items.clone(),
                    foreach.item_variable.clone(),
                    foreach.index_variable.clone(),
                )));
                self.graph.add_executor(Arc::new(ForeachNextExecutor::new(
                    id,
                    foreach.item_variable.clone(),
                    foreach.index_variable.clone(),
                )));
                self.graph.add_executor(Arc::new(JoinExecutor::new(exit.clone())));

                let body = self.compile_list(&foreach.actions, &next, Some(id))?;
                for source in [id.to_string(), next] {
                    self.graph
                        .add_conditional_edge(source.clone(), body.clone(), iteration_condition(true));
                    self.graph
                        .add_conditional_edge(source, exit.clone(), iteration_condition(false));
                }
                Ok(Some(exit))
            }
            ActionKind::BreakLoop | ActionKind::ContinueLoop => {
                let loop_id =
                    enclosing_loop.ok_or_else(|| BuildError::LoopControlOutsideLoop(id.to_string()))?;
                let loop_action = if action.kind == ActionKind::BreakLoop {
                    LoopAction::Break
                } else {
                    LoopAction::Continue
                };
                self.graph
                    .add_executor(Arc::new(LoopControlExecutor::new(id, loop_action, loop_id)));
                self.graph.add_edge(id, next_id(loop_id));
                Ok(None)
            }
            ActionKind::Goto { target } => {
                if target == id {
                    return Err(BuildError::SelfReferencingGoto(id.to_string()));
                }
                if !self.declared.contains(target.as_str()) {
                    return Err(BuildError::DanglingGoto {
                        action_id: id.to_string(),
                        target: target.clone(),
                    });
                }
                self.graph
                    .add_executor(Arc::new(GotoExecutor::new(id, target.clone())));
                self.graph.add_edge(id, target.clone());
                Ok(None)
            }
            ActionKind::InvokeAzureAgent(invoke) => {
                let agent = self.agents.get(&invoke.agent).cloned().ok_or_else(|| {
                    BuildError::UnknownAgent {
                        action_id: id.to_string(),
                        agent: invoke.agent.clone(),
                    }
                })?;
                self.graph.add_executor(Arc::new(InvokeAgentExecutor::new(
                    id,
                    invoke.clone(),
                    agent,
                )));
                Ok(Some(id.to_string()))
            }
            ActionKind::InvokeTool {
                tool,
                arguments,
                output,
            } => {
                let resolved = self.tools.get(tool).cloned().ok_or_else(|| {
                    BuildError::UnknownTool {
                        action_id: id.to_string(),
                        tool: tool.clone(),
                    }
                })?;
                self.graph.add_executor(Arc::new(InvokeToolExecutor::new(
                    id,
                    resolved,
                    arguments.clone(),
                    output.clone(),
                )));
                Ok(Some(id.to_string()))
            }
            ActionKind::WaitForInput(input) => {
                self.add_input(id, ExternalInputKind::WaitForInput, input)
            }
            ActionKind::RequestExternalInput(input) => {
                self.add_input(id, ExternalInputKind::RequestExternalInput, input)
            }
            ActionKind::Question(input) => self.add_input(id, ExternalInputKind::Question, input),
        }
    }

    fn compile_conditional(
        &mut self,
        id: &str,
        conditional: &ConditionalAction,
        enclosing_loop: Option<&str>,
    ) -> Result<String, BuildError> {
        let join = join_id(id);
        self.graph
            .add_executor(Arc::new(ConditionExecutor::new(id, conditional.clone())));
        self.graph.add_executor(Arc::new(JoinExecutor::new(join.clone())));

        for (index, branch) in conditional.branches.iter().enumerate() {
            let entry = self.compile_list(&branch.actions, &join, enclosing_loop)?;
            self.graph
                .add_conditional_edge(id, entry, branch_condition(index as i32));
        }
        let else_entry = self.compile_list(&conditional.else_actions, &join, enclosing_loop)?;
        self.graph
            .add_conditional_edge(id, else_entry, branch_condition(-1));
        Ok(join)
    }

    fn add_input(
        &mut self,
        id: &str,
        kind: ExternalInputKind,
        input: &InputAction,
    ) -> Result<Option<String>, BuildError> {
        self.graph.add_executor(Arc::new(ExternalInputExecutor::new(
            id,
            kind,
            input.clone(),
        )));
        Ok(Some(id.to_string()))
    }
}
