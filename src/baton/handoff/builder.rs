// SPDX-License-Identifier: MIT

//! Fluent builder for handoff workflows.

use crate::adk::agent::{Agent, AgentMiddleware, MiddlewareAgent};
use crate::adk::error::{BuildError, ConfigError};
use crate::baton::checkpoint::CheckpointStore;
use crate::baton::handoff::coordinator::{
    HandoffConfig, HandoffCoordinator, COORDINATOR_ID, GATEWAY_ID,
};
use crate::baton::handoff::gateway::UserInputGateway;
use crate::baton::handoff::types::{
    InteractionMode, TerminationCondition, DEFAULT_AUTONOMOUS_TURN_LIMIT,
};
use crate::baton::workflow::{RunnerConfig, Workflow, WorkflowBuilder};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Creates a fresh participant for every `build()`
pub type ParticipantFactory = Arc<dyn Fn() -> Arc<dyn Agent> + Send + Sync>;

/// Builds a coordinator + gateway workflow over a set of agents.
///
/// ```ignore
/// let workflow = HandoffBuilder::new("support")
///     .participants(vec![triage, billing, refunds])
///     .set_coordinator("triage")
///     .add_handoff("triage", &["billing", "refunds"])
///     .build()?;
/// ```
pub struct HandoffBuilder {
    name: String,
    participants: Option<Vec<Arc<dyn Agent>>>,
    factories: Option<Vec<(String, ParticipantFactory)>>,
    coordinator: Option<String>,
    handoffs: Vec<(String, Vec<String>)>,
    termination: TerminationCondition,
    interaction_mode: InteractionMode,
    autonomous_turn_limit: usize,
    return_to_previous: bool,
    request_info: bool,
    middleware: Vec<Arc<dyn AgentMiddleware>>,
    checkpoint_store: Option<Arc<dyn CheckpointStore>>,
    config: RunnerConfig,
}

impl HandoffBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            participants: None,
            factories: None,
            coordinator: None,
            handoffs: Vec::new(),
            termination: TerminationCondition::default(),
            interaction_mode: InteractionMode::default(),
            autonomous_turn_limit: DEFAULT_AUTONOMOUS_TURN_LIMIT,
            return_to_previous: false,
            request_info: false,
            middleware: Vec::new(),
            checkpoint_store: None,
            config: RunnerConfig::default(),
        }
    }

    /// Agent instances shared across every built workflow
    pub fn participants(mut self, participants: Vec<Arc<dyn Agent>>) -> Self {
        self.participants = Some(participants);
        self
    }

    /// Named factories invoked anew on each `build()`
    pub fn participant_factories<I, S>(mut self, factories: I) -> Self
    where
        I: IntoIterator<Item = (S, ParticipantFactory)>,
        S: Into<String>,
    {
        self.factories = Some(
            factories
                .into_iter()
                .map(|(name, factory)| (name.into(), factory))
                .collect(),
        );
        self
    }

    /// The agent that starts every run; defaults to the first participant
    pub fn set_coordinator(mut self, agent_id: impl Into<String>) -> Self {
        self.coordinator = Some(agent_id.into());
        self
    }

    pub fn add_handoff(mut self, source: impl Into<String>, targets: &[&str]) -> Self {
        self.handoffs.push((
            source.into(),
            targets.iter().map(|t| t.to_string()).collect(),
        ));
        self
    }

    pub fn with_termination_condition(mut self, condition: TerminationCondition) -> Self {
        self.termination = condition;
        self
    }

    /// Fails with [`ConfigError::InvalidTurnLimit`] when an autonomous limit
    /// is not positive. A limit given in human-in-loop mode is ignored.
    pub fn with_interaction_mode(
        mut self,
        mode: InteractionMode,
        autonomous_turn_limit: Option<i64>,
    ) -> Result<Self, ConfigError> {
        match (mode, autonomous_turn_limit) {
            (InteractionMode::Autonomous, Some(limit)) if limit <= 0 => {
                return Err(ConfigError::InvalidTurnLimit(limit));
            }
            (InteractionMode::Autonomous, Some(limit)) => {
                self.autonomous_turn_limit = limit as usize;
            }
            (InteractionMode::HumanInLoop, Some(limit)) => {
                log::warn!(
                    "Autonomous turn limit {} ignored in human-in-loop mode",
                    limit
                );
            }
            (_, None) => {}
        }
        self.interaction_mode = mode;
        Ok(self)
    }

    /// Route each user turn to the agent that spoke last instead of the
    /// coordinator.
    ///
    /// Fails here only when the participants already configured cannot hand
    /// off at all; `build()` checks the final handoff graph.
    pub fn enable_return_to_previous(mut self, enabled: bool) -> Result<Self, ConfigError> {
        if enabled && self.has_participants() && self.participant_count() < 2 {
            return Err(ConfigError::ReturnToPreviousWithoutHandoffs);
        }
        self.return_to_previous = enabled;
        Ok(self)
    }

    /// Pause after every agent reply so a reviewer can accept it (empty
    /// response) or send feedback that re-runs the agent
    pub fn with_request_info(mut self) -> Self {
        self.request_info = true;
        self
    }

    /// Middleware wrapped around every participant, outermost first
    pub fn with_agent_middleware(mut self, middleware: Arc<dyn AgentMiddleware>) -> Self {
        self.middleware.push(middleware);
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

    fn has_participants(&self) -> bool {
        self.participants.is_some() || self.factories.is_some()
    }

    fn participant_count(&self) -> usize {
        self.participants.as_ref().map(Vec::len).unwrap_or(0)
            + self.factories.as_ref().map(Vec::len).unwrap_or(0)
    }

    /// Resolve participants, invoking factories
    fn instantiate(&self) -> Result<Vec<(String, Arc<dyn Agent>)>, BuildError> {
        match (&self.participants, &self.factories) {
            (Some(_), Some(_)) => Err(BuildError::MixedParticipants),
            (None, Some(factories)) if factories.is_empty() => {
                Err(BuildError::EmptyParticipantFactories)
            }
            (None, Some(factories)) => Ok(factories
                .iter()
                .map(|(name, factory)| (name.clone(), factory()))
                .collect()),
            (Some(participants), None) if !participants.is_empty() => Ok(participants
                .iter()
                .map(|agent| (agent.name().to_string(), agent.clone()))
                .collect()),
            _ => Err(BuildError::NoParticipants),
        }
    }

    pub fn build(&self) -> Result<Workflow, BuildError> {
        let resolved = self.instantiate()?;

        let mut order = Vec::with_capacity(resolved.len());
        let mut agents: HashMap<String, Arc<dyn Agent>> = HashMap::new();
        for (id, agent) in resolved {
            if agents.contains_key(&id) {
                return Err(BuildError::DuplicateParticipant(id));
            }
            order.push(id.clone());
            agents.insert(id, MiddlewareAgent::wrap(agent, &self.middleware));
        }

        let coordinator = match &self.coordinator {
            Some(id) if agents.contains_key(id) => id.clone(),
            Some(id) => return Err(BuildError::UnknownCoordinator(id.clone())),
            None => order[0].clone(),
        };

        let handoff_graph = self.handoff_graph(&coordinator, &order, &agents)?;
        if self.return_to_previous && handoff_graph.values().all(Vec::is_empty) {
            return Err(ConfigError::ReturnToPreviousWithoutHandoffs.into());
        }

        let config = HandoffConfig {
            starting_agent_id: coordinator.clone(),
            agents,
            handoff_graph,
            termination: self.termination.clone(),
            interaction_mode: self.interaction_mode,
            autonomous_turn_limit: self.autonomous_turn_limit,
            return_to_previous: self.return_to_previous,
            request_info: self.request_info,
        };

        log::info!(
            "Building handoff workflow '{}' with {} participants, coordinator '{}'",
            self.name,
            order.len(),
            coordinator
        );

        let mut builder = WorkflowBuilder::new(self.name.clone());
        builder
            .add_executor(Arc::new(HandoffCoordinator::new(config)))
            .add_executor(Arc::new(UserInputGateway::new()))
            .add_edge(COORDINATOR_ID, GATEWAY_ID)
            .add_edge(GATEWAY_ID, COORDINATOR_ID)
            .set_start_executor(COORDINATOR_ID)
            .with_config(self.config.clone());
        if let Some(store) = &self.checkpoint_store {
            builder.with_checkpoint_store(store.clone());
        }
        builder.build()
    }

    /// Explicit handoffs when given; otherwise the coordinator can reach
    /// everyone and everyone can return to the coordinator
    fn handoff_graph(
        &self,
        coordinator: &str,
        order: &[String],
        agents: &HashMap<String, Arc<dyn Agent>>,
    ) -> Result<HashMap<String, Vec<String>>, BuildError> {
        let mut graph: HashMap<String, Vec<String>> = HashMap::new();

        if self.handoffs.is_empty() {
            let others: Vec<String> = order
                .iter()
                .filter(|id| id.as_str() != coordinator)
                .cloned()
                .collect();
            for other in &others {
                graph.insert(other.clone(), vec![coordinator.to_string()]);
            }
            graph.insert(coordinator.to_string(), others);
            return Ok(graph);
        }

        for (source, targets) in &self.handoffs {
            if !agents.contains_key(source) {
                return Err(BuildError::UnknownParticipant(source.clone()));
            }
            let entry = graph.entry(source.clone()).or_default();
            let mut seen: HashSet<String> = entry.iter().cloned().collect();
            for target in targets {
                if !agents.contains_key(target) {
                    return Err(BuildError::UnknownParticipant(target.clone()));
                }
                if seen.insert(target.clone()) {
                    entry.push(target.clone());
                }
            }
        }
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::agent::FunctionAgent;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn echo(name: &str) -> Arc<dyn Agent> {
        Arc::new(FunctionAgent::echo(name))
    }

    #[test]
    fn test_mixing_instances_and_factories_fails() {
        let factory: ParticipantFactory = Arc::new(|| echo("b"));
        let result = HandoffBuilder::new("h")
            .participants(vec![echo("a")])
            .participant_factories(vec![("b", factory)])
            .build();
        assert!(matches!(result, Err(BuildError::MixedParticipants)));
    }

    #[test]
    fn test_empty_factories_and_no_participants() {
        let empty: Vec<(String, ParticipantFactory)> = vec![];
        assert!(matches!(
            HandoffBuilder::new("h").participant_factories(empty).build(),
            Err(BuildError::EmptyParticipantFactories)
        ));
        assert!(matches!(
            HandoffBuilder::new("h").build(),
            Err(BuildError::NoParticipants)
        ));
    }

    #[test]
    fn test_unknown_coordinator_and_handoff_target() {
        assert!(matches!(
            HandoffBuilder::new("h")
                .participants(vec![echo("a")])
                .set_coordinator("z")
                .build(),
            Err(BuildError::UnknownCoordinator(ref id)) if id == "z"
        ));
        assert!(matches!(
            HandoffBuilder::new("h")
                .participants(vec![echo("a"), echo("b")])
                .add_handoff("a", &["ghost"])
                .build(),
            Err(BuildError::UnknownParticipant(ref id)) if id == "ghost"
        ));
    }

    #[test]
    fn test_duplicate_participant() {
        assert!(matches!(
            HandoffBuilder::new("h")
                .participants(vec![echo("a"), echo("a")])
                .build(),
            Err(BuildError::DuplicateParticipant(_))
        ));
    }

    #[test]
    fn test_turn_limit_validation() {
        assert!(matches!(
            HandoffBuilder::new("h").with_interaction_mode(InteractionMode::Autonomous, Some(0)),
            Err(ConfigError::InvalidTurnLimit(0))
        ));
        assert!(HandoffBuilder::new("h")
            .with_interaction_mode(InteractionMode::HumanInLoop, Some(-5))
            .is_ok());
    }

    #[test]
    fn test_return_to_previous_needs_two_participants() {
        assert!(matches!(
            HandoffBuilder::new("h")
                .participants(vec![echo("solo")])
                .enable_return_to_previous(true),
            Err(ConfigError::ReturnToPreviousWithoutHandoffs)
        ));
        assert!(HandoffBuilder::new("h")
            .participants(vec![echo("a"), echo("b")])
            .enable_return_to_previous(true)
            .is_ok());
    }

    #[test]
    fn test_return_to_previous_independent_of_call_order() {
        let before = HandoffBuilder::new("h")
            .enable_return_to_previous(true)
            .unwrap()
            .participants(vec![echo("a"), echo("b")]);
        let after = HandoffBuilder::new("h")
            .participants(vec![echo("a"), echo("b")])
            .enable_return_to_previous(true)
            .unwrap();
        assert!(before.build().is_ok());
        assert!(after.build().is_ok());

        let solo = HandoffBuilder::new("h")
            .enable_return_to_previous(true)
            .unwrap()
            .participants(vec![echo("solo")]);
        assert!(matches!(
            solo.build(),
            Err(BuildError::Config(ConfigError::ReturnToPreviousWithoutHandoffs))
        ));
    }

    #[test]
    fn test_factories_invoked_on_every_build() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let factory: ParticipantFactory = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            echo("worker")
        });
        let builder = HandoffBuilder::new("h").participant_factories(vec![("worker", factory)]);

        let first = builder.build().unwrap();
        let second = builder.build().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(first.start_executor_id(), COORDINATOR_ID);
        assert_eq!(
            second.executor_ids(),
            vec![COORDINATOR_ID.to_string(), GATEWAY_ID.to_string()]
        );
    }

    #[test]
    fn test_default_graph_is_star_around_coordinator() {
        let builder = HandoffBuilder::new("h");
        let agents: HashMap<String, Arc<dyn Agent>> = ["t", "a", "b"]
            .iter()
            .map(|n| (n.to_string(), echo(n)))
            .collect();
        let order = vec!["t".to_string(), "a".to_string(), "b".to_string()];
        let graph = builder.handoff_graph("t", &order, &agents).unwrap();
        assert_eq!(graph["t"], vec!["a", "b"]);
        assert_eq!(graph["a"], vec!["t"]);
    }
}
