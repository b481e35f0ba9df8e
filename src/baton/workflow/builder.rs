// SPDX-License-Identifier: MIT

use crate::adk::error::BuildError;
use crate::baton::checkpoint::CheckpointStore;
use crate::baton::workflow::config::RunnerConfig;
use crate::baton::workflow::edge::{Edge, EdgeCondition};
use crate::baton::workflow::executor::Executor;
use crate::baton::workflow::runner::Workflow;
use std::collections::HashMap;
use std::sync::Arc;

/// Assembles executors and edges into a [`Workflow`].
///
/// Validation happens in [`WorkflowBuilder::build`]; the fluent methods only
/// record what they are given.
pub struct WorkflowBuilder {
    name: String,
    executors: Vec<Arc<dyn Executor>>,
    edges: Vec<Edge>,
    start_executor_id: Option<String>,
    checkpoint_store: Option<Arc<dyn CheckpointStore>>,
    config: RunnerConfig,
}

impl WorkflowBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            executors: Vec::new(),
            edges: Vec::new(),
            start_executor_id: None,
            checkpoint_store: None,
            config: RunnerConfig::default(),
        }
    }

    pub fn add_executor(&mut self, executor: Arc<dyn Executor>) -> &mut Self {
        self.executors.push(executor);
        self
    }

    pub fn add_edge(&mut self, source: impl Into<String>, target: impl Into<String>) -> &mut Self {
        self.edges.push(Edge::direct(source, target));
        self
    }

    pub fn add_conditional_edge(
        &mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        condition: EdgeCondition,
    ) -> &mut Self {
        self.edges.push(Edge::conditional(source, target, condition));
        self
    }

    pub fn add_fan_in_edge(&mut self, sources: Vec<&str>, target: impl Into<String>) -> &mut Self {
        self.edges.push(Edge::FanIn {
            sources: sources.into_iter().map(String::from).collect(),
            target: target.into(),
        });
        self
    }

    pub fn set_start_executor(&mut self, id: impl Into<String>) -> &mut Self {
        self.start_executor_id = Some(id.into());
        self
    }

    pub fn with_checkpoint_store(&mut self, store: Arc<dyn CheckpointStore>) -> &mut Self {
        self.checkpoint_store = Some(store);
        self
    }

    pub fn with_config(&mut self, config: RunnerConfig) -> &mut Self {
        self.config = config;
        self
    }

    pub fn has_executor(&self, id: &str) -> bool {
        self.executors.iter().any(|e| e.id() == id)
    }

    pub fn build(&self) -> Result<Workflow, BuildError> {
        let mut executors: HashMap<String, Arc<dyn Executor>> = HashMap::new();
        for executor in &self.executors {
            let id = executor.id().to_string();
            if executors.insert(id.clone(), executor.clone()).is_some() {
                return Err(BuildError::DuplicateExecutor(id));
            }
        }

        for edge in &self.edges {
            for endpoint in edge.sources().into_iter().chain([edge.target()]) {
                if !executors.contains_key(endpoint) {
                    return Err(BuildError::UnknownExecutor(endpoint.to_string()));
                }
            }
        }

        let start = self
            .start_executor_id
            .clone()
            .ok_or(BuildError::MissingStartExecutor)?;
        if !executors.contains_key(&start) {
            return Err(BuildError::UnknownExecutor(start));
        }

        log::debug!(
            "Built workflow '{}' with {} executors and {} edges",
            self.name,
            executors.len(),
            self.edges.len()
        );
        Ok(Workflow::new(
            self.name.clone(),
            executors,
            self.edges.clone(),
            start,
            self.checkpoint_store.clone(),
            self.config.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::error::Result;
    use crate::baton::workflow::context::WorkflowContext;
    use crate::baton::workflow::message::{MessageKind, WorkflowMessage};
    use async_trait::async_trait;

    struct Noop(&'static str);

    #[async_trait]
    impl Executor for Noop {
        fn id(&self) -> &str {
            self.0
        }
        fn input_types(&self) -> &[MessageKind] {
            &[MessageKind::Text]
        }
        async fn handle(&self, _m: WorkflowMessage, _ctx: &mut WorkflowContext) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_duplicate_executor_rejected() {
        let err = WorkflowBuilder::new("dup")
            .add_executor(Arc::new(Noop("a")))
            .add_executor(Arc::new(Noop("a")))
            .set_start_executor("a")
            .build()
            .err();
        assert_eq!(err, Some(BuildError::DuplicateExecutor("a".into())));
    }

    #[test]
    fn test_edge_to_unknown_executor_rejected() {
        let err = WorkflowBuilder::new("edge")
            .add_executor(Arc::new(Noop("a")))
            .add_edge("a", "ghost")
            .set_start_executor("a")
            .build()
            .err();
        assert_eq!(err, Some(BuildError::UnknownExecutor("ghost".into())));
    }

    #[test]
    fn test_missing_start_rejected() {
        let err = WorkflowBuilder::new("start")
            .add_executor(Arc::new(Noop("a")))
            .build()
            .err();
        assert_eq!(err, Some(BuildError::MissingStartExecutor));
    }

    #[test]
    fn test_build_is_repeatable() {
        let mut builder = WorkflowBuilder::new("twice");
        builder
            .add_executor(Arc::new(Noop("a")))
            .add_executor(Arc::new(Noop("b")))
            .add_edge("a", "b")
            .set_start_executor("a");

        let first = builder.build().unwrap();
        let second = builder.build().unwrap();
        assert_eq!(first.executor_ids(), vec!["a", "b"]);
        assert_eq!(second.start_executor_id(), "a");
    }
}
