// SPDX-License-Identifier: MIT

//! Name-keyed registries for the agents and tools a declarative workflow
//! may reference.

use crate::adk::agent::Agent;
use crate::adk::tool::Tool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct ToolRegistry {
    tools: Arc<RwLock<HashMap<String, Arc<dyn Tool>>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register(&self, tool: Arc<dyn Tool>) {
        let mut tools = self.tools.write().await;
        tools.insert(tool.name().to_string(), tool);
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        let tools = self.tools.read().await;
        tools.get(name).cloned()
    }

    /// Point-in-time copy handed to workflow builders
    pub async fn snapshot(&self) -> HashMap<String, Arc<dyn Tool>> {
        self.tools.read().await.clone()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct AgentRegistry {
    agents: Arc<RwLock<HashMap<String, Arc<dyn Agent>>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register(&self, agent: Arc<dyn Agent>) {
        let mut agents = self.agents.write().await;
        log::debug!("Registering agent '{}'", agent.name());
        agents.insert(agent.name().to_string(), agent);
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Agent>> {
        let agents = self.agents.read().await;
        agents.get(name).cloned()
    }

    /// Registered names, sorted
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn snapshot(&self) -> HashMap<String, Arc<dyn Agent>> {
        self.agents.read().await.clone()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
