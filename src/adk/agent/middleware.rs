// SPDX-License-Identifier: MIT

//! Ordered middleware chain around an agent (onion model).
//!
//! The chain is fixed when the [`MiddlewareAgent`] is constructed. Each
//! middleware receives a [`Next`] handle and decides whether and how to call
//! the rest of the chain; the innermost step is the wrapped agent itself.

use super::{Agent, AgentResponse};
use crate::adk::error::CallError;
use crate::adk::message::ChatMessage;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// A single layer of the middleware chain
#[async_trait]
pub trait AgentMiddleware: Send + Sync {
    async fn process(
        &self,
        agent_name: &str,
        messages: &[ChatMessage],
        next: Next<'_>,
    ) -> Result<AgentResponse, CallError>;
}

/// The remainder of the chain after the current middleware
pub struct Next<'a> {
    agent: &'a dyn Agent,
    chain: &'a [Arc<dyn AgentMiddleware>],
}

impl<'a> Next<'a> {
    pub async fn run(self, messages: &[ChatMessage]) -> Result<AgentResponse, CallError> {
        match self.chain.split_first() {
            Some((head, tail)) => {
                let next = Next {
                    agent: self.agent,
                    chain: tail,
                };
                head.process(self.agent.name(), messages, next).await
            }
            None => self.agent.run(messages).await,
        }
    }
}

/// Agent wrapped in an ordered middleware chain; first registered is outermost
pub struct MiddlewareAgent {
    inner: Arc<dyn Agent>,
    middleware: Vec<Arc<dyn AgentMiddleware>>,
}

impl MiddlewareAgent {
    pub fn new(inner: Arc<dyn Agent>, middleware: Vec<Arc<dyn AgentMiddleware>>) -> Self {
        Self { inner, middleware }
    }

    /// Wrap `agent` only when there is middleware to apply
    pub fn wrap(agent: Arc<dyn Agent>, middleware: &[Arc<dyn AgentMiddleware>]) -> Arc<dyn Agent> {
        if middleware.is_empty() {
            agent
        } else {
            Arc::new(Self::new(agent, middleware.to_vec()))
        }
    }
}

#[async_trait]
impl Agent for MiddlewareAgent {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    async fn run(&self, messages: &[ChatMessage]) -> Result<AgentResponse, CallError> {
        let next = Next {
            agent: self.inner.as_ref(),
            chain: &self.middleware,
        };
        next.run(messages).await
    }

    async fn reconnect(&self) -> Result<(), CallError> {
        self.inner.reconnect().await
    }
}

/// Logs every agent call with its duration
pub struct LoggingMiddleware;

#[async_trait]
impl AgentMiddleware for LoggingMiddleware {
    async fn process(
        &self,
        agent_name: &str,
        messages: &[ChatMessage],
        next: Next<'_>,
    ) -> Result<AgentResponse, CallError> {
        log::info!(
            "Agent '{}' invoked with {} messages",
            agent_name,
            messages.len()
        );
        let started = Instant::now();
        let result = next.run(messages).await;
        match &result {
            Ok(response) => log::info!(
                "Agent '{}' replied with {} messages in {:?}",
                agent_name,
                response.messages.len(),
                started.elapsed()
            ),
            Err(e) => log::error!("Agent '{}' failed: {}", agent_name, e),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::agent::FunctionAgent;
    use std::sync::Mutex;

    struct Recorder {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl AgentMiddleware for Recorder {
        async fn process(
            &self,
            _agent_name: &str,
            messages: &[ChatMessage],
            next: Next<'_>,
        ) -> Result<AgentResponse, CallError> {
            self.log.lock().unwrap().push(format!("{}:before", self.label));
            let result = next.run(messages).await;
            self.log.lock().unwrap().push(format!("{}:after", self.label));
            result
        }
    }

    struct ShortCircuit;

    #[async_trait]
    impl AgentMiddleware for ShortCircuit {
        async fn process(
            &self,
            _agent_name: &str,
            _messages: &[ChatMessage],
            _next: Next<'_>,
        ) -> Result<AgentResponse, CallError> {
            Ok(AgentResponse::text_reply("blocked"))
        }
    }

    #[tokio::test]
    async fn test_middleware_runs_in_onion_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let agent = MiddlewareAgent::new(
            Arc::new(FunctionAgent::echo("echo")),
            vec![
                Arc::new(Recorder {
                    label: "outer",
                    log: log.clone(),
                }),
                Arc::new(Recorder {
                    label: "inner",
                    log: log.clone(),
                }),
            ],
        );

        let reply = agent.run(&[ChatMessage::user("ping")]).await.unwrap();
        assert_eq!(reply.text(), "ping");
        assert_eq!(
            *log.lock().unwrap(),
            vec!["outer:before", "inner:before", "inner:after", "outer:after"]
        );
    }

    #[tokio::test]
    async fn test_middleware_can_short_circuit() {
        let agent = MiddlewareAgent::new(
            Arc::new(FunctionAgent::new("never", |_| {
                Err(CallError::failed("should not run"))
            })),
            vec![Arc::new(ShortCircuit)],
        );
        let reply = agent.run(&[]).await.unwrap();
        assert_eq!(reply.text(), "blocked");
    }

    #[test]
    fn test_wrap_without_middleware_returns_same_agent() {
        let agent: Arc<dyn Agent> = Arc::new(FunctionAgent::echo("echo"));
        let wrapped = MiddlewareAgent::wrap(agent.clone(), &[]);
        assert!(Arc::ptr_eq(&agent, &wrapped));
    }
}
