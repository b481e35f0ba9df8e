// SPDX-License-Identifier: MIT

use crate::baton::workflow::message::WorkflowMessage;
use std::sync::Arc;

/// Predicate deciding whether a broadcast message travels along an edge
pub type EdgeCondition = Arc<dyn Fn(&WorkflowMessage) -> bool + Send + Sync>;

/// Wiring between executors
#[derive(Clone)]
pub enum Edge {
    /// One source to one target, optionally guarded by a condition
    Direct {
        source: String,
        target: String,
        condition: Option<EdgeCondition>,
    },
    /// Buffers one message per source and delivers a batch once all reported
    FanIn { sources: Vec<String>, target: String },
}

impl Edge {
    pub fn direct(source: impl Into<String>, target: impl Into<String>) -> Self {
        Edge::Direct {
            source: source.into(),
            target: target.into(),
            condition: None,
        }
    }

    pub fn conditional(
        source: impl Into<String>,
        target: impl Into<String>,
        condition: EdgeCondition,
    ) -> Self {
        Edge::Direct {
            source: source.into(),
            target: target.into(),
            condition: Some(condition),
        }
    }

    pub fn target(&self) -> &str {
        match self {
            Edge::Direct { target, .. } | Edge::FanIn { target, .. } => target,
        }
    }

    pub fn has_source(&self, id: &str) -> bool {
        match self {
            Edge::Direct { source, .. } => source == id,
            Edge::FanIn { sources, .. } => sources.iter().any(|s| s == id),
        }
    }

    pub fn sources(&self) -> Vec<&str> {
        match self {
            Edge::Direct { source, .. } => vec![source.as_str()],
            Edge::FanIn { sources, .. } => sources.iter().map(|s| s.as_str()).collect(),
        }
    }

    /// Whether `message` passes this edge's condition
    pub fn accepts(&self, message: &WorkflowMessage) -> bool {
        match self {
            Edge::Direct {
                condition: Some(cond),
                ..
            } => cond(message),
            _ => true,
        }
    }
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Edge::Direct {
                source,
                target,
                condition,
            } => f
                .debug_struct("Direct")
                .field("source", source)
                .field("target", target)
                .field("conditional", &condition.is_some())
                .finish(),
            Edge::FanIn { sources, target } => f
                .debug_struct("FanIn")
                .field("sources", sources)
                .field("target", target)
                .finish(),
        }
    }
}
