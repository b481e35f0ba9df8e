// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};

/// Default cap on supersteps per run segment
pub const DEFAULT_MAX_SUPERSTEPS: usize = 1000;

/// What the runner reports beyond outputs and requests.
///
/// Passed explicitly to each workflow; nothing here is process-global.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Emit `ExecutorInvoked` / `ExecutorCompleted` events
    #[serde(default)]
    pub executor_events: bool,
    /// Log every delivered payload at debug level
    #[serde(default)]
    pub log_payloads: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default = "default_max_supersteps")]
    pub max_supersteps: usize,
    #[serde(default = "default_channel_capacity")]
    pub event_channel_capacity: usize,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

fn default_max_supersteps() -> usize {
    DEFAULT_MAX_SUPERSTEPS
}

fn default_channel_capacity() -> usize {
    100
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_supersteps: default_max_supersteps(),
            event_channel_capacity: default_channel_capacity(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl RunnerConfig {
    pub fn with_max_supersteps(mut self, max: usize) -> Self {
        self.max_supersteps = max;
        self
    }

    pub fn with_observability(mut self, observability: ObservabilityConfig) -> Self {
        self.observability = observability;
        self
    }
}
