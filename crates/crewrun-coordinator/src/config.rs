//! Coordinator configuration.

use std::time::Duration;

use serde::Deserialize;

/// Coordinator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Idle wake-up period of the scheduler loop (milliseconds).
    ///
    /// The loop is also woken on every submission and terminal transition.
    pub scheduler_interval_ms: u64,

    /// Buffer size of the event bus broadcast channel.
    pub event_capacity: usize,

    /// Fail tasks with no registered handler instead of using the default one.
    pub strict_handlers: bool,
}

impl CoordinatorConfig {
    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_millis(self.scheduler_interval_ms.max(1))
    }

    /// Builder method to set the scheduler interval.
    pub fn with_scheduler_interval(mut self, interval: Duration) -> Self {
        self.scheduler_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Builder method to set the event bus capacity.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Builder method to toggle strict handler dispatch.
    pub fn with_strict_handlers(mut self, strict: bool) -> Self {
        self.strict_handlers = strict;
        self
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            scheduler_interval_ms: 100,
            event_capacity: 1024,
            strict_handlers: false,
        }
    }
}
