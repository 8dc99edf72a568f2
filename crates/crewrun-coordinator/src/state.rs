//! Shared coordinator state.
//!
//! Lock order: `agents` before `tasks`. Every path that mutates both holds
//! both write guards for the whole change.

use std::sync::Arc;

use tokio::sync::{Notify, RwLock};

use crate::bus::EventBus;
use crate::config::CoordinatorConfig;
use crate::handler::HandlerRegistry;
use crate::registry::AgentRegistry;
use crate::store::TaskStore;

/// State shared by the runner, the scheduler and the public facade.
pub struct CoordinatorState {
    /// Agent roster.
    pub agents: RwLock<AgentRegistry>,

    /// All submitted tasks.
    pub tasks: RwLock<TaskStore>,

    /// Lifecycle event fan-out.
    pub bus: EventBus,

    /// Task type -> handler dispatch table.
    pub handlers: HandlerRegistry,

    /// Wakes the scheduler on submissions and terminal transitions.
    pub wake: Notify,

    pub config: CoordinatorConfig,
}

impl CoordinatorState {
    /// Create a new CoordinatorState wrapped in Arc.
    pub fn new(
        config: CoordinatorConfig,
        agents: AgentRegistry,
        mut handlers: HandlerRegistry,
    ) -> Arc<Self> {
        if config.strict_handlers {
            handlers.set_strict(true);
        }
        Arc::new(Self {
            agents: RwLock::new(agents),
            tasks: RwLock::new(TaskStore::new()),
            bus: EventBus::new(config.event_capacity),
            handlers,
            wake: Notify::new(),
            config,
        })
    }
}
