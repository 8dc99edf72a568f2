//! CrewRun Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - An async runtime
//! - Persistence
//! - Handler implementations
//!
//! All types here describe agents, tasks, their lifecycles and the
//! capability matching rules shared by every coordinator.

pub mod agent;
pub mod capability;
pub mod error;
pub mod event;
pub mod ids;
pub mod status;
pub mod task;

// Re-export commonly used types
pub use agent::{Agent, AgentDefinition};
pub use capability::{required_capability, select_agent, GENERAL_CAPABILITY};
pub use error::CoreError;
pub use event::{TaskEvent, TaskEventKind};
pub use ids::{AgentId, TaskId};
pub use status::{AgentStatus, Priority, TaskStatus};
pub use task::Task;
