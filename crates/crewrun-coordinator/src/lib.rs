//! CrewRun Coordinator Library
//!
//! This crate provides the in-process coordination runtime for CrewRun:
//! agent registry, task store, capability-based dispatch, the scheduler
//! loop, lifecycle events and multi-step workflows.
//!
//! ```no_run
//! use crewrun_coordinator::{builtin, Coordinator};
//! use crewrun_core::Priority;
//! use serde_json::json;
//!
//! # async fn demo() -> crewrun_coordinator::Result<()> {
//! let coordinator = Coordinator::builder()
//!     .agents(builtin::default_agents())
//!     .handlers(builtin::handlers())
//!     .build()?;
//!
//! let id = coordinator
//!     .submit_task("generate_quiz", Priority::High, json!({"difficulty": "easy"}))
//!     .await?;
//! let result = coordinator.await_task(&id).await?;
//! println!("{result}");
//! # Ok(())
//! # }
//! ```

pub mod builtin;
pub mod bus;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod registry;
pub mod runner;
pub mod scheduler;
pub mod state;
pub mod store;
pub mod workflow;

pub use bus::{EventBus, Subscription};
pub use config::CoordinatorConfig;
pub use coordinator::{Coordinator, CoordinatorBuilder, StatusSummary};
pub use error::{CoordinatorError, Result};
pub use handler::{DefaultHandler, FnHandler, HandlerError, HandlerRegistry, TaskHandler};
pub use registry::AgentRegistry;
pub use runner::{Dispatch, TaskRunner};
pub use scheduler::Scheduler;
pub use state::CoordinatorState;
pub use store::{TaskStore, Transition};
pub use workflow::{StepOutcome, Workflow, WorkflowCoordinator, WorkflowReport, WorkflowStep};
