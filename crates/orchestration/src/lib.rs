//! Durable orchestration engine.
//!
//! Workflow programs are plain synchronous functions that call activities
//! through a [`WorkflowContext`]. Every call is recorded in the instance's
//! history; the program is re-executed from the top on each pass and calls
//! that already have an outcome return it immediately, so side-effecting
//! activities run once per call even across process restarts.
//!
//! The moving parts:
//! - [`Interpreter`]: replays a program against a history snapshot and
//!   reports the new events and activity commands
//! - [`Dispatcher`]: runs activities on tokio tasks with retries and records
//!   exactly one outcome per activity id
//! - [`Scheduler`]: drives instances forward, one pass at a time per instance
//! - [`OrchestrationClient`]: starts, inspects and terminates instances

pub mod client;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod interpreter;
pub mod registry;
pub mod scheduler;

pub use client::{InstanceStatusView, OrchestrationClient};
pub use context::{ActivityCall, ActivityOutcome, HistoryCursor, ScheduledActivity, WorkflowContext};
pub use dispatcher::{Dispatcher, RetryPolicy};
pub use error::{ActivityError, OrchestrationError, Result, WorkflowError, WorkflowResult};
pub use interpreter::{Interpreter, ReplayResult};
pub use registry::{
    ActivityHandler, ActivityRegistry, FnOrchestration, Orchestration, OrchestrationRegistry,
};
pub use scheduler::{PassOutcome, Scheduler, SchedulerOptions};

pub use history_store::{
    ActivityId, FailureDetails, FailureKind, HistoryEvent, HistoryRecord, InstanceId,
    InstanceStatus, WorkflowInstance,
};
