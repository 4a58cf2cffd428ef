//! Shared types for the durable orchestration workspace.

pub mod types;

pub use types::{InstanceId, InvalidInstanceId};
