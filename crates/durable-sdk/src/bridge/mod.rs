//! The bridge worker interface: abstracts the native/server-facing side of
//! the worker behind an object-safe async trait.

mod types;
mod worker;

pub use types::{
    Activation, ActivationJob, ActivationResult, ActivityCancellationType, ActivityOptions,
    ActivityTask, ActivityTaskCompletion, ChildWorkflowCancellationType, ChildWorkflowOptions,
    Command, Completion, Priority, TaskToken, UpdateOutcome, VersioningIntent, WorkflowExecution,
};
pub use worker::{BridgeError, BridgeWorker, HeartbeatResponse, InMemoryBridge};
