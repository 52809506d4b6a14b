//! The client surface: start, signal, query, update, cancel, and terminate
//! workflow executions; stream visibility queries; manage schedules.
//! Everything here is transport-agnostic over [`WorkflowService`] the same
//! way the worker runtime is transport-agnostic over
//! [`crate::bridge::BridgeWorker`].

mod error;
mod handle;
mod options;
mod paginated;
pub mod schedule;
pub mod service;
mod workflow_client;

pub use error::ClientError;
pub use handle::{AsyncActivityHandle, UpdateHandle, WorkflowHandle};
pub use options::{ClientOptions, UpdateLifecycleStage, UpdateOptions, WorkflowIdConflictPolicy, WorkflowIdReusePolicy, WorkflowStartOptions};
pub use paginated::PaginatedStream;
pub use service::{InMemoryWorkflowService, WorkflowService};
pub use workflow_client::WorkflowClient;
