//! Client library and worker runtime for a durable-execution orchestration service.
//!
//! Applications define *workflows* (long-lived, deterministic orchestrations)
//! and *activities* (side-effectful units of work). This crate runs them
//! against a remote server over a [`bridge::BridgeWorker`] connection,
//! replaying workflow code deterministically from a server-supplied
//! activation stream and emitting commands back.
//!
//! ```text
//!                  ┌────────────────────┐
//!   server  <-----> │     BridgeWorker   │
//!                  └──────────┬─────────┘
//!                             │ activations / completions
//!               ┌─────────────┴──────────────┐
//!               ▼                            ▼
//!     ┌───────────────────┐        ┌────────────────────┐
//!     │   WorkflowWorker   │        │   ActivityWorker   │
//!     │  per-run cache     │        │  bounded concurrency│
//!     └─────────┬──────────┘        └────────────────────┘
//!               ▼
//!     ┌───────────────────────┐
//!     │   WorkflowInstance     │── drives ──▶  TaskExecutor
//!     │  event-sourced replay  │
//!     └───────────────────────┘
//! ```
//!
//! ```ignore
//! use durable_sdk::payload::DataConverter;
//! use durable_sdk::workflow::{Workflow, WorkflowDescriptor, WfContext, WorkflowError};
//!
//! struct Greeter;
//!
//! impl Workflow for Greeter {
//!     const WORKFLOW_TYPE: &'static str = "Greeter";
//!     type Input = String;
//!     type Output = String;
//!
//!     fn descriptor() -> WorkflowDescriptor<Self> {
//!         WorkflowDescriptor::new(|ctx: WfContext, name: String| async move {
//!             let dc = DataConverter::default();
//!             let input = vec![dc.to_payload(&name, "input.0").map_err(|e| {
//!                 WorkflowError::application("DataConverterError", e.to_string())
//!             })?];
//!             let (_handle, activity) = ctx.execute_activity("Hello", input, Default::default());
//!             let result = activity.await?;
//!             let greeting: String = dc
//!                 .from_payload(&result, "output")
//!                 .map_err(|e| WorkflowError::application("DataConverterError", e.to_string()))?;
//!             Ok(greeting)
//!         })
//!     }
//! }
//! ```

pub mod bridge;
pub mod cancellation;
pub mod client;
pub mod config;
pub mod error;
pub mod failure;
pub mod interceptor;
pub mod metadata;
pub mod payload;
pub mod retry;
pub mod worker;
pub mod workflow;

/// Common imports for building workflows, activities, and workers.
pub mod prelude {
    pub use crate::bridge::{Activation, ActivationJob, BridgeWorker, Completion};
    pub use crate::cancellation::CancellationToken;
    pub use crate::client::{WorkflowClient, WorkflowHandle, WorkflowStartOptions};
    pub use crate::error::SdkError;
    pub use crate::failure::{Failure, FailureInfo};
    pub use crate::payload::Payload;
    pub use crate::retry::RetryPolicy;
    pub use crate::worker::{Activity, ActivityContext, ActivityError, ActivityOptions};
    pub use crate::workflow::{
        Command, WfContext, Workflow, WorkflowDescriptor, WorkflowError, WorkflowRegistry,
    };
}
</content>
