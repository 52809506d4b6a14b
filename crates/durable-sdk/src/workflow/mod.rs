//! The workflow task executor and the workflow state machine built on top
//! of it — the heart of the crate.

mod context;
mod descriptor;
mod executor;
mod instance;
mod state;

pub use context::{OperationHandle, WfContext, WorkflowInfo};
pub use descriptor::{Workflow, WorkflowDescriptor, WorkflowRegistry, WorkflowRegistryError};
pub use executor::{ExecutorError, TaskExecutor, TaskId};
pub use instance::WorkflowInstance;

pub use crate::bridge::Command;

use std::collections::HashMap;

use crate::failure::{Failure, FailureConversionError};
use crate::payload::{Payload, PayloadError};

/// What workflow code can fail with. Propagates normally through
/// `execute_activity`/`start_child_workflow`/`execute_update`/
/// `wait_condition` the way any `Result` does; only an uncaught value at
/// the top level terminates the run.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Failure(Failure),

    #[error("workflow was cancelled: {0}")]
    Cancelled(Failure),

    #[error("continue as new")]
    ContinueAsNew {
        workflow_type: String,
        input: Vec<Payload>,
        memo: HashMap<String, Payload>,
        search_attributes: HashMap<String, Payload>,
    },
}

impl WorkflowError {
    pub fn application(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        WorkflowError::Failure(Failure::application(error_type, message))
    }

    pub fn continue_as_new(workflow_type: impl Into<String>, input: Vec<Payload>) -> Self {
        WorkflowError::ContinueAsNew {
            workflow_type: workflow_type.into(),
            input,
            memo: HashMap::new(),
            search_attributes: HashMap::new(),
        }
    }
}

impl From<Failure> for WorkflowError {
    fn from(failure: Failure) -> Self {
        if failure.is_cancelled() {
            WorkflowError::Cancelled(failure)
        } else {
            WorkflowError::Failure(failure)
        }
    }
}

/// Framework-internal failures that surface as a workflow *task* failure
/// rather than a `fail_workflow` command (non-determinism / replay
/// errors): the server retries the task against a freshly cached
/// instance rather than treating the run itself as failed.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowTaskError {
    #[error("non-determinism detected: {0}")]
    NonDeterminism(String),

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error(transparent)]
    Registry(#[from] descriptor::WorkflowRegistryError),

    #[error(transparent)]
    FailureConversion(#[from] FailureConversionError),
}
</content>
