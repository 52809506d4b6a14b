//! Errors surfaced by the client surface: client- and core-internal
//! signaling error kinds, distinct from the `Failure` a workflow or
//! activity itself raises.

use crate::failure::{Failure, FailureConversionError};
use crate::payload::PayloadError;

use super::service::ServiceError;

/// What a [`super::WorkflowClient`] or one of its handles can fail with.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("workflow {0} is already running with a different run")]
    WorkflowAlreadyStarted(String),

    /// The workflow's terminal event was a failure, surfaced by `result()`.
    #[error("workflow failed: {0}")]
    WorkflowFailed(Failure),

    /// Observed with `follow_runs = false`: the run continued as new and the
    /// caller asked not to follow.
    #[error("workflow continued as new, run {0}")]
    WorkflowContinuedAsNew(String),

    #[error("workflow history ended on an event this client does not know how to interpret as a result")]
    UnknownCloseEvent,

    #[error("no workflow execution found for {0:?}")]
    NotFound(crate::bridge::WorkflowExecution),

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error(transparent)]
    FailureConversion(#[from] FailureConversionError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}
